#![forbid(unsafe_code)]

//! Stable summary of an [`Analysis`] for snapshots and tooling.
//!
//! The report names references by their debug names and lists everything in
//! id order, so two runs over the same tree produce identical reports.

use crate::context::Analysis;
use crate::model::{SectionId, SourceId, SourceKind};

/// Summary of one compilation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AnalysisReport {
    pub sources: Vec<SourceReport>,
    pub sections: Vec<SectionReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SourceReport {
    pub id: SourceId,
    pub kind: SourceKind,
    pub section: SectionId,
    /// Number of expression roots still holding references to the source.
    pub expressions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SectionReport {
    pub id: SectionId,
    pub closures: Vec<SourceId>,
    /// Each interned intersection as the debug names of its members.
    pub intersections: Vec<Vec<String>>,
}

impl Analysis {
    #[must_use]
    pub fn report(&self) -> AnalysisReport {
        let sources = self
            .sources
            .iter()
            .map(|source| SourceReport {
                id: source.id,
                kind: source.kind,
                section: source.section,
                expressions: source.expressions.len(),
            })
            .collect();
        let sections = self
            .sections
            .iter()
            .map(|section| SectionReport {
                id: section.id,
                closures: section.closures.clone(),
                intersections: self
                    .intersections(section.id)
                    .iter()
                    .map(|id| {
                        self.intersection(*id)
                            .iter()
                            .map(|reference| self.reference(*reference).name.clone())
                            .collect()
                    })
                    .collect(),
            })
            .collect();
        AnalysisReport { sources, sections }
    }
}
