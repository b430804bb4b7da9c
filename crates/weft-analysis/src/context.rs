#![forbid(unsafe_code)]

//! Compilation context and analysis results.
//!
//! A [`CompilationContext`] owns every memo table for one compilation unit:
//! sources, sections, interned references and intersections, plus the facts
//! recorded on tree nodes. Nothing is global, so independent units can be
//! analyzed side by side without sharing state.
//!
//! # Lifecycle
//!
//! 1. Create a context over a resolved [`Tree`].
//! 2. Call [`CompilationContext::track_input`] and
//!    [`CompilationContext::track_references`] for each declaring tag, in
//!    traversal order. Register composite targets with
//!    [`CompilationContext::merge_references`].
//! 3. [`CompilationContext::finish`] resolves any pending merges and hands
//!    the [`Analysis`] to the code generator.

use ahash::AHashMap;

use crate::config::AnalysisConfig;
use crate::intersection::{IntersectionTable, PendingMerge};
use crate::model::{
    Aliases, IntersectionId, Reference, ReferenceId, ReferenceTable, References, SectionId, Source,
    SourceId,
};
use crate::section::{Section, SectionGraph};
use crate::tree::{NodeId, Tree};

/// Facts the analysis attaches to one tree node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFacts {
    /// Accumulated set on an expression root or function.
    pub references: Option<References>,
    /// Single reference on a read root.
    pub reference: Option<ReferenceId>,
    /// Source declared by a tag, tag body, program or declaring identifier.
    pub source: Option<SourceId>,
    /// Name given to an anonymous attribute function.
    pub function_name: Option<String>,
}

/// Output of one compilation unit.
#[derive(Debug, Default)]
pub struct Analysis {
    pub(crate) sources: Vec<Source>,
    pub(crate) sections: SectionGraph,
    pub(crate) references: ReferenceTable,
    pub(crate) intersections: IntersectionTable,
    pub(crate) facts: AHashMap<NodeId, NodeFacts>,
}

impl Analysis {
    #[must_use]
    pub fn source(&self, id: SourceId) -> &Source {
        &self.sources[id.index()]
    }

    #[must_use]
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    #[must_use]
    pub fn section(&self, id: SectionId) -> &Section {
        self.sections.get(id)
    }

    #[must_use]
    pub fn sections(&self) -> &SectionGraph {
        &self.sections
    }

    /// Outer sources captured by `section`.
    #[must_use]
    pub fn closures(&self, section: SectionId) -> &[SourceId] {
        &self.sections.get(section).closures
    }

    #[must_use]
    pub fn reference(&self, id: ReferenceId) -> &Reference {
        self.references.get(id)
    }

    #[must_use]
    pub fn reference_table(&self) -> &ReferenceTable {
        &self.references
    }

    #[must_use]
    pub fn intersection(&self, id: IntersectionId) -> &[ReferenceId] {
        self.intersections.members(id)
    }

    /// Interned intersections of `section` in canonical order.
    #[must_use]
    pub fn intersections(&self, section: SectionId) -> &[IntersectionId] {
        self.intersections.in_section(section)
    }

    /// Members of a reference set in canonical order.
    #[must_use]
    pub fn members<'a>(&'a self, references: &'a References) -> &'a [ReferenceId] {
        match references {
            References::One(id) => std::slice::from_ref(id),
            References::Many(id) => self.intersections.members(*id),
        }
    }

    #[must_use]
    pub fn facts(&self, node: NodeId) -> Option<&NodeFacts> {
        self.facts.get(&node)
    }

    /// Accumulated set of an expression root, function or merge target.
    #[must_use]
    pub fn references_of(&self, node: NodeId) -> Option<References> {
        self.facts.get(&node).and_then(|facts| facts.references)
    }

    /// Reference recorded on a read root.
    #[must_use]
    pub fn reference_of(&self, node: NodeId) -> Option<ReferenceId> {
        self.facts.get(&node).and_then(|facts| facts.reference)
    }

    #[must_use]
    pub fn source_of(&self, node: NodeId) -> Option<SourceId> {
        self.facts.get(&node).and_then(|facts| facts.source)
    }

    #[must_use]
    pub fn function_name(&self, node: NodeId) -> Option<&str> {
        self.facts
            .get(&node)
            .and_then(|facts| facts.function_name.as_deref())
    }

    pub(crate) fn facts_mut(&mut self, node: NodeId) -> &mut NodeFacts {
        self.facts.entry(node).or_default()
    }
}

/// Mutable state for analyzing one compilation unit.
#[derive(Debug)]
pub struct CompilationContext<'t> {
    pub(crate) tree: &'t Tree,
    pub(crate) config: AnalysisConfig,
    pub(crate) analysis: Analysis,
    pub(crate) pending: Vec<PendingMerge>,
}

impl<'t> CompilationContext<'t> {
    #[must_use]
    pub fn new(tree: &'t Tree) -> Self {
        Self::with_config(tree, AnalysisConfig::default())
    }

    #[must_use]
    pub fn with_config(tree: &'t Tree, config: AnalysisConfig) -> Self {
        Self {
            tree,
            config,
            analysis: Analysis::default(),
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Results recorded so far.
    #[must_use]
    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    /// Alias tree for a tag whose value is `expr`: the reference read by
    /// `expr` when it is a plain read, otherwise no alias.
    #[must_use]
    pub fn aliases_of(&self, expr: NodeId) -> Aliases {
        self.analysis
            .reference_of(expr)
            .map_or(Aliases::Empty, Aliases::Direct)
    }

    /// Number of merges waiting for [`finalize_references`](Self::finalize_references).
    #[must_use]
    pub fn pending_merges(&self) -> usize {
        self.pending.len()
    }

    /// Resolve outstanding merges and return the results.
    #[must_use]
    pub fn finish(mut self) -> Analysis {
        if !self.pending.is_empty() {
            self.finalize_references();
        }
        self.analysis
    }
}
