use thiserror::Error;

use crate::model::SourceId;
use crate::tree::NodeId;

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Contract violations detected while tracking references.
///
/// A well-formed resolved tree never produces these; they exist so a broken
/// upstream resolver fails loudly instead of corrupting the reference graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("no binding named `{name}` is declared at node {site:?}")]
    UnknownBinding { site: NodeId, name: String },

    #[error("node {node:?} is not a tag, tag body or program with a tracked source")]
    NotABindingSite { node: NodeId },

    #[error("alias chain starting at source {origin:?} exceeds {limit} hops")]
    AliasCycle { origin: SourceId, limit: usize },
}
