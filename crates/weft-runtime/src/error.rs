use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Runtime contract violations.
///
/// Compiled output is trusted, so these signal a mismatch between a template,
/// its walk string and its callbacks rather than bad user data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The renderer was asked to clone before any template text was set.
    #[error("the renderer does not have a template to clone")]
    MissingTemplate,

    #[error("template markup error at byte {offset}: {message}")]
    Template { offset: usize, message: String },

    #[error("invalid walk code {code:?} at position {position}")]
    InvalidWalkCode { code: char, position: usize },

    /// A walk instruction needed a node where there is none.
    #[error("walk instruction {position} has no node to act on")]
    WalkOutOfBounds { position: usize },

    #[error("scope slot {slot} is out of range for a scope of size {size}")]
    SlotOutOfRange { slot: usize, size: usize },

    #[error("no node is bound at walk index {index}")]
    UnboundNode { index: usize },

    /// `update` was called after `destroy`.
    #[error("the render result has been destroyed")]
    Destroyed,
}
