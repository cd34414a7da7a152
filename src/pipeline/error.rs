//! Errors raised while building or driving a pipeline.

use thiserror::Error;

use crate::negotiation::NegotiationError;

/// Error type that flows through pipeline handlers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A handler with this name is already installed (or staged).
    #[error("duplicate handler name: {0}")]
    DuplicateName(String),

    /// No handler with this name is installed.
    #[error("no such handler: {0}")]
    NoSuchHandler(String),

    /// Application-level protocol negotiation failed.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
}
