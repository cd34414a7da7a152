//! Negotiation error taxonomy.

use thiserror::Error;

use crate::negotiation::Protocol;
use crate::pipeline::PipelineError;

/// Errors raised while attaching the gate or installing a protocol stack.
///
/// All of them are fatal for the affected connection and never retried.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// No TLS terminator upstream of the gate.
    #[error(
        "cannot find a TLS handler in the pipeline \
         (required for application-level protocol negotiation)"
    )]
    Attachment,

    /// The resolved token matches no known protocol stack.
    #[error("unknown protocol: {0}")]
    UnknownProtocol(Protocol),

    /// Assembling the stack for `protocol` failed.
    #[error("failed to configure the {protocol} stack: {source}")]
    Configuration {
        protocol: Protocol,
        #[source]
        source: Box<PipelineError>,
    },

    /// A protocol token was empty.
    #[error("protocol token must not be empty")]
    EmptyProtocol,
}

impl NegotiationError {
    pub fn configuration(protocol: Protocol, source: PipelineError) -> Self {
        NegotiationError::Configuration {
            protocol,
            source: Box::new(source),
        }
    }

    /// Short, stable label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            NegotiationError::Attachment => "attachment",
            NegotiationError::UnknownProtocol(_) => "unknown_protocol",
            NegotiationError::Configuration { .. } => "configuration",
            NegotiationError::EmptyProtocol => "empty_protocol",
        }
    }
}
