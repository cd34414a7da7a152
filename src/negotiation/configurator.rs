//! The capability that installs a protocol stack.

use crate::negotiation::{NegotiationError, Protocol};
use crate::pipeline::PipelineStage;

/// Installs the handler stack for a negotiated protocol.
///
/// Called exactly once per connection, after the gate has removed itself
/// and before the handshake event travels further. Handlers are staged on
/// `stage`; the gate commits them only if this returns `Ok`.
pub trait PipelineConfigurator: Send + Sync {
    fn configure_pipeline(
        &self,
        stage: &mut PipelineStage<'_>,
        protocol: &Protocol,
    ) -> Result<(), NegotiationError>;
}

impl<F> PipelineConfigurator for F
where
    F: Fn(&mut PipelineStage<'_>, &Protocol) -> Result<(), NegotiationError> + Send + Sync,
{
    fn configure_pipeline(
        &self,
        stage: &mut PipelineStage<'_>,
        protocol: &Protocol,
    ) -> Result<(), NegotiationError> {
        self(stage, protocol)
    }
}
