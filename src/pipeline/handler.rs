//! The handler trait implemented by every pipeline entry.

use std::any::Any;

use crate::pipeline::context::HandlerContext;
use crate::pipeline::error::PipelineError;
use crate::pipeline::event::Event;

/// A stage in a connection pipeline.
///
/// Every callback receives a [`HandlerContext`] bound to this handler's
/// position. The default implementations forward to the next handler, so a
/// handler only overrides what it cares about.
pub trait Handler: AsAny + Send {
    /// Called once, right after the handler is inserted.
    ///
    /// Returning an error rolls the insertion back.
    fn handler_added(&mut self, _ctx: &mut HandlerContext<'_>) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Called for every event reaching this handler.
    ///
    /// An error returned here is handed to [`Handler::on_error`] of the same
    /// handler.
    fn on_event(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        event: Event,
    ) -> Result<(), PipelineError> {
        ctx.fire_event(event);
        Ok(())
    }

    /// Called for every error reaching this handler.
    fn on_error(&mut self, ctx: &mut HandlerContext<'_>, error: PipelineError) {
        ctx.fire_error(error);
    }
}

/// Type-erased access used for lookups by concrete handler type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
