//! Handler-side view of the pipeline.

use crate::net::connection::ConnectionId;
use crate::pipeline::chain::{HandlerId, Pipeline};
use crate::pipeline::error::PipelineError;
use crate::pipeline::event::Event;

/// Context handed to a running handler.
///
/// Forwarding always continues from the handler's current position. If the
/// handler has been removed, forwarding continues from the position it
/// occupied, so whatever now sits there (for example a freshly installed
/// protocol stack) sees the event next.
pub struct HandlerContext<'p> {
    pipeline: &'p mut Pipeline,
    id: HandlerId,
    /// Position at dispatch time.
    index: usize,
    removed_at: Option<usize>,
}

impl<'p> HandlerContext<'p> {
    pub(crate) fn new(pipeline: &'p mut Pipeline, id: HandlerId, index: usize) -> Self {
        Self {
            pipeline,
            id,
            index,
            removed_at: None,
        }
    }

    /// Identity of the handler this context belongs to.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.pipeline.connection_id()
    }

    /// Current position, or `None` once removed.
    pub fn position(&self) -> Option<usize> {
        self.pipeline.position_of_id(self.id)
    }

    pub fn is_removed(&self) -> bool {
        self.position().is_none()
    }

    pub fn pipeline(&self) -> &Pipeline {
        self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        self.pipeline
    }

    /// Remove this handler from the pipeline.
    ///
    /// Only the first call has an effect; returns whether it did.
    pub fn remove_self(&mut self) -> bool {
        match self.pipeline.remove_id(self.id) {
            Some(index) => {
                self.removed_at = Some(index);
                true
            }
            None => false,
        }
    }

    /// Pass an event to the next handler.
    pub fn fire_event(&mut self, event: Event) {
        let next = self.next_index();
        self.pipeline.invoke_event(next, event);
    }

    /// Pass an error to the next handler.
    pub fn fire_error(&mut self, error: PipelineError) {
        let next = self.next_index();
        self.pipeline.invoke_error(next, error);
    }

    /// Close the connection.
    pub fn close(&mut self) {
        self.pipeline.close();
    }

    fn next_index(&self) -> usize {
        match self.position() {
            Some(index) => index + 1,
            None => self.removed_at.unwrap_or(self.index),
        }
    }
}
