//! Ordered handler chain owned by a single connection.
//!
//! # Responsibilities
//! - Keep handlers in order under unique names
//! - Dispatch events and errors from a given position towards the tail
//! - Allow the running handler to mutate the chain (including removing itself)
//! - Track the connection's open/closed state
//!
//! # Design Decisions
//! - A handler is moved out of its slot while it runs, so it can hold
//!   `&mut Pipeline` through its context without aliasing itself
//! - Entries carry a stable [`HandlerId`]; positions are recomputed on use
//! - An error nobody consumes is logged and closes the connection

use tracing::Span;

use crate::net::connection::{ConnectionId, ConnectionState};
use crate::pipeline::context::HandlerContext;
use crate::pipeline::error::PipelineError;
use crate::pipeline::event::Event;
use crate::pipeline::handler::Handler;
use crate::pipeline::stage::PipelineStage;

/// Stable identity of a pipeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Entry {
    id: HandlerId,
    name: String,
    /// `None` while the handler is running.
    handler: Option<Box<dyn Handler>>,
}

/// The handler pipeline of one connection.
pub struct Pipeline {
    connection_id: ConnectionId,
    entries: Vec<Entry>,
    next_id: u64,
    state: ConnectionState,
    span: Span,
}

impl Pipeline {
    /// Create an empty pipeline for a connection.
    pub fn new(connection_id: ConnectionId) -> Self {
        let span = tracing::debug_span!("pipeline", connection_id = %connection_id);
        Self {
            connection_id,
            entries: Vec::new(),
            next_id: 0,
            state: ConnectionState::Active,
            span,
        }
    }

    /// Replace the span entered while events are dispatched.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Mark the connection closed. Later events are dropped, except
    /// [`Event::Inactive`], which still reaches every handler.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = ConnectionState::Closed;
        tracing::debug!(connection_id = %self.connection_id, "Connection closed by pipeline");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handler names, head first.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Position of the handler with this name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Position of the handler with this identity.
    pub fn position_of_id(&self, id: HandlerId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Append a handler at the tail.
    pub fn add_last<H: Handler>(
        &mut self,
        name: impl Into<String>,
        handler: H,
    ) -> Result<HandlerId, PipelineError> {
        self.insert_boxed(self.entries.len(), name.into(), Box::new(handler))
    }

    /// Insert a handler at the head.
    pub fn add_first<H: Handler>(
        &mut self,
        name: impl Into<String>,
        handler: H,
    ) -> Result<HandlerId, PipelineError> {
        self.insert_boxed(0, name.into(), Box::new(handler))
    }

    /// Insert a handler immediately before `base`.
    pub fn add_before<H: Handler>(
        &mut self,
        base: &str,
        name: impl Into<String>,
        handler: H,
    ) -> Result<HandlerId, PipelineError> {
        let index = self
            .position(base)
            .ok_or_else(|| PipelineError::NoSuchHandler(base.to_string()))?;
        self.insert_boxed(index, name.into(), Box::new(handler))
    }

    /// Insert a handler immediately after `base`.
    pub fn add_after<H: Handler>(
        &mut self,
        base: &str,
        name: impl Into<String>,
        handler: H,
    ) -> Result<HandlerId, PipelineError> {
        let index = self
            .position(base)
            .ok_or_else(|| PipelineError::NoSuchHandler(base.to_string()))?;
        self.insert_boxed(index + 1, name.into(), Box::new(handler))
    }

    /// Remove the handler with this name.
    ///
    /// Returns `Ok(None)` when the handler is currently running; it is
    /// dropped once its callback returns.
    pub fn remove(&mut self, name: &str) -> Result<Option<Box<dyn Handler>>, PipelineError> {
        let index = self
            .position(name)
            .ok_or_else(|| PipelineError::NoSuchHandler(name.to_string()))?;
        let entry = self.entries.remove(index);
        tracing::trace!(handler = %entry.name, "Handler removed");
        Ok(entry.handler)
    }

    /// Remove the entry with this identity, returning the position it held.
    ///
    /// Removing an entry that is already gone is a no-op.
    pub fn remove_id(&mut self, id: HandlerId) -> Option<usize> {
        let index = self.position_of_id(id)?;
        let entry = self.entries.remove(index);
        tracing::trace!(handler = %entry.name, "Handler removed");
        Some(index)
    }

    /// First handler of type `H`.
    pub fn get<H: Handler>(&self) -> Option<&H> {
        self.entries
            .iter()
            .find_map(|e| e.handler.as_deref().and_then(|h| h.as_any().downcast_ref::<H>()))
    }

    /// First handler of type `H`, mutably.
    pub fn get_mut<H: Handler>(&mut self) -> Option<&mut H> {
        self.entries.iter_mut().find_map(|e| {
            e.handler
                .as_deref_mut()
                .and_then(|h| h.as_any_mut().downcast_mut::<H>())
        })
    }

    /// Handler with this identity, if it is of type `H`.
    pub fn handler<H: Handler>(&self, id: HandlerId) -> Option<&H> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.handler.as_deref())
            .and_then(|h| h.as_any().downcast_ref::<H>())
    }

    /// Identity and position of the first handler of type `H`.
    pub fn find<H: Handler>(&self) -> Option<(HandlerId, usize)> {
        self.entries.iter().enumerate().find_map(|(index, e)| {
            let handler = e.handler.as_deref()?;
            handler.as_any().is::<H>().then_some((e.id, index))
        })
    }

    /// Start staging insertions to be committed in one step.
    pub fn stage(&mut self) -> PipelineStage<'_> {
        PipelineStage::new(self)
    }

    /// Deliver an event to the head of the pipeline.
    pub fn fire_event(&mut self, event: Event) {
        let span = self.span.clone();
        let _enter = span.enter();
        self.invoke_event(0, event);
    }

    /// Deliver an error to the head of the pipeline.
    pub fn fire_error(&mut self, error: PipelineError) {
        let span = self.span.clone();
        let _enter = span.enter();
        self.invoke_error(0, error);
    }

    pub(crate) fn insert_boxed(
        &mut self,
        index: usize,
        name: String,
        mut handler: Box<dyn Handler>,
    ) -> Result<HandlerId, PipelineError> {
        if self.contains(&name) {
            return Err(PipelineError::DuplicateName(name));
        }

        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            index,
            Entry {
                id,
                name,
                handler: None,
            },
        );

        let added = {
            let mut ctx = HandlerContext::new(self, id, index);
            handler.handler_added(&mut ctx)
        };

        match added {
            Ok(()) => {
                self.restore(id, handler);
                Ok(id)
            }
            Err(e) => {
                self.remove_id(id);
                Err(e)
            }
        }
    }

    pub(crate) fn invoke_event(&mut self, index: usize, event: Event) {
        if self.is_closed() && !matches!(event, Event::Inactive) {
            tracing::trace!(event = event.kind(), "Dropping event on closed connection");
            return;
        }

        let Some(entry) = self.entries.get_mut(index) else {
            tracing::trace!(event = event.kind(), "Event reached the end of the pipeline");
            return;
        };
        let id = entry.id;
        let Some(mut handler) = entry.handler.take() else {
            return self.invoke_event(index + 1, event);
        };

        {
            let mut ctx = HandlerContext::new(self, id, index);
            if let Err(error) = handler.on_event(&mut ctx, event) {
                handler.on_error(&mut ctx, error);
            }
        }

        self.restore(id, handler);
    }

    pub(crate) fn invoke_error(&mut self, index: usize, error: PipelineError) {
        let Some(entry) = self.entries.get_mut(index) else {
            tracing::warn!(
                connection_id = %self.connection_id,
                error = %error,
                "Unhandled pipeline error, closing connection"
            );
            self.close();
            return;
        };
        let id = entry.id;
        let Some(mut handler) = entry.handler.take() else {
            return self.invoke_error(index + 1, error);
        };

        {
            let mut ctx = HandlerContext::new(self, id, index);
            handler.on_error(&mut ctx, error);
        }

        self.restore(id, handler);
    }

    fn restore(&mut self, id: HandlerId, handler: Box<dyn Handler>) {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => entry.handler = Some(handler),
            None => tracing::trace!("Dropping handler removed while running"),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("connection_id", &self.connection_id)
            .field("handlers", &self.names())
            .field("state", &self.state)
            .finish()
    }
}
