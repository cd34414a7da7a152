//! Protocol negotiation gate.
//!
//! # States
//! - Detached: constructed, not yet in a pipeline
//! - Awaiting: attached behind a TLS handler, watching for handshake completion
//! - Resolved: protocol chosen, gate removed, stack installed
//!
//! # State Transitions
//! ```text
//! Detached → Awaiting: handler_added finds an upstream TlsHandler
//! Awaiting → Resolved: first successful HandshakeCompleted event
//! ```
//!
//! Failed handshakes and every other event pass through untouched.

use std::sync::Arc;

use crate::negotiation::{NegotiationError, PipelineConfigurator, Protocol};
use crate::net::tls::TlsHandler;
use crate::observability::metrics;
use crate::pipeline::{
    Event, Handler, HandlerContext, HandlerId, HandshakeCompletion, PipelineError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum GateState {
    Detached,
    Awaiting,
    Resolved(Protocol),
}

/// Pipeline handler that swaps itself for the negotiated protocol stack.
pub struct NegotiationGate {
    fallback: Protocol,
    configurator: Arc<dyn PipelineConfigurator>,
    terminator: Option<HandlerId>,
    state: GateState,
}

impl NegotiationGate {
    /// Create a gate that uses `fallback` when the handshake agreed on no protocol.
    pub fn new(fallback: Protocol, configurator: Arc<dyn PipelineConfigurator>) -> Self {
        Self {
            fallback,
            configurator,
            terminator: None,
            state: GateState::Detached,
        }
    }

    pub fn fallback(&self) -> &Protocol {
        &self.fallback
    }

    /// The protocol selected, once negotiation has happened.
    pub fn resolved(&self) -> Option<&Protocol> {
        match &self.state {
            GateState::Resolved(protocol) => Some(protocol),
            _ => None,
        }
    }

    fn resolve(&self, ctx: &HandlerContext<'_>, completion: &HandshakeCompletion) -> Protocol {
        completion
            .negotiated_protocol()
            .cloned()
            .or_else(|| {
                self.terminator
                    .and_then(|id| ctx.pipeline().handler::<TlsHandler>(id))
                    .and_then(|tls| tls.application_protocol().cloned())
            })
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn negotiate(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        completion: &HandshakeCompletion,
    ) -> Result<(), NegotiationError> {
        let protocol = self.resolve(ctx, completion);
        self.state = GateState::Resolved(protocol.clone());

        // Out of the pipeline before anything is installed.
        ctx.remove_self();

        tracing::debug!(
            connection_id = %ctx.connection_id(),
            protocol = %protocol,
            "Application-level protocol selected"
        );

        let mut stage = ctx.pipeline_mut().stage();
        self.configurator.configure_pipeline(&mut stage, &protocol)?;
        stage
            .commit()
            .map_err(|e| NegotiationError::configuration(protocol.clone(), e))?;

        metrics::record_negotiation(&protocol);
        Ok(())
    }
}

impl Handler for NegotiationGate {
    fn handler_added(&mut self, ctx: &mut HandlerContext<'_>) -> Result<(), PipelineError> {
        let position = ctx.position().unwrap_or_default();
        let terminator = match ctx.pipeline().find::<TlsHandler>() {
            Some((id, index)) if index < position => id,
            _ => return Err(NegotiationError::Attachment.into()),
        };

        self.terminator = Some(terminator);
        self.state = GateState::Awaiting;
        Ok(())
    }

    fn on_event(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        event: Event,
    ) -> Result<(), PipelineError> {
        if let Event::HandshakeCompleted(completion) = &event {
            if completion.is_success() && self.state == GateState::Awaiting {
                self.negotiate(ctx, completion)?;
            }
        }

        ctx.fire_event(event);
        Ok(())
    }

    fn on_error(&mut self, ctx: &mut HandlerContext<'_>, error: PipelineError) {
        match error {
            PipelineError::Negotiation(e) => {
                tracing::warn!(
                    connection_id = %ctx.connection_id(),
                    error = %e,
                    "Failed to select the application-level protocol"
                );
                metrics::record_negotiation_failure(e.reason());
                ctx.close();
            }
            other => ctx.fire_error(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionId;
    use crate::pipeline::{Pipeline, PipelineStage};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Marker;

    impl Handler for Marker {}

    struct Recorder {
        seen: Arc<Mutex<Vec<Event>>>,
    }

    impl Handler for Recorder {
        fn on_event(
            &mut self,
            ctx: &mut HandlerContext<'_>,
            event: Event,
        ) -> Result<(), PipelineError> {
            self.seen.lock().unwrap().push(event.clone());
            ctx.fire_event(event);
            Ok(())
        }
    }

    /// Installs one marker named after the protocol and counts invocations.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        observed_gate: Mutex<Vec<bool>>,
    }

    impl PipelineConfigurator for Counting {
        fn configure_pipeline(
            &self,
            stage: &mut PipelineStage<'_>,
            protocol: &Protocol,
        ) -> Result<(), NegotiationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.observed_gate
                .lock()
                .unwrap()
                .push(
                    stage.pipeline().get::<NegotiationGate>().is_some()
                        || stage.pipeline().contains("gate"),
                );
            if *protocol == "spdy/3.1" {
                return Err(NegotiationError::UnknownProtocol(protocol.clone()));
            }
            stage
                .add_last(format!("stack-{protocol}"), Marker)
                .map_err(|e| NegotiationError::configuration(protocol.clone(), e))?;
            Ok(())
        }
    }

    fn pipeline_with_gate(configurator: Arc<dyn PipelineConfigurator>) -> Pipeline {
        let mut pipeline = Pipeline::new(ConnectionId::new());
        pipeline.add_last("tls", TlsHandler::new()).unwrap();
        pipeline
            .add_last("gate", NegotiationGate::new(Protocol::HTTP_1_1, configurator))
            .unwrap();
        pipeline
    }

    fn succeeded(protocol: Option<&str>) -> Event {
        Event::HandshakeCompleted(HandshakeCompletion::succeeded(
            protocol.map(|p| Protocol::new(p).unwrap()),
        ))
    }

    #[test]
    fn attach_requires_tls_handler() {
        let mut pipeline = Pipeline::new(ConnectionId::new());
        let err = pipeline
            .add_last(
                "gate",
                NegotiationGate::new(Protocol::HTTP_1_1, Arc::new(Counting::default())),
            )
            .unwrap_err();

        assert!(matches!(err, PipelineError::Negotiation(NegotiationError::Attachment)));
        assert!(pipeline.is_empty());
    }

    #[test]
    fn attach_requires_tls_handler_upstream() {
        let mut pipeline = Pipeline::new(ConnectionId::new());
        pipeline.add_last("tls", TlsHandler::new()).unwrap();
        let err = pipeline
            .add_first(
                "gate",
                NegotiationGate::new(Protocol::HTTP_1_1, Arc::new(Counting::default())),
            )
            .unwrap_err();

        assert!(matches!(err, PipelineError::Negotiation(NegotiationError::Attachment)));
        assert_eq!(pipeline.names(), vec!["tls"]);
    }

    #[test]
    fn attached_gate_is_awaiting() {
        let pipeline = pipeline_with_gate(Arc::new(Counting::default()));
        let gate = pipeline.get::<NegotiationGate>().unwrap();
        assert_eq!(gate.state, GateState::Awaiting);
        assert!(gate.terminator.is_some());
        assert_eq!(gate.resolved(), None);
    }

    #[test]
    fn unrelated_events_pass_through_unchanged() {
        let configurator = Arc::new(Counting::default());
        let mut pipeline = pipeline_with_gate(configurator.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        pipeline.add_last("recorder", Recorder { seen: seen.clone() }).unwrap();

        pipeline.fire_event(Event::Active);
        pipeline.fire_event(Event::Read(Bytes::from_static(b"\x16\x03\x01")));

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[Event::Active, Event::Read(Bytes::from_static(b"\x16\x03\x01"))]
        );
        assert!(pipeline.contains("gate"));
        assert_eq!(configurator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_handshake_is_forwarded_without_action() {
        let configurator = Arc::new(Counting::default());
        let mut pipeline = pipeline_with_gate(configurator.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        pipeline.add_last("recorder", Recorder { seen: seen.clone() }).unwrap();

        let event = Event::HandshakeCompleted(HandshakeCompletion::failed("unknown ca"));
        pipeline.fire_event(event.clone());

        assert_eq!(seen.lock().unwrap().as_slice(), &[event]);
        assert!(pipeline.contains("gate"));
        assert!(!pipeline.is_closed());
        assert_eq!(configurator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn negotiated_protocol_installs_stack_and_removes_gate() {
        let configurator = Arc::new(Counting::default());
        let mut pipeline = pipeline_with_gate(configurator.clone());

        pipeline.fire_event(succeeded(Some("h2")));

        assert_eq!(pipeline.names(), vec!["tls", "stack-h2"]);
        assert!(pipeline.get::<NegotiationGate>().is_none());
    }

    #[test]
    fn missing_protocol_uses_fallback() {
        let configurator = Arc::new(Counting::default());
        let mut pipeline = pipeline_with_gate(configurator.clone());

        pipeline.fire_event(succeeded(None));

        assert_eq!(pipeline.names(), vec!["tls", "stack-http/1.1"]);
    }

    #[test]
    fn missing_protocol_prefers_terminator_alpn() {
        let configurator = Arc::new(Counting::default());
        let mut pipeline = Pipeline::new(ConnectionId::new());
        pipeline
            .add_last("tls", TlsHandler::with_application_protocol(Protocol::HTTP_2))
            .unwrap();
        pipeline
            .add_last("gate", NegotiationGate::new(Protocol::HTTP_1_1, configurator))
            .unwrap();

        pipeline.fire_event(succeeded(None));

        assert_eq!(pipeline.names(), vec!["tls", "stack-h2"]);
    }

    #[test]
    fn gate_is_removed_before_configuration() {
        let configurator = Arc::new(Counting::default());
        let mut pipeline = pipeline_with_gate(configurator.clone());

        pipeline.fire_event(succeeded(Some("h2")));

        assert_eq!(configurator.observed_gate.lock().unwrap().as_slice(), &[false]);
    }

    #[test]
    fn duplicate_completion_configures_once() {
        let configurator = Arc::new(Counting::default());
        let mut pipeline = pipeline_with_gate(configurator.clone());

        pipeline.fire_event(succeeded(Some("h2")));
        pipeline.fire_event(succeeded(Some("http/1.1")));

        assert_eq!(configurator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.names(), vec!["tls", "stack-h2"]);
    }

    #[test]
    fn gate_handles_repeated_completion_directly() {
        let configurator = Arc::new(Counting::default());
        let mut pipeline = Pipeline::new(ConnectionId::new());
        pipeline.add_last("tls", TlsHandler::new()).unwrap();

        // Two completions delivered to the same gate instance.
        let mut gate = NegotiationGate::new(Protocol::HTTP_1_1, configurator.clone());
        {
            let id = pipeline.add_last("gate", Marker).unwrap();
            let mut ctx = HandlerContext::new(&mut pipeline, id, 1);
            gate.handler_added(&mut ctx).unwrap();
            gate.on_event(&mut ctx, succeeded(Some("h2"))).unwrap();
            gate.on_event(&mut ctx, succeeded(Some("h2"))).unwrap();
        }

        assert_eq!(configurator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.resolved(), Some(&Protocol::HTTP_2));
    }

    #[test]
    fn completion_reaches_installed_stack() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder_seen = seen.clone();
        let configurator = move |stage: &mut PipelineStage<'_>,
                                 protocol: &Protocol|
              -> Result<(), NegotiationError> {
            stage
                .add_last(
                    "recorder",
                    Recorder {
                        seen: recorder_seen.clone(),
                    },
                )
                .map_err(|e| NegotiationError::configuration(protocol.clone(), e))?;
            Ok(())
        };
        let mut pipeline = pipeline_with_gate(Arc::new(configurator));

        let event = succeeded(Some("h2"));
        pipeline.fire_event(event.clone());
        pipeline.fire_event(Event::Read(Bytes::from_static(b"PRI")));

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[event, Event::Read(Bytes::from_static(b"PRI"))]
        );
    }

    #[test]
    fn unknown_protocol_closes_connection() {
        let configurator = Arc::new(Counting::default());
        let mut pipeline = pipeline_with_gate(configurator.clone());

        pipeline.fire_event(succeeded(Some("spdy/3.1")));

        assert!(pipeline.is_closed());
        assert_eq!(pipeline.names(), vec!["tls"]);
    }

    #[test]
    fn failed_stack_assembly_leaves_nothing_installed() {
        let configurator = |stage: &mut PipelineStage<'_>,
                            protocol: &Protocol|
         -> Result<(), NegotiationError> {
            stage
                .add_last("codec", Marker)
                .and_then(|s| s.add_last("tls", Marker))
                .map_err(|e| NegotiationError::configuration(protocol.clone(), e))?;
            Ok(())
        };
        let mut pipeline = pipeline_with_gate(Arc::new(configurator));

        pipeline.fire_event(succeeded(Some("h2")));

        assert!(pipeline.is_closed());
        assert_eq!(pipeline.names(), vec!["tls"]);
    }
}
