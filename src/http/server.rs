//! HTTPS server with application-level protocol negotiation.
//!
//! # Responsibilities
//! - Accept TCP connections within the listener's connection limit
//! - Build each connection's pipeline: TLS terminator, then negotiation gate
//! - Run the TLS handshake under a timeout and report its completion
//! - Serve the connection with the stack the gate installed
//! - Stop accepting on shutdown and drain open connections
//!
//! # Data Flow
//! ```text
//! Listener::accept
//!     → pipeline [tls, negotiation]
//!     → TLS handshake (ALPN)
//!     → HandshakeCompleted event → gate installs h2 or http/1.1 stack
//!     → NegotiatedStack::serve (hyper http2 / http1 connection)
//!     → Inactive event, connection closed
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper::server::conn::{http1, http2};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::Instrument;

use crate::config::validation::validate_serving;
use crate::config::{ConfigError, GatewayConfig};
use crate::http::configurator::Http2OrHttpConfigurator;
use crate::http::handler::router;
use crate::http::stack::{
    Http2ConnectionHandler, Http2Settings, HttpObjectAggregator, HttpServerCodec, RequestHandler,
};
use crate::negotiation::{NegotiationGate, PipelineConfigurator, Protocol};
use crate::net::connection::{ConnectionId, ConnectionTracker};
use crate::net::listener::{Listener, ListenerError};
use crate::net::tls::TlsHandler;
use crate::observability::metrics;
use crate::pipeline::{Event, HandshakeCompletion, Pipeline, PipelineError};

/// Pipeline name of the TLS terminator.
pub const TLS_HANDLER: &str = "tls";
/// Pipeline name of the negotiation gate.
pub const NEGOTIATION_GATE: &str = "negotiation";

/// Upper bound on sending `close_notify` to a rejected connection.
const CLOSE_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// The protocol stack a connection ended up with.
#[derive(Clone)]
pub enum NegotiatedStack {
    Http2 {
        settings: Http2Settings,
        router: Router,
    },
    Http1 {
        codec: HttpServerCodec,
        max_content_length: usize,
        router: Router,
    },
}

impl NegotiatedStack {
    /// Read the installed stack back out of a negotiated pipeline.
    ///
    /// Returns `None` while no complete stack is installed.
    pub fn from_pipeline(pipeline: &Pipeline) -> Option<Self> {
        let router = pipeline.get::<RequestHandler>()?.router().clone();

        if let Some(h2) = pipeline.get::<Http2ConnectionHandler>() {
            return Some(NegotiatedStack::Http2 {
                settings: h2.settings().clone(),
                router,
            });
        }

        let codec = pipeline.get::<HttpServerCodec>()?.clone();
        let aggregator = pipeline.get::<HttpObjectAggregator>()?;
        Some(NegotiatedStack::Http1 {
            codec,
            max_content_length: aggregator.max_content_length(),
            router,
        })
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            NegotiatedStack::Http2 { .. } => Protocol::HTTP_2,
            NegotiatedStack::Http1 { .. } => Protocol::HTTP_1_1,
        }
    }

    /// Serve HTTP on `io` until the peer goes away or shutdown is signalled.
    ///
    /// On shutdown the connection finishes in-flight requests before closing.
    pub async fn serve<I>(
        self,
        io: I,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), hyper::Error>
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(io);

        match self {
            NegotiatedStack::Http2 { settings, router } => {
                let service = limited(router, settings.max_content_length);
                let mut builder = http2::Builder::new(TokioExecutor::new());
                builder
                    .max_concurrent_streams(settings.max_concurrent_streams)
                    .max_frame_size(settings.max_frame_size)
                    .initial_stream_window_size(settings.initial_stream_window_size);

                let conn = builder.serve_connection(io, service);
                tokio::pin!(conn);
                tokio::select! {
                    res = conn.as_mut() => res,
                    _ = shutdown.recv() => {
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                }
            }
            NegotiatedStack::Http1 {
                codec,
                max_content_length,
                router,
            } => {
                let service = limited(router, max_content_length);
                let mut builder = http1::Builder::new();
                builder
                    .keep_alive(codec.keep_alive())
                    .max_buf_size(codec.max_buf_size());

                let conn = builder.serve_connection(io, service);
                tokio::pin!(conn);
                tokio::select! {
                    res = conn.as_mut() => res,
                    _ = shutdown.recv() => {
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                }
            }
        }
    }
}

fn limited(router: Router, max_content_length: usize) -> TowerToHyperService<Router> {
    TowerToHyperService::new(router.layer(RequestBodyLimitLayer::new(max_content_length)))
}

/// State shared by every connection of one server.
struct Shared {
    config: GatewayConfig,
    acceptor: TlsAcceptor,
    configurator: Arc<dyn PipelineConfigurator>,
}

impl Shared {
    fn pipeline(&self, connection_id: ConnectionId) -> Result<Pipeline, PipelineError> {
        let mut pipeline = Pipeline::new(connection_id).with_span(tracing::Span::current());
        pipeline.add_last(TLS_HANDLER, TlsHandler::new())?;
        pipeline.add_last(
            NEGOTIATION_GATE,
            NegotiationGate::new(
                self.config.negotiation.fallback_protocol.clone(),
                Arc::clone(&self.configurator),
            ),
        )?;
        Ok(pipeline)
    }

    fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeouts.handshake_secs)
    }
}

/// HTTPS server negotiating HTTP/2 or HTTP/1.1 per connection.
pub struct HttpServer {
    shared: Arc<Shared>,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a server that installs the HTTP/2-or-HTTP/1.1 stacks.
    ///
    /// Fails when the negotiation, stack or timeout settings are invalid.
    pub fn new(config: GatewayConfig, tls: Arc<rustls::ServerConfig>) -> Result<Self, ConfigError> {
        let configurator = Arc::new(Http2OrHttpConfigurator::new(&config, router()));
        Self::with_configurator(config, tls, configurator)
    }

    /// Create a server with a custom stack configurator.
    pub fn with_configurator(
        config: GatewayConfig,
        tls: Arc<rustls::ServerConfig>,
        configurator: Arc<dyn PipelineConfigurator>,
    ) -> Result<Self, ConfigError> {
        validate_serving(&config).map_err(ConfigError::Validation)?;

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                acceptor: TlsAcceptor::from(tls),
                configurator,
            }),
            tracker: ConnectionTracker::new(),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.shared.config
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Run the server, accepting connections until `shutdown` fires.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(
            address = %addr,
            max_connections = listener.max_connections(),
            "HTTPS server starting"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                        Err(e) => return Err(e),
                    };

                    let guard = self.tracker.track();
                    let span = tracing::info_span!(
                        "connection",
                        connection_id = %guard.id(),
                        peer = %peer
                    );
                    let shared = Arc::clone(&self.shared);
                    let shutdown = shutdown.resubscribe();

                    tokio::spawn(
                        async move {
                            handle_connection(shared, stream, guard.id(), shutdown).await;
                            drop(permit);
                            drop(guard);
                        }
                        .instrument(span),
                    );
                }
            }
        }

        drop(listener);
        tracing::info!(
            active_connections = self.tracker.active_count(),
            "Stopped accepting, draining connections"
        );

        let grace = Duration::from_secs(self.shared.config.timeouts.shutdown_grace_secs);
        if tokio::time::timeout(grace, self.tracker.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Shutdown grace period elapsed with connections still open"
            );
        }

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

async fn handle_connection(
    shared: Arc<Shared>,
    stream: TcpStream,
    connection_id: ConnectionId,
    shutdown: broadcast::Receiver<()>,
) {
    let mut pipeline = match shared.pipeline(connection_id) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build connection pipeline");
            return;
        }
    };
    pipeline.fire_event(Event::Active);

    let handshake = shared.acceptor.accept(stream);
    let mut tls = match tokio::time::timeout(shared.handshake_timeout(), handshake).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "TLS handshake failed");
            metrics::record_handshake("failed");
            finish(&mut pipeline, HandshakeCompletion::failed(e.to_string()));
            return;
        }
        Err(_) => {
            tracing::debug!("TLS handshake timed out");
            metrics::record_handshake("timed_out");
            finish(&mut pipeline, HandshakeCompletion::failed("handshake timed out"));
            return;
        }
    };
    metrics::record_handshake("succeeded");

    let (_, session) = tls.get_ref();
    let alpn = session.alpn_protocol().and_then(Protocol::from_alpn);
    if let Some(terminator) = pipeline.get_mut::<TlsHandler>() {
        terminator.record_session(session);
        tracing::debug!(sni = ?terminator.server_name(), "TLS session established");
    }
    pipeline.fire_event(Event::HandshakeCompleted(HandshakeCompletion::succeeded(alpn)));

    if pipeline.is_closed() {
        match tokio::time::timeout(CLOSE_NOTIFY_TIMEOUT, tls.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "TLS shutdown failed"),
            Err(_) => tracing::debug!("TLS shutdown timed out"),
        }
        pipeline.fire_event(Event::Inactive);
        return;
    }

    match NegotiatedStack::from_pipeline(&pipeline) {
        Some(stack) => {
            tracing::debug!(protocol = %stack.protocol(), "Serving connection");
            if let Err(e) = stack.serve(tls, shutdown).await {
                tracing::debug!(error = %e, "Connection ended with error");
            }
        }
        None => {
            tracing::warn!(pipeline = ?pipeline.names(), "No protocol stack installed, closing");
        }
    }

    pipeline.fire_event(Event::Inactive);
    pipeline.close();
}

fn finish(pipeline: &mut Pipeline, completion: HandshakeCompletion) {
    pipeline.fire_event(Event::HandshakeCompleted(completion));
    pipeline.fire_event(Event::Inactive);
    pipeline.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::NegotiationError;
    use crate::pipeline::PipelineStage;

    fn negotiated(protocol: Protocol) -> Pipeline {
        let configurator =
            Arc::new(Http2OrHttpConfigurator::new(&GatewayConfig::default(), Router::new()));
        let mut pipeline = Pipeline::new(ConnectionId::new());
        pipeline.add_last(TLS_HANDLER, TlsHandler::new()).unwrap();
        pipeline
            .add_last(
                NEGOTIATION_GATE,
                NegotiationGate::new(Protocol::HTTP_1_1, configurator),
            )
            .unwrap();
        pipeline.fire_event(Event::HandshakeCompleted(HandshakeCompletion::succeeded(
            Some(protocol),
        )));
        pipeline
    }

    #[test]
    fn stack_read_from_h2_pipeline() {
        let stack = NegotiatedStack::from_pipeline(&negotiated(Protocol::HTTP_2)).unwrap();
        assert_eq!(stack.protocol(), Protocol::HTTP_2);
    }

    #[test]
    fn stack_read_from_http1_pipeline() {
        let stack = NegotiatedStack::from_pipeline(&negotiated(Protocol::HTTP_1_1)).unwrap();
        match stack {
            NegotiatedStack::Http1 {
                max_content_length, ..
            } => assert_eq!(max_content_length, 102_400),
            NegotiatedStack::Http2 { .. } => panic!("expected the HTTP/1.1 stack"),
        }
    }

    #[test]
    fn no_stack_before_negotiation() {
        let mut pipeline = Pipeline::new(ConnectionId::new());
        pipeline.add_last(TLS_HANDLER, TlsHandler::new()).unwrap();
        assert!(NegotiatedStack::from_pipeline(&pipeline).is_none());
    }

    #[test]
    fn incomplete_stack_is_not_served() {
        let configurator = Arc::new(
            |stage: &mut PipelineStage<'_>, protocol: &Protocol| -> Result<(), NegotiationError> {
                stage
                    .add_last("request-handler", RequestHandler::new(Router::new()))
                    .map_err(|e| NegotiationError::configuration(protocol.clone(), e))?;
                Ok(())
            },
        );
        let mut pipeline = Pipeline::new(ConnectionId::new());
        pipeline.add_last(TLS_HANDLER, TlsHandler::new()).unwrap();
        pipeline
            .add_last(
                NEGOTIATION_GATE,
                NegotiationGate::new(Protocol::HTTP_1_1, configurator),
            )
            .unwrap();
        pipeline.fire_event(Event::HandshakeCompleted(HandshakeCompletion::succeeded(None)));

        assert!(NegotiatedStack::from_pipeline(&pipeline).is_none());
    }
}
