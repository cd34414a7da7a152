//! ALPN gateway library.
//!
//! A TLS server that lets the handshake decide which HTTP stack a
//! connection runs, built with Tokio, rustls and hyper.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                  ALPN GATEWAY                    │
//!                        │                                                  │
//!   Client ──TCP────────▶│  net::listener ──▶ pipeline [tls, negotiation]   │
//!                        │                          │                       │
//!                        │              TLS handshake (ALPN: h2/http/1.1)   │
//!                        │                          │                       │
//!                        │                          ▼                       │
//!                        │        negotiation::gate removes itself and      │
//!                        │        http::configurator installs the stack     │
//!                        │                          │                       │
//!                        │            ┌─────────────┴─────────────┐         │
//!                        │            ▼                           ▼         │
//!                        │   [tls, http2-connection,   [tls, http1-codec,   │
//!                        │    request-handler]          http1-aggregator,   │
//!                        │                              request-handler]    │
//!                        │            │                           │         │
//!                        │            └──────▶ http::server ◀─────┘         │
//!                        │                   (hyper + axum)                 │
//!                        │                                                  │
//!                        │  config · observability · lifecycle              │
//!                        └──────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod negotiation;
pub mod net;
pub mod pipeline;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use negotiation::{NegotiationError, NegotiationGate, PipelineConfigurator, Protocol};
pub use pipeline::{Pipeline, PipelineStage};
