//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection with a negotiated pipeline
//!     → configurator.rs (installs the h2 or http/1.1 stack)
//!     → stack.rs (handlers describing the installed stack)
//!     → server.rs (hyper connection for that stack)
//!     → handler.rs (axum router answering requests)
//! ```

pub mod configurator;
pub mod handler;
pub mod server;
pub mod stack;

pub use configurator::Http2OrHttpConfigurator;
pub use server::{HttpServer, NegotiatedStack};
