//! Application-level protocol negotiation.
//!
//! # Data Flow
//! ```text
//! TLS handshake completes (ALPN token or none)
//!     → gate.rs (intercept completion, resolve token, remove itself)
//!     → configurator.rs (install the stack for the token, staged)
//!     → pipeline continues with the new stack
//! ```
//!
//! # Design Decisions
//! - Negotiation is one-shot per connection; failures close the connection
//! - The gate refuses to attach without an upstream TLS terminator
//! - The configurator is a capability the gate holds, shared across connections

pub mod configurator;
pub mod error;
pub mod gate;
pub mod protocol;

pub use configurator::PipelineConfigurator;
pub use error::NegotiationError;
pub use gate::NegotiationGate;
pub use protocol::Protocol;

/// Maximum aggregated request content, in bytes, for every protocol stack.
pub const MAX_CONTENT_LENGTH: usize = 1024 * 100;
