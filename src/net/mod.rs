//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (TLS handshake, ALPN, TlsHandler terminator)
//!     → connection.rs (identity, lifecycle tracking)
//!     → Hand off to the negotiation pipeline
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - TLS is mandatory: ALPN is what selects the protocol stack

pub mod connection;
pub mod listener;
pub mod tls;
