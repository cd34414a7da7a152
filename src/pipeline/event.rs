//! Events flowing through a connection pipeline.

use bytes::Bytes;

use crate::negotiation::Protocol;

/// An event delivered to the handlers of one connection, head to tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The transport is connected.
    Active,
    /// Inbound bytes read from the transport.
    Read(Bytes),
    /// The TLS handshake finished, successfully or not.
    HandshakeCompleted(HandshakeCompletion),
    /// The transport was closed.
    Inactive,
}

impl Event {
    /// Short, stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Active => "active",
            Event::Read(_) => "read",
            Event::HandshakeCompleted(_) => "handshake_completed",
            Event::Inactive => "inactive",
        }
    }
}

/// Outcome of a TLS handshake, emitted once per connection by the TLS layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeCompletion {
    /// Handshake succeeded. `protocol` is the ALPN token, if one was agreed.
    Succeeded { protocol: Option<Protocol> },
    /// Handshake failed.
    Failed { cause: String },
}

impl HandshakeCompletion {
    pub fn succeeded(protocol: Option<Protocol>) -> Self {
        HandshakeCompletion::Succeeded { protocol }
    }

    pub fn failed(cause: impl Into<String>) -> Self {
        HandshakeCompletion::Failed {
            cause: cause.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HandshakeCompletion::Succeeded { .. })
    }

    /// The negotiated protocol. Always `None` for a failed handshake.
    pub fn negotiated_protocol(&self) -> Option<&Protocol> {
        match self {
            HandshakeCompletion::Succeeded { protocol } => protocol.as_ref(),
            HandshakeCompletion::Failed { .. } => None,
        }
    }
}
