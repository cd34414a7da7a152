//! Application-layer protocol tokens.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::negotiation::NegotiationError;

/// An ALPN protocol identifier such as `h2` or `http/1.1`.
///
/// Tokens are opaque and compared byte for byte. They are never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Protocol(Cow<'static, str>);

impl Protocol {
    /// HTTP/2 over TLS.
    pub const HTTP_2: Protocol = Protocol(Cow::Borrowed("h2"));
    /// HTTP/1.1.
    pub const HTTP_1_1: Protocol = Protocol(Cow::Borrowed("http/1.1"));

    pub fn new(token: impl Into<String>) -> Result<Self, NegotiationError> {
        let token = token.into();
        if token.is_empty() {
            return Err(NegotiationError::EmptyProtocol);
        }
        Ok(Self(Cow::Owned(token)))
    }

    /// Build a token from the raw ALPN bytes agreed during the handshake.
    pub fn from_alpn(id: &[u8]) -> Option<Self> {
        let token = std::str::from_utf8(id).ok()?;
        if token.is_empty() {
            return None;
        }
        Some(Self(Cow::Owned(token.to_owned())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wire form, as advertised in the ALPN extension.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Protocol {
    type Err = NegotiationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Protocol {
    type Error = NegotiationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Protocol> for String {
    fn from(protocol: Protocol) -> Self {
        protocol.0.into_owned()
    }
}

impl PartialEq<str> for Protocol {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Protocol {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
