//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::negotiation::{Protocol, MAX_CONTENT_LENGTH};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Protocol negotiation settings.
    pub negotiation: NegotiationConfig,

    /// HTTP/2 stack settings.
    pub http2: Http2Config,

    /// HTTP/1.1 stack settings.
    pub http1: Http1Config,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// TLS configuration. Required to serve traffic.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// ALPN tokens advertised to clients, in order of preference.
    #[serde(default = "default_alpn_protocols")]
    pub alpn_protocols: Vec<Protocol>,
}

fn default_alpn_protocols() -> Vec<Protocol> {
    vec![Protocol::HTTP_2, Protocol::HTTP_1_1]
}

/// Protocol negotiation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Protocol used when the handshake agreed on none.
    pub fallback_protocol: Protocol,

    /// Maximum aggregated request content in bytes, for every stack.
    pub max_content_length: usize,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            fallback_protocol: Protocol::HTTP_1_1,
            max_content_length: MAX_CONTENT_LENGTH,
        }
    }
}

/// HTTP/2 stack settings.
///
/// Unknown keys are rejected, so a setting the stack cannot honour is an
/// error rather than a no-op.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Http2Config {
    /// SETTINGS_MAX_CONCURRENT_STREAMS advertised to clients.
    pub max_concurrent_streams: u32,

    /// SETTINGS_MAX_FRAME_SIZE, 16_384..=16_777_215.
    pub max_frame_size: u32,

    /// Initial per-stream flow control window.
    pub initial_stream_window_size: u32,
}

impl Default for Http2Config {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 100,
            max_frame_size: 16_384,
            initial_stream_window_size: 65_535,
        }
    }
}

/// HTTP/1.1 stack settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Http1Config {
    /// Keep connections open between requests.
    pub keep_alive: bool,

    /// Maximum read buffer size in bytes (at least 8192).
    pub max_buf_size: usize,
}

impl Default for Http1Config {
    fn default() -> Self {
        Self {
            keep_alive: true,
            max_buf_size: 64 * 1024,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Maximum time allowed for the TLS handshake, in seconds.
    pub handshake_secs: u64,

    /// How long shutdown waits for open connections to finish, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_secs: 10,
            shutdown_grace_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.negotiation.fallback_protocol, Protocol::HTTP_1_1);
        assert_eq!(config.negotiation.max_content_length, 102_400);
        assert!(config.listener.tls.is_none());
        assert_eq!(config.http2.max_frame_size, 16_384);
    }

    #[test]
    fn unsupported_http2_setting_rejected() {
        let parsed: Result<GatewayConfig, _> = toml::from_str(
            r#"
            [http2]
            validate_headers = true
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn tls_section_defaults_alpn() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [listener.tls]
            cert_path = "cert.pem"
            key_path = "key.pem"
            "#,
        )
        .unwrap();

        let tls = config.listener.tls.unwrap();
        assert_eq!(tls.alpn_protocols, vec![Protocol::HTTP_2, Protocol::HTTP_1_1]);
    }
}
