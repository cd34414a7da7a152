//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, frame sizes within protocol bounds)
//! - Check that the fallback protocol has a stack to install
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::negotiation::Protocol;

const MIN_FRAME_SIZE: u32 = 16_384;
const MAX_FRAME_SIZE: u32 = 16_777_215;
const MIN_BUF_SIZE: usize = 8192;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("listener.tls is required")]
    MissingTls,

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error(
        "negotiation.fallback_protocol {0:?} has no protocol stack \
         (expected \"h2\" or \"http/1.1\")"
    )]
    UnsupportedFallback(String),

    #[error("http2.max_frame_size {0} is outside 16384..=16777215")]
    FrameSize(u32),

    #[error("http1.max_buf_size {0} is below 8192")]
    BufferSize(usize),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }

    match &config.listener.tls {
        None => errors.push(ValidationError::MissingTls),
        Some(tls) => {
            if tls.cert_path.is_empty() {
                errors.push(ValidationError::Empty("listener.tls.cert_path"));
            }
            if tls.key_path.is_empty() {
                errors.push(ValidationError::Empty("listener.tls.key_path"));
            }
            if tls.alpn_protocols.is_empty() {
                errors.push(ValidationError::Empty("listener.tls.alpn_protocols"));
            }
        }
    }

    check_serving(config, &mut errors);

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    finish(errors)
}

/// Validate only the settings a server reads per connection: negotiation,
/// both protocol stacks and timeouts.
///
/// Listener and TLS sections are left out, since a server is handed an
/// already bound listener and a built TLS configuration.
pub fn validate_serving(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_serving(config, &mut errors);
    finish(errors)
}

fn check_serving(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let fallback = &config.negotiation.fallback_protocol;
    if *fallback != Protocol::HTTP_2 && *fallback != Protocol::HTTP_1_1 {
        errors.push(ValidationError::UnsupportedFallback(fallback.to_string()));
    }
    if config.negotiation.max_content_length == 0 {
        errors.push(ValidationError::Zero("negotiation.max_content_length"));
    }

    if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&config.http2.max_frame_size) {
        errors.push(ValidationError::FrameSize(config.http2.max_frame_size));
    }
    if config.http2.max_concurrent_streams == 0 {
        errors.push(ValidationError::Zero("http2.max_concurrent_streams"));
    }
    if config.http1.max_buf_size < MIN_BUF_SIZE {
        errors.push(ValidationError::BufferSize(config.http1.max_buf_size));
    }

    if config.timeouts.handshake_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.handshake_secs"));
    }
}

fn finish(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
