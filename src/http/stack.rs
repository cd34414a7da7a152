//! Pipeline entries that make up the HTTP protocol stacks.
//!
//! These handlers describe the stack a connection runs once negotiation
//! has finished. They forward every event untouched; the server reads
//! their settings back out of the pipeline to drive hyper's connection
//! for the negotiated protocol.
//!
//! ```text
//! h2:       [tls] → http2-connection → request-handler
//! http/1.1: [tls] → http1-codec → http1-aggregator → request-handler
//! ```

use axum::Router;

use crate::config::{Http1Config, Http2Config};
use crate::pipeline::Handler;

pub const HTTP2_CONNECTION: &str = "http2-connection";
pub const HTTP1_CODEC: &str = "http1-codec";
pub const HTTP1_AGGREGATOR: &str = "http1-aggregator";
pub const REQUEST_HANDLER: &str = "request-handler";

/// Settings of the server-side HTTP/2 connection.
///
/// `propagate_settings` and `validate_headers` are fixed: the connection
/// always applies the peer's SETTINGS frames and leaves header validation
/// to the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http2Settings {
    /// Acknowledge and apply the peer's SETTINGS frames.
    pub propagate_settings: bool,
    /// Reject requests carrying malformed header fields.
    pub validate_headers: bool,
    /// Cap on a single request's content, in bytes.
    pub max_content_length: usize,
    pub max_concurrent_streams: u32,
    pub max_frame_size: u32,
    pub initial_stream_window_size: u32,
}

impl Http2Settings {
    pub fn from_config(config: &Http2Config, max_content_length: usize) -> Self {
        Self {
            propagate_settings: true,
            validate_headers: false,
            max_content_length,
            max_concurrent_streams: config.max_concurrent_streams,
            max_frame_size: config.max_frame_size,
            initial_stream_window_size: config.initial_stream_window_size,
        }
    }
}

/// Server-side HTTP/2 connection handler.
#[derive(Debug, Clone)]
pub struct Http2ConnectionHandler {
    settings: Http2Settings,
}

impl Http2ConnectionHandler {
    pub fn new(settings: Http2Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Http2Settings {
        &self.settings
    }
}

impl Handler for Http2ConnectionHandler {}

/// HTTP/1.1 request decoder and response encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServerCodec {
    keep_alive: bool,
    max_buf_size: usize,
}

impl HttpServerCodec {
    pub fn new(config: &Http1Config) -> Self {
        Self {
            keep_alive: config.keep_alive,
            max_buf_size: config.max_buf_size,
        }
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn max_buf_size(&self) -> usize {
        self.max_buf_size
    }
}

impl Handler for HttpServerCodec {}

/// Aggregates an HTTP/1.1 message and its body into one full request,
/// refusing bodies larger than `max_content_length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpObjectAggregator {
    max_content_length: usize,
}

impl HttpObjectAggregator {
    pub fn new(max_content_length: usize) -> Self {
        Self { max_content_length }
    }

    pub fn max_content_length(&self) -> usize {
        self.max_content_length
    }
}

impl Handler for HttpObjectAggregator {}

/// The application handler at the tail of every stack.
#[derive(Clone)]
pub struct RequestHandler {
    router: Router,
}

impl RequestHandler {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}

impl Handler for RequestHandler {}
