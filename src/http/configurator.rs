//! HTTP/2-or-HTTP/1.1 stack selection.
//!
//! # Responsibilities
//! - Install the HTTP/2 stack for `h2`
//! - Install the HTTP/1.1 stack for `http/1.1`
//! - Refuse every other token
//!
//! # Design Decisions
//! - Both stacks share one request handler (router) and one content cap
//! - Stack settings are taken from the configuration once, at startup

use axum::Router;

use crate::config::GatewayConfig;
use crate::http::stack::{
    Http2ConnectionHandler, Http2Settings, HttpObjectAggregator, HttpServerCodec, RequestHandler,
    HTTP1_AGGREGATOR, HTTP1_CODEC, HTTP2_CONNECTION, REQUEST_HANDLER,
};
use crate::negotiation::{NegotiationError, PipelineConfigurator, Protocol};
use crate::pipeline::{PipelineError, PipelineStage};

/// Configures a connection for HTTP/2 or HTTP/1.1.
pub struct Http2OrHttpConfigurator {
    http2: Http2Settings,
    codec: HttpServerCodec,
    max_content_length: usize,
    router: Router,
}

impl Http2OrHttpConfigurator {
    pub fn new(config: &GatewayConfig, router: Router) -> Self {
        let max_content_length = config.negotiation.max_content_length;
        Self {
            http2: Http2Settings::from_config(&config.http2, max_content_length),
            codec: HttpServerCodec::new(&config.http1),
            max_content_length,
            router,
        }
    }

    fn configure_http2(&self, stage: &mut PipelineStage<'_>) -> Result<(), PipelineError> {
        stage
            .add_last(HTTP2_CONNECTION, Http2ConnectionHandler::new(self.http2.clone()))?
            .add_last(REQUEST_HANDLER, RequestHandler::new(self.router.clone()))?;
        Ok(())
    }

    fn configure_http1(&self, stage: &mut PipelineStage<'_>) -> Result<(), PipelineError> {
        stage
            .add_last(HTTP1_CODEC, self.codec.clone())?
            .add_last(
                HTTP1_AGGREGATOR,
                HttpObjectAggregator::new(self.max_content_length),
            )?
            .add_last(REQUEST_HANDLER, RequestHandler::new(self.router.clone()))?;
        Ok(())
    }
}

impl PipelineConfigurator for Http2OrHttpConfigurator {
    fn configure_pipeline(
        &self,
        stage: &mut PipelineStage<'_>,
        protocol: &Protocol,
    ) -> Result<(), NegotiationError> {
        tracing::debug!(
            connection_id = %stage.connection_id(),
            protocol = %protocol,
            "Installing protocol stack"
        );
        let configured = if *protocol == Protocol::HTTP_2 {
            self.configure_http2(stage)
        } else if *protocol == Protocol::HTTP_1_1 {
            self.configure_http1(stage)
        } else {
            return Err(NegotiationError::UnknownProtocol(protocol.clone()));
        };

        configured.map_err(|e| NegotiationError::configuration(protocol.clone(), e))
    }
}
