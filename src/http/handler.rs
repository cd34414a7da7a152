//! Request handling for negotiated connections.
//!
//! # Routes
//! - `GET /`: reports the HTTP version the request arrived over
//! - `POST /echo`: returns the request body unchanged
//!
//! Every response carries an `x-request-id` header, generated when the
//! client did not send one.

use axum::{
    body::Bytes,
    http::Version,
    routing::{get, post},
    Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

/// Build the router shared by every protocol stack.
pub fn router() -> Router {
    Router::new()
        .route("/", get(version))
        .route("/echo", post(echo))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn version(version: Version) -> String {
    format!("{version:?}")
}

async fn echo(body: Bytes) -> Bytes {
    body
}
