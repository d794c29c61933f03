//! Axum request handlers for all service endpoints.
//!
//! Every response body, error bodies included, is sealed with the shared keys.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    response::Response,
    BoxError,
};
use common::{envelope, protocol::Order, ServiceError};
use tracing::{error, info, warn};

use super::state::AppState;

/// `GET /` — sealed service banner.
///
/// Lets a caller confirm the service is up and that its copy of the keys
/// matches: with mismatched keys the banner fails to open client-side.
pub async fn banner(State(state): State<AppState>) -> Response {
    state.sealed(StatusCode::OK, &state.greeting)
}

/// `POST /calculate/rates` — quote shipping for a sealed order.
pub async fn calculate_rates(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match quote(&state, body).await {
        Ok(json) => state.sealed(StatusCode::OK, &json),
        Err(err) => state.sealed_error(&err),
    }
}

/// Catch-all 404 handler.
pub async fn not_found(State(state): State<AppState>) -> Response {
    state.sealed_error(&ServiceError::NotFound)
}

/// Method fallback for known routes.
pub async fn method_not_allowed(State(state): State<AppState>) -> Response {
    state.sealed_error(&ServiceError::MethodNotAllowed)
}

/// Error handler for fallible middleware (the request timeout).
pub fn middleware_error(state: &AppState, err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        warn!("request timed out");
        return state.sealed_error(&ServiceError::Timeout);
    }
    error!(error = %err, "middleware failure");
    state.sealed_error(&ServiceError::ServiceFailure)
}

/// open → parse → validate → quote → serialise. Stops at the first failure.
async fn quote(
    state: &AppState,
    body: Result<Bytes, BytesRejection>,
) -> Result<String, ServiceError> {
    let body = body.map_err(|e| {
        info!(error = %e, "request body could not be read");
        ServiceError::BadRequest
    })?;

    let plaintext = std::str::from_utf8(&body)
        .map_err(|_| envelope::EnvelopeError::Authentication)
        .and_then(|wire| envelope::open_str(wire.trim(), &state.keys))
        .map_err(|_| {
            warn!("request body failed authentication");
            ServiceError::Unauthenticated
        })?;

    let order = Order::from_json(&plaintext).map_err(|e| {
        info!(error = %e, "order rejected");
        e
    })?;

    let quotes = state.provider.calculate(&order).await.map_err(|e| {
        if e.is_disclosable() {
            info!(error = %e, "rate provider rejected order");
        } else {
            error!(error = %e, "rate provider failed");
        }
        ServiceError::from(e)
    })?;

    serde_json::to_string(&quotes).map_err(|e| {
        error!(error = %e, "failed to serialise quote");
        ServiceError::ServiceFailure
    })
}
