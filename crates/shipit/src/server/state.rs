//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use common::{envelope, KeyMaterial, ServiceError};
use tracing::error;

use crate::rates::RateProvider;

/// Application state shared across all request handlers.
///
/// All fields are `Arc`-wrapped so Axum can clone the state per request
/// without copying key material.
#[derive(Clone)]
pub struct AppState {
    /// The process-wide key pair. Read-only after startup.
    pub keys: Arc<KeyMaterial>,
    /// Computes quotes for validated orders.
    pub provider: Arc<dyn RateProvider>,
    /// Plaintext returned (sealed) by `GET /`.
    pub greeting: Arc<String>,
}

impl AppState {
    /// Create a new [`AppState`] from the loaded keys and a rate provider.
    pub fn new(keys: KeyMaterial, provider: Arc<dyn RateProvider>) -> Self {
        Self {
            keys: Arc::new(keys),
            provider,
            greeting: Arc::new(format!(
                "{} version {}. Ask your doctor. Use as directed.",
                env!("CARGO_PKG_DESCRIPTION"),
                env!("CARGO_PKG_VERSION"),
            )),
        }
    }

    /// Seal `text` and return it with `status`.
    ///
    /// If sealing fails the response is a bare 500: a body is never written
    /// unsealed.
    pub fn sealed(&self, status: StatusCode, text: &str) -> Response {
        match envelope::seal(text.as_bytes(), &self.keys) {
            Ok(wire) => (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                wire,
            )
                .into_response(),
            Err(e) => {
                error!(error = %e, "failed to seal response body");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }

    /// Seal the caller-facing message of `err` with its mapped status.
    pub fn sealed_error(&self, err: &ServiceError) -> Response {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.sealed(status, &err.to_string())
    }
}
