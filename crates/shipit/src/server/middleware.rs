//! Tower middleware helpers applied to the router.
//!
//! Includes per-request span construction for access logging.

use axum::http::{HeaderName, Request};
use tracing::Span;

/// Header carrying the per-request id, set on the way in and echoed on the way out.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Build the access-log span for a request.
///
/// Only the method, path and request id are recorded. Bodies are sealed and
/// never logged.
pub fn make_span<B>(req: &Request<B>) -> Span {
    let request_id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        request_id,
    )
}
