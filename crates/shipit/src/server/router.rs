//! Axum router construction.

use std::time::Duration;

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    routing::{get, post},
    BoxError, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
///
/// Fallbacks and the timeout handler seal their bodies like every handler.
pub fn build(state: AppState, request_timeout: Duration) -> Router {
    let on_middleware_error = {
        let state = state.clone();
        move |err: BoxError| {
            let state = state.clone();
            async move { handlers::middleware_error(&state, err) }
        }
    };

    Router::new()
        .route(
            "/",
            get(handlers::banner).fallback(handlers::method_not_allowed),
        )
        .route(
            "/calculate/rates",
            post(handlers::calculate_rates).fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::not_found)
        .layer(PropagateRequestIdLayer::new(middleware::REQUEST_ID_HEADER))
        .layer(TraceLayer::new_for_http().make_span_with(middleware::make_span::<Body>))
        .layer(SetRequestIdLayer::new(
            middleware::REQUEST_ID_HEADER,
            MakeRequestUuid,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(on_middleware_error))
                .timeout(request_timeout),
        )
        .with_state(state)
}
