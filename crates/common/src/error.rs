//! Caller-visible error taxonomy.

use thiserror::Error;

/// Top-level service error type.
///
/// The `Display` text is exactly what the caller receives, sealed in an
/// envelope. Variants map to HTTP status codes:
/// - [`ServiceError::Unauthenticated`], [`ServiceError::BadRequest`],
///   [`ServiceError::MissingField`], [`ServiceError::Rejected`] → 400
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::MethodNotAllowed`] → 405
/// - [`ServiceError::Timeout`] → 408
/// - [`ServiceError::ServiceFailure`] → 500
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The body did not open under the shared keys. The cause is never disclosed.
    #[error("Really bad request")]
    Unauthenticated,

    /// The plaintext is not a JSON object of the expected shape.
    #[error("Bad request")]
    BadRequest,

    /// A required top-level field is absent or empty.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// The rate provider rejected the order for a reason safe to disclose.
    #[error("{0}")]
    Rejected(String),

    /// No route matches the request.
    #[error("Not found")]
    NotFound,

    /// The route exists but not for this HTTP method.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The request did not complete within the configured timeout.
    #[error("Request timeout")]
    Timeout,

    /// Anything else. Detail stays in the server log.
    #[error("Service failure")]
    ServiceFailure,
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::Unauthenticated
            | ServiceError::BadRequest
            | ServiceError::MissingField(_)
            | ServiceError::Rejected(_) => 400,
            ServiceError::NotFound => 404,
            ServiceError::MethodNotAllowed => 405,
            ServiceError::Timeout => 408,
            ServiceError::ServiceFailure => 500,
        }
    }
}
