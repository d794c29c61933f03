//! Envelope cipher, protocol definitions, and errors shared across `shipit` crates.

pub mod envelope;
pub mod error;
pub mod protocol;

pub use envelope::{EnvelopeError, KeyMaterial};
pub use error::ServiceError;
