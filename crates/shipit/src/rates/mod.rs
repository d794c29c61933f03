//! Shipping-rate lookup: the collaborator behind `POST /calculate/rates`.
//!
//! Handlers only see the [`RateProvider`] trait. Its failures are typed, and
//! each [`RateError`] variant states up front whether its message may reach
//! the caller.

pub mod easypost;

pub use easypost::EasyPostProvider;

use async_trait::async_trait;
use common::protocol::{ItemQuote, Order};
use common::ServiceError;
use thiserror::Error;

/// Which end of the shipment an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRole {
    Source,
    Destination,
}

impl std::fmt::Display for AddressRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressRole::Source => f.write_str("source"),
            AddressRole::Destination => f.write_str("destination"),
        }
    }
}

/// Errors produced by a rate provider.
#[derive(Debug, Error)]
pub enum RateError {
    /// The carrier could not verify an address.
    #[error("Invalid {0} address")]
    InvalidAddress(AddressRole),

    /// The carrier rejected an item's parcel dimensions.
    #[error("Invalid item package: {0}")]
    InvalidParcel(String),

    /// The carrier returned no usable rates for a shipment.
    #[error("unable to retrieve shipment rates: {0}")]
    RatesUnavailable(String),

    /// Transport failure or unexpected carrier response.
    #[error("carrier request failed: {0}")]
    Upstream(String),
}

impl RateError {
    /// Whether the `Display` text of this error may be shown to the caller.
    pub fn is_disclosable(&self) -> bool {
        matches!(
            self,
            RateError::InvalidAddress(_) | RateError::InvalidParcel(_)
        )
    }
}

impl From<RateError> for ServiceError {
    fn from(e: RateError) -> Self {
        if e.is_disclosable() {
            ServiceError::Rejected(e.to_string())
        } else {
            ServiceError::ServiceFailure
        }
    }
}

/// Computes per-item shipping quotes for a validated order.
///
/// Implementations must return exactly one [`ItemQuote`] per order item, in
/// item order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Quote every item of `order`.
    async fn calculate(&self, order: &Order) -> Result<Vec<ItemQuote>, RateError>;
}
