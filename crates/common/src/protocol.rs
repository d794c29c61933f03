//! Request and response records carried inside the envelope.
//!
//! These types are serialised as JSON, then sealed. Unknown fields in inbound
//! records are ignored.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ServiceError;

// ---------------------------------------------------------------------------
// Rate request
// ---------------------------------------------------------------------------

/// A postal address as sent by the storefront.
///
/// Storefronts are loose about types: `null` reads as an empty string and
/// numbers or booleans (a numeric `zip`) read as their text form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    #[serde(deserialize_with = "lenient_string")]
    pub first_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub last_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub address_1: String,
    #[serde(deserialize_with = "lenient_opt_string")]
    pub address_2: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub city: String,
    #[serde(deserialize_with = "lenient_string")]
    pub state: String,
    #[serde(deserialize_with = "lenient_string")]
    pub zip: String,
    #[serde(deserialize_with = "lenient_string")]
    pub country: String,
    #[serde(deserialize_with = "lenient_string")]
    pub phone: String,
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

/// One line item of an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderItem {
    /// Storefront product identifier; numeric or string.
    pub product_id: Value,
    /// Variant descriptor, echoed back untouched.
    pub variant: Value,
    /// Parcel dimensions, forwarded to the carrier as-is.
    pub product_parcel: Value,
}

impl OrderItem {
    /// The product id as plain text, without JSON quoting.
    pub fn product_label(&self) -> String {
        match &self.product_id {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Body of `POST /calculate/rates` as decoded, before required-field checks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RateRequest {
    pub shipping_destination: Option<Address>,
    pub shipping_origins: Option<Vec<Address>>,
    pub items: Option<Vec<OrderItem>>,
}

impl RateRequest {
    /// Parse a decrypted request body.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::BadRequest`] if `json` is not a JSON object of
    /// the expected shape.
    pub fn from_json(json: &str) -> Result<Self, ServiceError> {
        let value: Value = serde_json::from_str(json).map_err(|_| ServiceError::BadRequest)?;
        if !value.is_object() {
            return Err(ServiceError::BadRequest);
        }
        serde_json::from_value(value).map_err(|_| ServiceError::BadRequest)
    }

    /// Check required fields in order, stopping at the first one missing.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::MissingField`] naming the first absent or empty
    /// field.
    pub fn validate(self) -> Result<Order, ServiceError> {
        let destination = self
            .shipping_destination
            .ok_or(ServiceError::MissingField("shipping_destination"))?;
        let origins = self
            .shipping_origins
            .filter(|o| !o.is_empty())
            .ok_or(ServiceError::MissingField("shipping_origins"))?;
        let items = self
            .items
            .filter(|i| !i.is_empty())
            .ok_or(ServiceError::MissingField("items"))?;
        Ok(Order {
            destination,
            origins,
            items,
        })
    }
}

/// A validated order: destination present, at least one origin and one item.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub destination: Address,
    pub origins: Vec<Address>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Parse and validate a decrypted request body in one step.
    ///
    /// # Errors
    ///
    /// See [`RateRequest::from_json`] and [`RateRequest::validate`].
    pub fn from_json(json: &str) -> Result<Self, ServiceError> {
        RateRequest::from_json(json)?.validate()
    }

    /// The origin rates are quoted from. Only the first origin is used.
    pub fn origin(&self) -> &Address {
        // `validate` guarantees at least one origin.
        &self.origins[0]
    }
}

// ---------------------------------------------------------------------------
// Rate response
// ---------------------------------------------------------------------------

/// A carrier-format address as echoed in a quote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub street1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub phone: String,
}

impl From<&Address> for ShippingAddress {
    fn from(a: &Address) -> Self {
        Self {
            name: format!("{} {}", a.first_name, a.last_name),
            street1: a.address_1.clone(),
            street2: a.address_2.clone().filter(|s| !s.is_empty()),
            city: a.city.clone(),
            state: a.state.clone(),
            zip: a.zip.clone(),
            country: a.country.clone(),
            phone: a.phone.clone(),
        }
    }
}

/// One carrier service offer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    #[serde(default)]
    pub carrier: String,
    #[serde(default)]
    pub service: String,
    /// Price as reported by the carrier (a decimal string).
    #[serde(default)]
    pub rate: Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Value,
    /// Any further carrier fields, passed through unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Rate {
    /// Fill `description` and `price` the way storefront clients expect them.
    pub fn normalize(mut self) -> Self {
        if self.description.as_deref().map_or(true, str::is_empty) {
            self.description = Some(format!("{} {}", self.carrier, self.service));
        }
        self.price = self.rate.clone();
        self
    }
}

/// The quote for a single order item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemQuote {
    pub product_id: Value,
    pub variant: Value,
    pub origin_address: ShippingAddress,
    pub destination_address: ShippingAddress,
    pub parcel: Value,
    pub rates: Vec<Rate>,
}
