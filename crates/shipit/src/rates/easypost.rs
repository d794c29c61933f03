//! [`RateProvider`] backed by the EasyPost REST API.
//!
//! A deliberately simple calculator: the first shipping origin is used
//! regardless of how many are given, and every item gets its own parcel and
//! quote. No aggregation or product fitting.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use common::protocol::{ItemQuote, Order, OrderItem, Rate, ShippingAddress};

use super::{AddressRole, RateError, RateProvider};

/// Outcome of a carrier call that reached the API.
enum Reply {
    /// 2xx with a JSON body.
    Accepted(Value),
    /// 4xx: the carrier refused the submitted data.
    Refused(StatusCode),
}

/// EasyPost HTTP client.
#[derive(Clone)]
pub struct EasyPostProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EasyPostProvider {
    /// Build a provider talking to `base_url` (e.g. `https://api.easypost.com/v2`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            warn!("no EasyPost key configured; rate lookups will fail");
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build EasyPost HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        })
    }

    async fn post(&self, resource: &str, body: &Value) -> Result<Reply, RateError> {
        let url = format!("{}/{resource}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.api_key, None::<&str>)
            .json(body)
            .send()
            .await
            .map_err(|e| RateError::Upstream(format!("{resource}: {e}")))?;

        let status = resp.status();
        debug!(resource, status = status.as_u16(), "carrier response");
        if status.is_client_error() {
            return Ok(Reply::Refused(status));
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| RateError::Upstream(format!("{resource}: {e}")))?;
        resp.json::<Value>()
            .await
            .map(Reply::Accepted)
            .map_err(|e| RateError::Upstream(format!("{resource}: invalid body: {e}")))
    }

    async fn verify_address(
        &self,
        address: &ShippingAddress,
        role: AddressRole,
    ) -> Result<(), RateError> {
        let body = json!({ "address": address, "verify": ["delivery"] });
        match self.post("addresses", &body).await? {
            Reply::Refused(status) => {
                warn!(%role, status = status.as_u16(), "address rejected by carrier");
                Err(RateError::InvalidAddress(role))
            }
            Reply::Accepted(created) => {
                if !delivery_verified(&created) {
                    warn!(%role, "address failed delivery verification");
                    return Err(RateError::InvalidAddress(role));
                }
                if let Some(note) = created.get("message").and_then(Value::as_str) {
                    warn!(%role, carrier_message = note, "address verified with warning");
                }
                Ok(())
            }
        }
    }

    async fn quote_item(
        &self,
        item: &OrderItem,
        source: &ShippingAddress,
        target: &ShippingAddress,
    ) -> Result<ItemQuote, RateError> {
        let product = item.product_label();

        let parcel = json!({ "parcel": item.product_parcel });
        if let Reply::Refused(status) = self.post("parcels", &parcel).await? {
            warn!(product = %product, status = status.as_u16(), "parcel rejected by carrier");
            return Err(RateError::InvalidParcel(product));
        }

        let shipment = json!({
            "shipment": {
                "to_address": target,
                "from_address": source,
                "parcel": item.product_parcel,
            }
        });
        let rates = match self.post("shipments", &shipment).await? {
            Reply::Refused(status) => {
                return Err(RateError::RatesUnavailable(format!(
                    "shipment for {product} refused with {status}"
                )))
            }
            Reply::Accepted(created) => rates_from_shipment(&created)?,
        };

        Ok(ItemQuote {
            product_id: item.product_id.clone(),
            variant: item.variant.clone(),
            origin_address: source.clone(),
            destination_address: target.clone(),
            parcel: item.product_parcel.clone(),
            rates,
        })
    }
}

#[async_trait]
impl RateProvider for EasyPostProvider {
    async fn calculate(&self, order: &Order) -> Result<Vec<ItemQuote>, RateError> {
        let source = ShippingAddress::from(order.origin());
        let target = ShippingAddress::from(&order.destination);

        tokio::try_join!(
            self.verify_address(&source, AddressRole::Source),
            self.verify_address(&target, AddressRole::Destination),
        )?;

        let quotes = try_join_all(
            order
                .items
                .iter()
                .map(|item| self.quote_item(item, &source, &target)),
        )
        .await?;

        info!(items = quotes.len(), "order quoted");
        Ok(quotes)
    }
}

/// `false` only when the carrier explicitly reports a failed delivery check.
fn delivery_verified(address: &Value) -> bool {
    address
        .pointer("/verifications/delivery/success")
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

fn rates_from_shipment(shipment: &Value) -> Result<Vec<Rate>, RateError> {
    let rates = shipment
        .get("rates")
        .cloned()
        .ok_or_else(|| RateError::RatesUnavailable("shipment has no rates".into()))?;
    let rates: Vec<Rate> = serde_json::from_value(rates)
        .map_err(|e| RateError::Upstream(format!("malformed rates: {e}")))?;
    Ok(rates.into_iter().map(Rate::normalize).collect())
}
