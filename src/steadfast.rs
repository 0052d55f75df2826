use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::UpstreamError;
use crate::models::ShopifyOrder;
use crate::upstream::send_json;

/// Courier that picks up cash-on-delivery parcels.
#[async_trait]
pub trait Courier: Send + Sync {
    async fn create_consignment(&self, consignment: &Consignment) -> Result<Value, UpstreamError>;
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Consignment {
    pub invoice: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_address: String,
    pub cod_amount: f64,
    pub note: String,
    pub product_details: String,
    pub delivery_area: String,
    pub pickup_address: String,
}

impl Consignment {
    // cod_amount is the full order total, delivery included
    pub fn from_order(order: &ShopifyOrder, delivery_area: &str, pickup_address: &str) -> Self {
        let shipping = order.shipping_address.clone().unwrap_or_default();

        let (product, quantity) = order
            .line_items
            .first()
            .map(|item| {
                (
                    item.title.clone().filter(|t| !t.is_empty()),
                    item.quantity.filter(|q| *q > 0),
                )
            })
            .unwrap_or((None, None));

        Self {
            invoice: order.id.map(|id| id.to_string()).unwrap_or_default(),
            recipient_name: shipping.first_name.unwrap_or_default(),
            recipient_phone: shipping.phone.unwrap_or_default(),
            recipient_address: shipping.address1.unwrap_or_default(),
            cod_amount: order.total(),
            note: order.note.clone().unwrap_or_default(),
            product_details: format!(
                "{} x{}",
                product.as_deref().unwrap_or("Product"),
                quantity.unwrap_or(1)
            ),
            delivery_area: delivery_area.to_string(),
            pickup_address: pickup_address.to_string(),
        }
    }
}

pub struct SteadfastClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    secret_key: String,
    timeout: Duration,
}

impl SteadfastClient {
    pub fn new(
        client: reqwest::Client,
        api_url: &str,
        api_key: &str,
        secret_key: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl Courier for SteadfastClient {
    async fn create_consignment(&self, consignment: &Consignment) -> Result<Value, UpstreamError> {
        if self.api_url.is_empty() {
            return Err(UpstreamError::Malformed("courier API url not configured".to_string()));
        }

        let req = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .header("secret-key", &self.secret_key)
            .json(consignment)
            .timeout(self.timeout);

        send_json("courier", req).await
    }
}
