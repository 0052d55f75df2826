use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::UpstreamError;
use crate::models::{NumOrText, ShopifyOrder};
use crate::upstream::send_json;

/// Receives conversion events for ad attribution.
#[async_trait]
pub trait ConversionSink: Send + Sync {
    async fn track(&self, event: &ConversionEvent) -> Result<Value, UpstreamError>;
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ConversionEvent {
    pub event: String,
    pub event_id: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<EventContext>,
    pub properties: EventProperties,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EventContext {
    pub page: PageContext,
    pub user: UserContext,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PageContext {
    pub url: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserContext {
    pub external_id: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EventProperties {
    pub currency: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttclid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<Vec<EventContent>>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EventContent {
    pub content_id: String,
    pub content_type: String,
    pub quantity: u32,
    pub price: f64,
}

impl ConversionEvent {
    /// `Purchase` for an order the storefront reports as paid.
    pub fn purchase(order: &ShopifyOrder, default_currency: &str, now_secs: i64) -> Self {
        let order_id = order.id.map(|id| id.to_string()).unwrap_or_default();

        // best stable identity we have for the buyer
        let external_id = order
            .customer
            .as_ref()
            .and_then(|c| c.id)
            .map(|id| id.to_string())
            .or_else(|| order.email.clone().filter(|s| !s.is_empty()))
            .or_else(|| order.phone.clone().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| order_id.clone());

        let contents = order
            .line_items
            .iter()
            .map(|item| EventContent {
                content_id: item.product_id.map(|id| id.to_string()).unwrap_or_default(),
                content_type: "product".to_string(),
                quantity: item.quantity.unwrap_or(1),
                price: item.price.as_ref().and_then(NumOrText::as_f64).unwrap_or(0.0),
            })
            .collect();

        Self {
            event: "Purchase".to_string(),
            event_id: format!("order_{order_id}"),
            timestamp: now_secs,
            context: Some(EventContext {
                page: PageContext {
                    url: order.order_status_url.clone().unwrap_or_default(),
                },
                user: UserContext { external_id },
            }),
            properties: EventProperties {
                currency: order
                    .currency
                    .clone()
                    .unwrap_or_else(|| default_currency.to_string()),
                value: order.total(),
                ttclid: None,
                contents: Some(contents),
            },
        }
    }

    /// `CompletePayment` fired by hand for an order placed outside the funnel.
    pub fn manual_payment(
        order_id: &str,
        value: f64,
        ttclid: Option<String>,
        currency: &str,
        now_secs: i64,
    ) -> Self {
        Self {
            event: "CompletePayment".to_string(),
            event_id: format!("manual_{order_id}"),
            timestamp: now_secs,
            context: None,
            properties: EventProperties {
                currency: currency.to_string(),
                value,
                ttclid: ttclid.filter(|s| !s.trim().is_empty()),
                contents: None,
            },
        }
    }
}

#[derive(Serialize)]
struct TrackPayload<'a> {
    pixel_code: &'a str,
    #[serde(flatten)]
    event: &'a ConversionEvent,
}

pub struct TikTokClient {
    client: reqwest::Client,
    events_url: String,
    pixel_id: String,
    access_token: String,
    timeout: Duration,
}

impl TikTokClient {
    pub fn new(
        client: reqwest::Client,
        events_url: &str,
        pixel_id: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            events_url: events_url.to_string(),
            pixel_id: pixel_id.to_string(),
            access_token: access_token.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl ConversionSink for TikTokClient {
    async fn track(&self, event: &ConversionEvent) -> Result<Value, UpstreamError> {
        let payload = TrackPayload {
            pixel_code: &self.pixel_id,
            event,
        };

        let req = self
            .client
            .post(&self.events_url)
            .header("Access-Token", &self.access_token)
            .json(&payload)
            .timeout(self.timeout);

        let res = send_json("ad-platform", req).await?;

        // the events API answers 200 with a non-zero code on rejection
        match res["code"].as_i64() {
            Some(0) | None => info!(event = %event.event, event_id = %event.event_id, "Conversion sent"),
            Some(code) => warn!(code, message = ?res["message"], "Conversion rejected"),
        }
        Ok(res)
    }
}
