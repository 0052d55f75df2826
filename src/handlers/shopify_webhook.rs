use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AppError;
use crate::metrics::{REQUEST_TOTAL, WEBHOOKS_REJECTED};
use crate::models::ShopifyOrder;
use crate::signature::{SHOPIFY_HMAC_HEADER, verify_shopify_hmac};
use crate::state::AppState;
use crate::steadfast::Consignment;

// Order-created webhook -> courier consignment. Needs the raw body for
// the signature, so no Json extractor here.
pub async fn shopify_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    REQUEST_TOTAL.with_label_values(&["shopify-webhook"]).inc();

    let secret = state
        .config
        .shopify_webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(AppError::Misconfigured("SHOPIFY_WEBHOOK_SECRET"))?;

    let signature = headers
        .get(SHOPIFY_HMAC_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !verify_shopify_hmac(secret, &body, signature) {
        WEBHOOKS_REJECTED.inc();
        warn!("Webhook signature mismatch");
        return Err(AppError::Unauthorized("Unauthorized - HMAC Mismatch"));
    }

    let order: ShopifyOrder = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid order payload: {e}")))?;

    info!(order_id = ?order.id, "Webhook order received");

    let consignment = Consignment::from_order(
        &order,
        &state.config.delivery_area,
        &state.config.pickup_address,
    );
    let response = state
        .courier
        .create_consignment(&consignment)
        .await
        .map_err(AppError::upstream("Webhook Processing Failed"))?;

    info!(invoice = %consignment.invoice,"Consignment sent to courier");

    Ok(Json(json!({ "success": true, "sent_to_steadfast": response })))
}
