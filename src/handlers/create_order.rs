use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use super::client::ClientMeta;
use crate::error::{AppError, UpstreamError};
use crate::guard::{Decision, IdentityKeys};
use crate::metrics::{ORDERS_BLOCKED, ORDERS_CREATED, REQUEST_TOTAL};
use crate::models::CheckoutForm;
use crate::shopify::{Checkout, find_or_create_customer};
use crate::state::AppState;

pub async fn create_order_handler(
    State(state): State<Arc<AppState>>,
    client: ClientMeta,
    payload: Result<Json<CheckoutForm>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    REQUEST_TOTAL.with_label_values(&["create-order"]).inc();

    let Json(form) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    // body fingerprint first, header as fallback
    let fingerprint = form
        .device_id
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| client.device_id.clone());
    let checkout = Checkout::from_form(form)?;

    let keys = IdentityKeys::from_request(
        checkout.phone.key_digits(),
        client.ip(state.config.trust_forwarded_for),
        fingerprint.as_deref(),
        state.config.block_anonymous_devices_together,
    );

    match state.guard.check(&keys).await {
        Decision::Allowed => {}
        Decision::Duplicate { key } => {
            ORDERS_BLOCKED.with_label_values(&[key.kind()]).inc();
            info!(kind = key.kind(), "Duplicate checkout refused");
            return Err(AppError::DuplicateOrder { kind: key.kind() });
        }
        Decision::StoreUnavailable => {
            ORDERS_BLOCKED.with_label_values(&["store_unavailable"]).inc();
            return Err(AppError::GuardUnavailable);
        }
    }

    let country = &state.config.country;
    let customer = find_or_create_customer(state.storefront.as_ref(), &checkout, country).await?;

    let customer_id = match customer.get("id") {
        Some(id) if !id.is_null() => id.clone(),
        _ => {
            warn!("Storefront customer has no id");
            return Err(AppError::Upstream {
                message: "Failed creating customer",
                source: UpstreamError::Malformed("customer without id".to_string()),
            });
        }
    };

    let order = state
        .storefront
        .create_order(&checkout.new_order(customer_id, country))
        .await
        .map_err(AppError::upstream("Failed creating order"))?;

    // only a confirmed order starts the block window
    state.guard.record_all(&keys).await;
    ORDERS_CREATED.inc();
    info!(order_id = %order["id"], "Order created");

    Ok(Json(json!({
        "success": true,
        "customer": customer,
        "order": order,
    })))
}
