use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::error::AppError;
use crate::metrics::REQUEST_TOTAL;
use crate::models::ShopifyOrder;
use crate::state::AppState;
use crate::tiktok::ConversionEvent;

// Storefront "order paid" webhook -> Purchase conversion
pub async fn order_paid_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ShopifyOrder>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    REQUEST_TOTAL.with_label_values(&["shopify-order-paid"]).inc();

    let Json(order) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    if !order.is_paid() {
        debug!(order_id = ?order.id, status = ?order.financial_status, "Skipping unpaid order");
        return Ok(Json(json!({ "skipped": true })));
    }

    let event = ConversionEvent::purchase(&order, &state.config.currency, state.now_secs());
    state
        .conversions
        .track(&event)
        .await
        .map_err(AppError::upstream("Failed to send purchase event"))?;

    Ok(Json(json!({ "success": true })))
}
