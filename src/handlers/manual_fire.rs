use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::AppError;
use crate::metrics::REQUEST_TOTAL;
use crate::models::ManualFireRequest;
use crate::state::AppState;
use crate::tiktok::ConversionEvent;

pub async fn manual_fire_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ManualFireRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    REQUEST_TOTAL.with_label_values(&["manual-fire"]).inc();

    let Json(req) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let missing = || AppError::Validation("orderId and totalPrice required".to_string());
    let order_id = req.order_id.filter(|v| !v.is_blank()).ok_or_else(missing)?;
    let total = req.total_price.filter(|v| !v.is_blank()).ok_or_else(missing)?;
    let value = total
        .as_f64()
        .ok_or_else(|| AppError::Validation("totalPrice must be a number".to_string()))?;

    let event = ConversionEvent::manual_payment(
        &order_id.as_text(),
        value,
        req.ttclid,
        &state.config.currency,
        state.now_secs(),
    );

    let response = state
        .conversions
        .track(&event)
        .await
        .map_err(AppError::upstream("Failed to fire TikTok event"))?;

    Ok(Json(json!({ "success": true, "response": response })))
}
