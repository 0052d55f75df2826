use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::AppError;
use crate::metrics::REQUEST_TOTAL;
use crate::models::GetOrderQuery;
use crate::state::AppState;

pub async fn get_order_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<GetOrderQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    REQUEST_TOTAL.with_label_values(&["get-order"]).inc();

    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let order_id = query
        .order_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("order_id missing".to_string()))?;

    // goes straight into the upstream path
    if !order_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation("order_id must be numeric".to_string()));
    }

    let order = state
        .storefront
        .get_order(&order_id)
        .await
        .map_err(AppError::upstream("Failed to fetch order"))?;

    Ok(Json(json!({ "success": true, "order": order })))
}
