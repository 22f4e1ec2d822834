use axum::{
    extract::{Path, Query, State},
    Json,
};
use kiln_order::{Order, Pagination};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub user_id: String,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Order not found: {order_id}")))?;
    Ok(Json(order))
}

/// GET /v1/orders?userId=&limit=&offset=
/// Newest first
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    if query.user_id.trim().is_empty() {
        return Err(AppError::ValidationError("userId is required".to_string()));
    }
    let page = Pagination::new(query.limit, query.offset);
    let orders = state.orders.list_orders(&query.user_id, page).await?;
    Ok(Json(orders))
}
