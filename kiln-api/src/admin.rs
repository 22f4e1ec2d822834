use axum::{
    extract::{Path, State},
    Json,
};
use kiln_core::ShippingRate;
use kiln_order::DispatchOutcome;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentResponse {
    pub order_id: Uuid,
    /// `placed` or `manual`
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<String>,
}

impl FulfillmentResponse {
    fn new(order_id: Uuid, outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Placed {
                provider,
                fulfillment_order_id,
                status,
            } => Self {
                order_id,
                outcome: "placed",
                provider: Some(provider.to_string()),
                fulfillment_order_id: Some(fulfillment_order_id),
                provider_status: Some(status),
            },
            DispatchOutcome::Manual => Self {
                order_id,
                outcome: "manual",
                provider: None,
                fulfillment_order_id: None,
                provider_status: None,
            },
        }
    }
}

/// POST /v1/admin/orders/{id}/fulfillment
/// Re-drive fulfillment for a paid order that never reached its provider
pub async fn redrive_fulfillment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<FulfillmentResponse>, AppError> {
    let outcome = state.fulfillment.redrive(order_id).await?;
    Ok(Json(FulfillmentResponse::new(order_id, outcome)))
}

/// GET /v1/admin/orders/{id}/quote
pub async fn quote_shipping(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<ShippingRate>>, AppError> {
    Ok(Json(state.fulfillment.quote(order_id).await?))
}
