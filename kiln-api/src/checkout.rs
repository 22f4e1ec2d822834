use axum::{extract::State, http::StatusCode, Json};
use kiln_order::{CheckoutResponse, CreateCheckoutRequest};

use crate::error::AppError;
use crate::state::AppState;

/// POST /v1/checkout
/// Open a pending order and a hosted checkout session for it
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let checkout = state
        .checkout
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("no payment processor configured".to_string()))?;

    let response = checkout.create_checkout(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
