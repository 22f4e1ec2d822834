use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use kiln_order::{FulfillmentAck, PaymentAck, PaymentWebhookError};

use crate::error::AppError;
use crate::state::AppState;

pub const STRIPE_SIGNATURE: &str = "stripe-signature";
pub const PRINTFUL_SIGNATURE: &str = "x-pf-webhook-signature";
pub const GELATO_SIGNATURE: &str = "x-gelato-signature";

fn signature<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /v1/webhooks/payments/stripe
/// Signatures are checked against the raw body, so it is taken as bytes.
pub async fn stripe_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    match state
        .webhooks
        .handle_payment(&body, signature(&headers, STRIPE_SIGNATURE))
        .await
    {
        Ok(ack) => Json(ack).into_response(),
        Err(PaymentWebhookError::InvalidSignature) => {
            (StatusCode::BAD_REQUEST, Json(PaymentAck { received: false })).into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

/// POST /v1/webhooks/fulfillment/printful
/// Always 200; `received:false` marks a payload that will never be applied.
pub async fn printful_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<FulfillmentAck> {
    Json(
        state
            .webhooks
            .handle_printful(&body, signature(&headers, PRINTFUL_SIGNATURE))
            .await,
    )
}

/// POST /v1/webhooks/fulfillment/gelato
pub async fn gelato_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<FulfillmentAck> {
    Json(
        state
            .webhooks
            .handle_gelato(&body, signature(&headers, GELATO_SIGNATURE))
            .await,
    )
}
