use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kiln_core::FulfillmentError;
use kiln_order::{CheckoutError, DispatchError, OrderError, PaymentWebhookError, PlacementError, RepositoryError};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    Unprocessable(String),
    ServiceUnavailable(String),
    /// A normalized provider failure; the body carries the code, never the
    /// provider's own response.
    ProviderError(FulfillmentError),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable".to_string())
            }
            AppError::ProviderError(err) => {
                tracing::warn!(provider = %err.provider, code = %err.code, error = %err.message, "Provider call failed");
                let status = StatusCode::from_u16(err.code.http_status_hint())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, format!("{} request failed: {}", err.provider, err.code))
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(_) => AppError::NotFoundError(err.to_string()),
            OrderError::NotPaid { .. }
            | OrderError::FulfillmentAlreadyRecorded { .. }
            | OrderError::CheckoutAlreadyRecorded { .. }
            | OrderError::Contended(_) => AppError::ConflictError(err.to_string()),
            OrderError::Repository(RepositoryError::NotFound(id)) => {
                AppError::NotFoundError(format!("Order not found: {id}"))
            }
            OrderError::Repository(RepositoryError::Storage(msg)) => AppError::ServiceUnavailable(msg),
            OrderError::Repository(other) => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::InvalidRequest(_) | CheckoutError::Pricing(_) => AppError::ValidationError(err.to_string()),
            CheckoutError::ProductNotFound(_) => AppError::NotFoundError(err.to_string()),
            CheckoutError::Catalog(e) => AppError::InternalServerError(e.to_string()),
            CheckoutError::Provider(e) => AppError::ProviderError(e),
            CheckoutError::Order(e) => e.into(),
        }
    }
}

impl From<PlacementError> for AppError {
    fn from(err: PlacementError) -> Self {
        match err {
            PlacementError::OrderNotFound(_) | PlacementError::ProductNotFound(_) => {
                AppError::NotFoundError(err.to_string())
            }
            PlacementError::NotEligible { .. } | PlacementError::InProgress(_) => {
                AppError::ConflictError(err.to_string())
            }
            PlacementError::Interrupted { .. } => AppError::InternalServerError(err.to_string()),
            PlacementError::Catalog(e) => AppError::InternalServerError(e.to_string()),
            PlacementError::Dispatch(DispatchError::Configuration { .. }) => AppError::Unprocessable(err.to_string()),
            PlacementError::Dispatch(DispatchError::Provider(e)) => AppError::ProviderError(e),
            PlacementError::Order(e) => e.into(),
        }
    }
}

impl From<PaymentWebhookError> for AppError {
    fn from(err: PaymentWebhookError) -> Self {
        match err {
            PaymentWebhookError::InvalidSignature => AppError::ValidationError(err.to_string()),
            PaymentWebhookError::Storage(msg) => AppError::ServiceUnavailable(msg),
        }
    }
}
