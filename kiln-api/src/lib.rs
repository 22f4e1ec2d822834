use axum::{
    http::Method,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod checkout;
pub mod error;
pub mod orders;
pub mod state;
pub mod webhooks;

pub use error::AppError;
pub use state::{AppState, Services};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .route("/health", get(health))
        .route("/v1/checkout", post(checkout::create_checkout))
        .route("/v1/orders", get(orders::list_orders))
        .route("/v1/orders/{id}", get(orders::get_order))
        .route("/v1/webhooks/payments/stripe", post(webhooks::stripe_webhook))
        .route("/v1/webhooks/fulfillment/printful", post(webhooks::printful_webhook))
        .route("/v1/webhooks/fulfillment/gelato", post(webhooks::gelato_webhook))
        .route("/v1/admin/orders/{id}/fulfillment", post(admin::redrive_fulfillment))
        .route("/v1/admin/orders/{id}/quote", get(admin::quote_shipping))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
