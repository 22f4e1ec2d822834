use std::sync::Arc;

use kiln_catalog::{line_total, to_minor_units, CatalogError, PricingError, ProductRepository};
use kiln_core::{CheckoutProvider, CheckoutSessionRequest, FulfillmentError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::manager::OrderManager;
use crate::models::{NewOrder, Order, OrderError, OrderStatus};

pub const GUEST_USER_ID: &str = "guest";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub product_id: Uuid,
    pub quantity: u32,
    pub success_url: String,
    pub cancel_url: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_session_id: String,
    pub checkout_url: String,
    pub order_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Invalid checkout request: {0}")]
    InvalidRequest(String),

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The processor refused or could not be reached. The order is already
    /// marked failed.
    #[error(transparent)]
    Provider(#[from] FulfillmentError),

    #[error(transparent)]
    Order(#[from] OrderError),
}

/// Starts purchases: prices the product, opens a pending order and hands the
/// customer off to the processor's hosted checkout.
pub struct CheckoutOrchestrator {
    orders: Arc<OrderManager>,
    products: Arc<dyn ProductRepository>,
    checkout: Arc<dyn CheckoutProvider>,
    default_currency: String,
}

impl CheckoutOrchestrator {
    pub fn new(
        orders: Arc<OrderManager>,
        products: Arc<dyn ProductRepository>,
        checkout: Arc<dyn CheckoutProvider>,
    ) -> Self {
        Self {
            orders,
            products,
            checkout,
            default_currency: "USD".to_string(),
        }
    }

    /// Currency for catalog products that carry none.
    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into().to_ascii_uppercase();
        self
    }

    pub async fn create_checkout(&self, request: CreateCheckoutRequest) -> Result<CheckoutResponse, CheckoutError> {
        if request.quantity < 1 {
            return Err(CheckoutError::InvalidRequest("quantity must be at least 1".to_string()));
        }
        if request.success_url.trim().is_empty() || request.cancel_url.trim().is_empty() {
            return Err(CheckoutError::InvalidRequest(
                "successUrl and cancelUrl are required".to_string(),
            ));
        }

        let product = self
            .products
            .get_product(request.product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(request.product_id))?;

        let currency = if product.currency.trim().is_empty() {
            self.default_currency.clone()
        } else {
            product.currency.trim().to_ascii_uppercase()
        };
        let unit_amount = to_minor_units(product.price, &currency)?;
        let total_amount = line_total(unit_amount, request.quantity)?;
        let user_id = request
            .user_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| GUEST_USER_ID.to_string());

        let order = self
            .orders
            .create_order(Order::new(NewOrder {
                user_id,
                product_id: product.id,
                product_name: product.name.clone(),
                quantity: request.quantity,
                currency: currency.clone(),
                total_amount,
            }))
            .await?;

        let session_request = CheckoutSessionRequest {
            order_id: order.id,
            product_name: product.name.clone(),
            product_description: product.description.clone(),
            product_image: product.image.clone(),
            unit_amount,
            currency: currency.to_ascii_lowercase(),
            quantity: request.quantity,
            success_url: request.success_url,
            cancel_url: request.cancel_url,
        };

        let session = match self.checkout.create_checkout_session(&session_request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(order_id = %order.id, provider = self.checkout.name(), error = %e, "Checkout session creation failed");
                self.mark_failed(order.id).await;
                return Err(e.into());
            }
        };

        let provider = self.checkout.name();
        self.orders
            .mutate(order.id, |o| o.record_checkout(&session.session_id, provider))
            .await?;

        tracing::info!(
            order_id = %order.id,
            session_id = %session.session_id,
            total = total_amount,
            "Checkout session created"
        );

        Ok(CheckoutResponse {
            checkout_session_id: session.session_id,
            checkout_url: session.url,
            order_id: order.id,
        })
    }

    async fn mark_failed(&self, order_id: Uuid) {
        let result = self
            .orders
            .mutate(order_id, |o| Ok(o.advance_status(OrderStatus::Failed, "checkout:session_failed")))
            .await;
        if let Err(e) = result {
            tracing::error!(order_id = %order_id, error = %e, "Could not mark order failed");
        }
    }
}
