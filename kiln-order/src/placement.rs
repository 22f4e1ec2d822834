use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use kiln_catalog::{CatalogError, Product, ProductRepository};
use kiln_core::ShippingRate;
use uuid::Uuid;

use crate::fulfillment::{DispatchError, DispatchOutcome, FulfillmentRouter};
use crate::manager::OrderManager;
use crate::models::{Order, OrderError, OrderStatus};

#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Order {order_id} is not eligible for fulfillment: {reason}")]
    NotEligible { order_id: Uuid, reason: String },

    #[error("Fulfillment already in progress for order {0}")]
    InProgress(Uuid),

    #[error("Fulfillment task for order {order_id} did not finish: {reason}")]
    Interrupted { order_id: Uuid, reason: String },

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Order(#[from] OrderError),
}

type InFlight = Arc<Mutex<HashSet<Uuid>>>;

/// Marks an order id as being placed. Dropping it frees the id.
struct InFlightClaim {
    in_flight: InFlight,
    order_id: Uuid,
}

impl InFlightClaim {
    fn acquire(in_flight: &InFlight, order_id: Uuid) -> Option<Self> {
        let inserted = in_flight.lock().unwrap_or_else(PoisonError::into_inner).insert(order_id);
        inserted.then(|| Self { in_flight: in_flight.clone(), order_id })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.order_id);
    }
}

fn ensure_placeable(order: &Order) -> Result<(), PlacementError> {
    if order.status != OrderStatus::Paid {
        return Err(PlacementError::NotEligible {
            order_id: order.id,
            reason: format!("status is {}", order.status),
        });
    }
    if let Some(existing) = &order.fulfillment_order_id {
        return Err(PlacementError::NotEligible {
            order_id: order.id,
            reason: format!("already placed as {existing}"),
        });
    }
    Ok(())
}

/// Places provider orders for paid orders and records the result.
///
/// Shared by the payment webhook and the operator re-drive path. An order id
/// can only be in flight once per process, and eligibility is re-read from
/// storage after the claim, so a stale snapshot never places twice. The
/// provider call runs on its own task and finishes even if the caller goes
/// away.
pub struct FulfillmentCoordinator {
    orders: Arc<OrderManager>,
    products: Arc<dyn ProductRepository>,
    router: Arc<FulfillmentRouter>,
    in_flight: InFlight,
}

impl FulfillmentCoordinator {
    pub fn new(orders: Arc<OrderManager>, products: Arc<dyn ProductRepository>, router: FulfillmentRouter) -> Self {
        Self {
            orders,
            products,
            router: Arc::new(router),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    async fn load_order(&self, order_id: Uuid) -> Result<Order, PlacementError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(PlacementError::OrderNotFound(order_id))
    }

    /// Place the order with its provider and write back the provider's id.
    ///
    /// Only `order.id` is trusted; the stored order decides eligibility.
    pub async fn place(&self, order: &Order) -> Result<DispatchOutcome, PlacementError> {
        let order_id = order.id;
        let claim = InFlightClaim::acquire(&self.in_flight, order_id).ok_or(PlacementError::InProgress(order_id))?;

        let orders = self.orders.clone();
        let products = self.products.clone();
        let router = self.router.clone();
        let task = tokio::spawn(async move {
            let _claim = claim;
            place_claimed(&orders, products.as_ref(), &router, order_id).await
        });

        task.await.map_err(|e| {
            tracing::error!(order_id = %order_id, error = %e, "Fulfillment task aborted");
            PlacementError::Interrupted {
                order_id,
                reason: e.to_string(),
            }
        })?
    }

    /// Operator retry for a paid order that never reached a provider.
    pub async fn redrive(&self, order_id: Uuid) -> Result<DispatchOutcome, PlacementError> {
        let order = self.load_order(order_id).await?;
        ensure_placeable(&order)?;

        tracing::info!(order_id = %order_id, "Re-driving fulfillment");
        self.place(&order).await
    }

    pub async fn quote(&self, order_id: Uuid) -> Result<Vec<ShippingRate>, PlacementError> {
        let order = self.load_order(order_id).await?;
        let product = load_product(self.products.as_ref(), order.product_id).await?;
        Ok(self.router.quote(&order, &product).await?)
    }
}

async fn load_product(products: &dyn ProductRepository, product_id: Uuid) -> Result<Product, PlacementError> {
    products
        .get_product(product_id)
        .await?
        .ok_or(PlacementError::ProductNotFound(product_id))
}

async fn place_claimed(
    orders: &OrderManager,
    products: &dyn ProductRepository,
    router: &FulfillmentRouter,
    order_id: Uuid,
) -> Result<DispatchOutcome, PlacementError> {
    let order = orders
        .get_order(order_id)
        .await?
        .ok_or(PlacementError::OrderNotFound(order_id))?;
    ensure_placeable(&order)?;

    let product = load_product(products, order.product_id).await?;
    let outcome = router.dispatch(&order, &product).await?;

    if let DispatchOutcome::Placed { provider, fulfillment_order_id, .. } = &outcome {
        orders
            .mutate(order_id, |o| o.record_fulfillment(provider.as_str(), fulfillment_order_id))
            .await
            .inspect_err(|e| {
                // The provider order exists; an operator must link it by hand.
                tracing::error!(
                    order_id = %order_id,
                    provider = %provider,
                    fulfillment_order_id = %fulfillment_order_id,
                    error = %e,
                    "Provider order placed but not recorded"
                );
            })?;
    }

    Ok(outcome)
}
