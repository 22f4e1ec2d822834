use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{Order, OrderError};
use crate::repository::{OrderRepository, Pagination, RepositoryError};

/// Attempts per mutation before giving up on a contended row.
const MAX_ATTEMPTS: usize = 3;

/// Prune idle lock entries once the table grows past this.
const LOCK_TABLE_SOFT_LIMIT: usize = 1024;

/// Serializes in-process work on a single order.
///
/// Only orders that are touched concurrently pay for this. Cross-process
/// writers are caught by the version check in the repository.
#[derive(Default)]
pub struct OrderLocks {
    table: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl OrderLocks {
    pub async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().await;
            if table.len() > LOCK_TABLE_SOFT_LIMIT {
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            table.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// How an order looked after a mutation, plus whatever the closure returned.
#[derive(Debug)]
pub struct Mutated<T> {
    pub order: Order,
    pub output: T,
    /// False when the closure left the order untouched and nothing was written.
    pub changed: bool,
}

/// Owns every read and write of orders.
pub struct OrderManager {
    repo: Arc<dyn OrderRepository>,
    locks: OrderLocks,
}

impl OrderManager {
    pub fn new(repo: Arc<dyn OrderRepository>) -> Self {
        Self {
            repo,
            locks: OrderLocks::default(),
        }
    }

    pub async fn create_order(&self, order: Order) -> Result<Order, OrderError> {
        self.repo.create_order(&order).await?;
        tracing::info!(order_id = %order.id, user_id = %order.user_id, total = order.total_amount, "Order created");
        Ok(order)
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Option<Order>, OrderError> {
        Ok(self.repo.get_order(id).await?)
    }

    pub async fn find_by_fulfillment_reference(&self, reference: &str) -> Result<Option<Order>, OrderError> {
        Ok(self.repo.find_by_fulfillment_reference(reference).await?)
    }

    pub async fn find_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, OrderError> {
        Ok(self.repo.find_by_checkout_session(session_id).await?)
    }

    pub async fn list_orders(&self, user_id: &str, page: Pagination) -> Result<Vec<Order>, OrderError> {
        Ok(self.repo.list_orders(user_id, page).await?)
    }

    /// Read-modify-write one order.
    ///
    /// Holds the order's lock for the whole cycle. If another process wrote
    /// in between, the order is reloaded and `apply` runs again, so it must
    /// be safe to call more than once. When `apply` leaves the order equal
    /// to what was loaded, nothing is written.
    pub async fn mutate<T, F>(&self, id: Uuid, mut apply: F) -> Result<Mutated<T>, OrderError>
    where
        F: FnMut(&mut Order) -> Result<T, OrderError>,
    {
        let _guard = self.locks.acquire(id).await;

        for attempt in 1..=MAX_ATTEMPTS {
            let loaded = self.repo.get_order(id).await?.ok_or(OrderError::NotFound(id))?;
            let mut order = loaded.clone();
            let output = apply(&mut order)?;

            if order == loaded {
                return Ok(Mutated { order, output, changed: false });
            }

            let expected = loaded.version;
            order.version = expected + 1;
            order.updated_at = Utc::now();

            match self.repo.update_order(&order, expected).await {
                Ok(()) => return Ok(Mutated { order, output, changed: true }),
                Err(RepositoryError::Conflict { .. }) => {
                    tracing::warn!(order_id = %id, attempt, "Concurrent order update, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(OrderError::Contended(id))
    }
}
