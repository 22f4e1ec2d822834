use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Order;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    /// The stored version moved since the order was read.
    #[error("Version conflict on order {id}: expected version {expected}")]
    Conflict { id: Uuid, expected: i64 },

    #[error("Duplicate order: {0}")]
    Duplicate(Uuid),

    #[error("Order storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Pagination {
    /// Missing limit means the default page; anything above the cap is
    /// clamped, and zero becomes one.
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Durable order storage.
///
/// Writes are compare-and-set on `version`: `update_order` only succeeds when
/// the stored row is still at `expected_version`, and callers bump
/// `order.version` before writing.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, order: &Order) -> Result<(), RepositoryError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepositoryError>;

    async fn find_by_fulfillment_reference(&self, reference: &str) -> Result<Option<Order>, RepositoryError>;

    async fn find_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError>;

    /// Newest first.
    async fn list_orders(&self, user_id: &str, page: Pagination) -> Result<Vec<Order>, RepositoryError>;

    async fn update_order(&self, order: &Order, expected_version: i64) -> Result<(), RepositoryError>;
}

/// Order storage for development and tests.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(RepositoryError::Duplicate(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_fulfillment_reference(&self, reference: &str) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.fulfillment_reference_id == reference)
            .cloned())
    }

    async fn find_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.checkout_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn list_orders(&self, user_id: &str, page: Pagination) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut matching: Vec<&Order> = orders.values().filter(|o| o.user_id == user_id).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        Ok(matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn update_order(&self, order: &Order, expected_version: i64) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&order.id).ok_or(RepositoryError::NotFound(order.id))?;
        if stored.version != expected_version {
            return Err(RepositoryError::Conflict {
                id: order.id,
                expected: expected_version,
            });
        }
        *stored = order.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_order;
    use chrono::Duration;

    #[test]
    fn test_pagination_bounds() {
        assert_eq!(Pagination::new(None, None), Pagination { limit: 20, offset: 0 });
        assert_eq!(Pagination::new(Some(500), Some(40)).limit, 100);
        assert_eq!(Pagination::new(Some(0), None).limit, 1);
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let repo = InMemoryOrderRepository::new();
        let mut order = sample_order();
        repo.create_order(&order).await.unwrap();

        order.version = 1;
        repo.update_order(&order, 0).await.unwrap();

        let err = repo.update_order(&order, 0).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { expected: 0, .. }));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let repo = InMemoryOrderRepository::new();
        let order = sample_order();
        repo.create_order(&order).await.unwrap();
        assert!(matches!(
            repo.create_order(&order).await,
            Err(RepositoryError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paged() {
        let repo = InMemoryOrderRepository::new();
        let base = chrono::Utc::now();
        for i in 0..5 {
            let mut order = sample_order();
            order.created_at = base + Duration::seconds(i);
            order.total_amount = i;
            repo.create_order(&order).await.unwrap();
        }
        let mut other = sample_order();
        other.user_id = "someone-else".to_string();
        repo.create_order(&other).await.unwrap();

        let page = repo
            .list_orders("user-1", Pagination::new(Some(2), Some(1)))
            .await
            .unwrap();
        let amounts: Vec<i64> = page.iter().map(|o| o.total_amount).collect();
        assert_eq!(amounts, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_lookup_by_reference_and_session() {
        let repo = InMemoryOrderRepository::new();
        let mut order = sample_order();
        order.checkout_session_id = Some("cs_1".to_string());
        repo.create_order(&order).await.unwrap();

        let by_ref = repo
            .find_by_fulfillment_reference(&order.fulfillment_reference_id)
            .await
            .unwrap();
        assert_eq!(by_ref.map(|o| o.id), Some(order.id));
        assert!(repo.find_by_checkout_session("cs_1").await.unwrap().is_some());
        assert!(repo.find_by_fulfillment_reference("kiln_missing").await.unwrap().is_none());
    }
}
