use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::product::Product;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog storage error: {0}")]
    Storage(String),

    #[error("Malformed catalog record {id}: {reason}")]
    Malformed { id: Uuid, reason: String },
}

/// Read access to the catalog collaborator.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, CatalogError>;
}

/// HashMap-backed catalog for development and tests.
#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<Uuid, Product>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: RwLock::new(products.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, CatalogError> {
        Ok(self.products.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{FulfillmentConfig, FulfillmentProvider};

    #[tokio::test]
    async fn test_in_memory_lookup() {
        let product = Product {
            id: Uuid::new_v4(),
            name: "Mug".to_string(),
            description: None,
            image: None,
            price: 12.5,
            currency: "USD".to_string(),
            fulfillment_provider: FulfillmentProvider::Manual,
            fulfillment_config: FulfillmentConfig::default(),
        };
        let repo = InMemoryProductRepository::new();
        repo.insert(product.clone()).await;

        let found = repo.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Mug");
        assert!(repo.get_product(Uuid::new_v4()).await.unwrap().is_none());
    }
}
