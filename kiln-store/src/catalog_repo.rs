use async_trait::async_trait;
use kiln_catalog::{CatalogError, FulfillmentConfig, FulfillmentProvider, Product, ProductRepository};
use sqlx::PgPool;
use uuid::Uuid;

/// Reads the catalog's `products` table. Writes belong to the catalog service.
pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    image: Option<String>,
    price: f64,
    currency: String,
    fulfillment_provider: Option<String>,
    fulfillment_config: Option<serde_json::Value>,
}

impl ProductRow {
    fn into_product(self) -> Result<Product, CatalogError> {
        let fulfillment_config = match self.fulfillment_config {
            Some(value) if !value.is_null() => {
                serde_json::from_value::<FulfillmentConfig>(value).map_err(|e| CatalogError::Malformed {
                    id: self.id,
                    reason: e.to_string(),
                })?
            }
            _ => FulfillmentConfig::default(),
        };

        Ok(Product {
            id: self.id,
            name: self.name,
            description: self.description,
            image: self.image,
            price: self.price,
            currency: self.currency,
            fulfillment_provider: FulfillmentProvider::parse(self.fulfillment_provider.as_deref()),
            fulfillment_config,
        })
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, CatalogError> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, image, price::float8 AS price, currency,
                   fulfillment_provider, fulfillment_config
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::Storage(e.to_string()))?;

        row.map(ProductRow::into_product).transpose()
    }
}
