use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kiln_order::{
    DeliveryEstimate, Order, OrderRepository, OrderStatus, Pagination, RepositoryError, StatusChange, TrackingInfo,
};
use kiln_shared::ShippingAddress;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, user_id, product_id, product_name, quantity, currency, total_amount, status, \
     checkout_session_id, checkout_provider, fulfillment_reference_id, fulfillment_provider, fulfillment_order_id, \
     shipping_address, tracking_info, delivery_estimate, status_history, version, created_at, updated_at";

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {clause} = $1 ORDER BY created_at DESC LIMIT 1");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(OrderRow::into_order).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    currency: String,
    total_amount: i64,
    status: String,
    checkout_session_id: Option<String>,
    checkout_provider: Option<String>,
    fulfillment_reference_id: String,
    fulfillment_provider: Option<String>,
    fulfillment_order_id: Option<String>,
    shipping_address: Option<Json<ShippingAddress>>,
    tracking_info: Json<Vec<TrackingInfo>>,
    delivery_estimate: Option<Json<DeliveryEstimate>>,
    status_history: Json<Vec<StatusChange>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order, RepositoryError> {
        let status = OrderStatus::parse(&self.status).ok_or_else(|| {
            RepositoryError::Storage(format!("order {} has unknown status '{}'", self.id, self.status))
        })?;
        let quantity = u32::try_from(self.quantity)
            .map_err(|_| RepositoryError::Storage(format!("order {} has negative quantity", self.id)))?;

        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            product_id: self.product_id,
            product_name: self.product_name,
            quantity,
            currency: self.currency,
            total_amount: self.total_amount,
            status,
            checkout_session_id: self.checkout_session_id,
            checkout_provider: self.checkout_provider,
            fulfillment_reference_id: self.fulfillment_reference_id,
            fulfillment_provider: self.fulfillment_provider,
            fulfillment_order_id: self.fulfillment_order_id,
            shipping_address: self.shipping_address.map(|a| a.0),
            tracking_info: self.tracking_info.0,
            delivery_estimate: self.delivery_estimate.map(|d| d.0),
            status_history: self.status_history.0,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn storage(e: sqlx::Error) -> RepositoryError {
    tracing::error!(error = %e, "Order query failed");
    RepositoryError::Storage(e.to_string())
}

fn quantity_column(order: &Order) -> Result<i32, RepositoryError> {
    i32::try_from(order.quantity)
        .map_err(|_| RepositoryError::Storage(format!("order {} quantity out of range", order.id)))
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, product_id, product_name, quantity, currency, total_amount, status,
                checkout_session_id, checkout_provider, fulfillment_reference_id, fulfillment_provider,
                fulfillment_order_id, shipping_address, tracking_info, delivery_estimate, status_history,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(order.id)
        .bind(&order.user_id)
        .bind(order.product_id)
        .bind(&order.product_name)
        .bind(quantity_column(order)?)
        .bind(&order.currency)
        .bind(order.total_amount)
        .bind(order.status.as_str())
        .bind(&order.checkout_session_id)
        .bind(&order.checkout_provider)
        .bind(&order.fulfillment_reference_id)
        .bind(&order.fulfillment_provider)
        .bind(&order.fulfillment_order_id)
        .bind(order.shipping_address.as_ref().map(Json))
        .bind(Json(&order.tracking_info))
        .bind(order.delivery_estimate.as_ref().map(Json))
        .bind(Json(&order.status_history))
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(RepositoryError::Duplicate(order.id)),
            Err(e) => Err(storage(e)),
        }
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn find_by_fulfillment_reference(&self, reference: &str) -> Result<Option<Order>, RepositoryError> {
        self.fetch_one_where("fulfillment_reference_id", reference).await
    }

    async fn find_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError> {
        self.fetch_one_where("checkout_session_id", session_id).await
    }

    async fn list_orders(&self, user_id: &str, page: Pagination) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn update_order(&self, order: &Order, expected_version: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = $3,
                checkout_session_id = $4,
                checkout_provider = $5,
                fulfillment_provider = $6,
                fulfillment_order_id = $7,
                shipping_address = $8,
                tracking_info = $9,
                delivery_estimate = $10,
                status_history = $11,
                version = $12,
                updated_at = $13
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id)
        .bind(expected_version)
        .bind(order.status.as_str())
        .bind(&order.checkout_session_id)
        .bind(&order.checkout_provider)
        .bind(&order.fulfillment_provider)
        .bind(&order.fulfillment_order_id)
        .bind(order.shipping_address.as_ref().map(Json))
        .bind(Json(&order.tracking_info))
        .bind(order.delivery_estimate.as_ref().map(Json))
        .bind(Json(&order.status_history))
        .bind(order.version)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Zero rows: either the order is gone or someone else wrote first.
        let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM orders WHERE id = $1")
            .bind(order.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        match exists {
            None => Err(RepositoryError::NotFound(order.id)),
            Some(_) => Err(RepositoryError::Conflict {
                id: order.id,
                expected: expected_version,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str, quantity: i32) -> OrderRow {
        let now = Utc::now();
        OrderRow {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            product_id: Uuid::new_v4(),
            product_name: "Poster".to_string(),
            quantity,
            currency: "USD".to_string(),
            total_amount: 5000,
            status: status.to_string(),
            checkout_session_id: Some("cs_1".to_string()),
            checkout_provider: Some("stripe".to_string()),
            fulfillment_reference_id: "kiln_abc".to_string(),
            fulfillment_provider: None,
            fulfillment_order_id: None,
            shipping_address: None,
            tracking_info: Json(vec![TrackingInfo {
                tracking_code: "1Z999".to_string(),
                tracking_url: None,
                shipment_method_name: Some("UPS".to_string()),
            }]),
            delivery_estimate: None,
            status_history: Json(Vec::new()),
            version: 3,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_into_order() {
        let order = row("shipped", 2).into_order().unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.quantity, 2);
        assert_eq!(order.version, 3);
        assert_eq!(order.tracking_info[0].tracking_code, "1Z999");
    }

    #[test]
    fn test_unknown_status_is_storage_error() {
        let err = row("refunded", 1).into_order().unwrap_err();
        assert!(matches!(err, RepositoryError::Storage(msg) if msg.contains("refunded")));
    }

    #[test]
    fn test_negative_quantity_is_storage_error() {
        assert!(matches!(row("paid", -1).into_order(), Err(RepositoryError::Storage(_))));
    }
}
