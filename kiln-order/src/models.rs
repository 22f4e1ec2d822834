use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use kiln_shared::ShippingAddress;

/// Order status in the lifecycle.
///
/// Forward path: `Pending → Paid → Shipped → Delivered`. `Canceled` and
/// `Failed` branch off `Pending`/`Paid` only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Canceled,
    Failed,
}

impl OrderStatus {
    /// Position on the forward path; `None` for the side states.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Paid => Some(1),
            Self::Shipped => Some(2),
            Self::Delivered => Some(3),
            Self::Canceled | Self::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled | Self::Failed)
    }

    /// True when the forward path has reached at least `paid`.
    pub fn is_paid_or_later(&self) -> bool {
        matches!(self.rank(), Some(r) if r >= 1)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            (Some(from), None) => from <= 1,
            (None, _) => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "canceled" => Some(Self::Canceled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of asking an order to move to a new status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: OrderStatus, to: OrderStatus },
    /// Already in the requested status (redelivered event).
    Duplicate,
    /// Would move backwards or out of a terminal state. Nothing changed.
    Rejected { from: OrderStatus, to: OrderStatus },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// One row of the append-only audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    /// What caused it, e.g. `stripe:checkout.session.completed`
    pub source: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingInfo {
    pub tracking_code: String,
    pub tracking_url: Option<String>,
    pub shipment_method_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEstimate {
    pub min_delivery_date: Option<String>,
    pub max_delivery_date: Option<String>,
}

/// Fields known when checkout starts.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: String,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub currency: String,
    pub total_amount: i64,
}

/// One customer purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub currency: String,
    /// Minor units
    pub total_amount: i64,
    pub status: OrderStatus,
    pub checkout_session_id: Option<String>,
    pub checkout_provider: Option<String>,
    pub fulfillment_reference_id: String,
    pub fulfillment_provider: Option<String>,
    pub fulfillment_order_id: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub tracking_info: Vec<TrackingInfo>,
    pub delivery_estimate: Option<DeliveryEstimate>,
    pub status_history: Vec<StatusChange>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(new: NewOrder) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            product_id: new.product_id,
            product_name: new.product_name,
            quantity: new.quantity,
            currency: new.currency,
            total_amount: new.total_amount,
            status: OrderStatus::Pending,
            checkout_session_id: None,
            checkout_provider: None,
            fulfillment_reference_id: new_fulfillment_reference(),
            fulfillment_provider: None,
            fulfillment_order_id: None,
            shipping_address: None,
            tracking_info: Vec::new(),
            delivery_estimate: None,
            status_history: vec![StatusChange {
                from: None,
                to: OrderStatus::Pending,
                source: "checkout".to_string(),
                at: now,
            }],
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move along the state machine. Never regresses: a duplicate is a no-op
    /// and a backwards or post-terminal move is rejected without change.
    pub fn advance_status(&mut self, next: OrderStatus, source: &str) -> Transition {
        let from = self.status;
        if from == next {
            return Transition::Duplicate;
        }
        if !from.can_transition_to(next) {
            return Transition::Rejected { from, to: next };
        }

        let now = Utc::now();
        self.status = next;
        self.status_history.push(StatusChange {
            from: Some(from),
            to: next,
            source: source.to_string(),
            at: now,
        });
        self.updated_at = now;
        Transition::Applied { from, to: next }
    }

    /// Set once at checkout. Re-recording the same session is a no-op.
    pub fn record_checkout(&mut self, session_id: &str, provider: &str) -> Result<(), OrderError> {
        match self.checkout_session_id.as_deref() {
            Some(existing) if existing == session_id => Ok(()),
            Some(existing) => Err(OrderError::CheckoutAlreadyRecorded {
                order_id: self.id,
                existing: existing.to_string(),
            }),
            None => {
                self.checkout_session_id = Some(session_id.to_string());
                self.checkout_provider = Some(provider.to_string());
                self.updated_at = Utc::now();
                Ok(())
            }
        }
    }

    /// The provider-assigned id is written at most once, and only once the
    /// order has been paid.
    pub fn record_fulfillment(&mut self, provider: &str, fulfillment_order_id: &str) -> Result<(), OrderError> {
        if !self.status.is_paid_or_later() {
            return Err(OrderError::NotPaid {
                order_id: self.id,
                status: self.status,
            });
        }

        match self.fulfillment_order_id.as_deref() {
            Some(existing) if existing == fulfillment_order_id => Ok(()),
            Some(existing) => Err(OrderError::FulfillmentAlreadyRecorded {
                order_id: self.id,
                existing: existing.to_string(),
            }),
            None => {
                self.fulfillment_order_id = Some(fulfillment_order_id.to_string());
                self.fulfillment_provider = Some(provider.to_string());
                self.updated_at = Utc::now();
                Ok(())
            }
        }
    }

    pub fn set_shipping_address(&mut self, address: ShippingAddress) {
        if self.shipping_address.as_ref() != Some(&address) {
            self.shipping_address = Some(address);
            self.updated_at = Utc::now();
        }
    }

    /// Upsert by tracking code. Fields present on the incoming entry replace
    /// the stored ones; absent fields keep their previous values.
    pub fn merge_tracking(&mut self, incoming: TrackingInfo) {
        if incoming.tracking_code.trim().is_empty() {
            return;
        }

        match self
            .tracking_info
            .iter_mut()
            .find(|t| t.tracking_code == incoming.tracking_code)
        {
            Some(existing) => {
                let merged = TrackingInfo {
                    tracking_code: incoming.tracking_code,
                    tracking_url: incoming.tracking_url.or_else(|| existing.tracking_url.clone()),
                    shipment_method_name: incoming
                        .shipment_method_name
                        .or_else(|| existing.shipment_method_name.clone()),
                };
                if *existing != merged {
                    *existing = merged;
                    self.updated_at = Utc::now();
                }
            }
            None => {
                self.tracking_info.push(incoming);
                self.updated_at = Utc::now();
            }
        }
    }

    pub fn merge_tracking_all(&mut self, entries: impl IntoIterator<Item = TrackingInfo>) {
        for entry in entries {
            self.merge_tracking(entry);
        }
    }

    /// Replaced wholesale; providers always send both bounds.
    pub fn set_delivery_estimate(&mut self, estimate: DeliveryEstimate) {
        if self.delivery_estimate.as_ref() != Some(&estimate) {
            self.delivery_estimate = Some(estimate);
            self.updated_at = Utc::now();
        }
    }
}

/// Correlation id handed to providers so their webhooks can be matched back.
pub fn new_fulfillment_reference() -> String {
    format!("kiln_{}", Uuid::new_v4().simple())
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order {order_id} is {status}; fulfillment requires a paid order")]
    NotPaid {
        order_id: Uuid,
        status: OrderStatus,
    },

    #[error("Order {order_id} already has fulfillment order {existing}")]
    FulfillmentAlreadyRecorded {
        order_id: Uuid,
        existing: String,
    },

    #[error("Order {order_id} already has checkout session {existing}")]
    CheckoutAlreadyRecorded {
        order_id: Uuid,
        existing: String,
    },

    #[error("Order {0} is being modified concurrently; giving up after retries")]
    Contended(Uuid),

    #[error(transparent)]
    Repository(#[from] crate::repository::RepositoryError),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_order() -> Order {
        Order::new(NewOrder {
            user_id: "user-1".to_string(),
            product_id: Uuid::new_v4(),
            product_name: "Poster".to_string(),
            quantity: 2,
            currency: "USD".to_string(),
            total_amount: 5000,
        })
    }

    fn tracking(code: &str, url: Option<&str>, method: Option<&str>) -> TrackingInfo {
        TrackingInfo {
            tracking_code: code.to_string(),
            tracking_url: url.map(str::to_string),
            shipment_method_name: method.map(str::to_string),
        }
    }

    #[test]
    fn test_order_lifecycle() {
        let mut order = sample_order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.fulfillment_reference_id.starts_with("kiln_"));

        assert!(order.advance_status(OrderStatus::Paid, "test").is_applied());
        assert!(order.advance_status(OrderStatus::Shipped, "test").is_applied());
        assert!(order.advance_status(OrderStatus::Delivered, "test").is_applied());
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.status_history.len(), 4);
    }

    #[test]
    fn test_status_never_regresses() {
        let mut order = sample_order();
        order.advance_status(OrderStatus::Paid, "test");
        order.advance_status(OrderStatus::Shipped, "test");

        let result = order.advance_status(OrderStatus::Paid, "duplicate payment");
        assert_eq!(
            result,
            Transition::Rejected { from: OrderStatus::Shipped, to: OrderStatus::Paid }
        );
        assert_eq!(order.status, OrderStatus::Shipped);
    }

    #[test]
    fn test_duplicate_transition_is_noop() {
        let mut order = sample_order();
        order.advance_status(OrderStatus::Paid, "test");
        let before = order.clone();

        assert_eq!(order.advance_status(OrderStatus::Paid, "test"), Transition::Duplicate);
        assert_eq!(order, before);
    }

    #[test]
    fn test_side_states_only_from_pending_or_paid() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Canceled));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Canceled.can_transition_to(OrderStatus::Paid));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Failed));
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        let all = [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Canceled,
            OrderStatus::Failed,
        ];
        for from in all.into_iter().filter(OrderStatus::is_terminal) {
            assert!(all.iter().all(|to| !from.can_transition_to(*to)), "{from} should be terminal");
        }
        assert!(!OrderStatus::Shipped.is_terminal());
    }

    #[test]
    fn test_forward_skip_is_allowed() {
        let mut order = sample_order();
        order.advance_status(OrderStatus::Paid, "test");
        assert!(order.advance_status(OrderStatus::Delivered, "test").is_applied());
    }

    #[test]
    fn test_fulfillment_requires_paid() {
        let mut order = sample_order();
        let err = order.record_fulfillment("printful", "pf_1").unwrap_err();
        assert!(matches!(err, OrderError::NotPaid { .. }));
        assert!(order.fulfillment_order_id.is_none());
    }

    #[test]
    fn test_fulfillment_recorded_once() {
        let mut order = sample_order();
        order.advance_status(OrderStatus::Paid, "test");

        order.record_fulfillment("printful", "pf_1").unwrap();
        order.record_fulfillment("printful", "pf_1").unwrap();
        let err = order.record_fulfillment("printful", "pf_2").unwrap_err();

        assert!(matches!(err, OrderError::FulfillmentAlreadyRecorded { .. }));
        assert_eq!(order.fulfillment_order_id.as_deref(), Some("pf_1"));
        assert_eq!(order.fulfillment_provider.as_deref(), Some("printful"));
    }

    #[test]
    fn test_checkout_recorded_once() {
        let mut order = sample_order();
        order.record_checkout("cs_1", "stripe").unwrap();
        order.record_checkout("cs_1", "stripe").unwrap();
        assert!(order.record_checkout("cs_2", "stripe").is_err());
        assert_eq!(order.checkout_session_id.as_deref(), Some("cs_1"));
    }

    #[test]
    fn test_tracking_merge_is_unique_by_code() {
        let mut order = sample_order();
        order.merge_tracking(tracking("TRK1", Some("https://t/1"), None));
        order.merge_tracking(tracking("TRK2", None, Some("DHL")));
        order.merge_tracking(tracking("TRK1", None, Some("UPS Ground")));

        assert_eq!(order.tracking_info.len(), 2);
        assert_eq!(
            order.tracking_info[0],
            tracking("TRK1", Some("https://t/1"), Some("UPS Ground"))
        );
    }

    #[test]
    fn test_tracking_merge_ignores_blank_codes() {
        let mut order = sample_order();
        order.merge_tracking(tracking("  ", Some("https://t/1"), None));
        assert!(order.tracking_info.is_empty());
    }

    #[test]
    fn test_tracking_merge_is_idempotent() {
        let mut order = sample_order();
        order.merge_tracking(tracking("TRK1", Some("https://t/1"), Some("UPS")));
        let before = order.clone();
        order.merge_tracking(tracking("TRK1", Some("https://t/1"), Some("UPS")));
        assert_eq!(order, before);
    }

    #[test]
    fn test_delivery_estimate_overwrites() {
        let mut order = sample_order();
        order.set_delivery_estimate(DeliveryEstimate {
            min_delivery_date: Some("2026-01-10".to_string()),
            max_delivery_date: Some("2026-01-14".to_string()),
        });
        order.set_delivery_estimate(DeliveryEstimate {
            min_delivery_date: Some("2026-01-12".to_string()),
            max_delivery_date: None,
        });

        let estimate = order.delivery_estimate.unwrap();
        assert_eq!(estimate.min_delivery_date.as_deref(), Some("2026-01-12"));
        assert!(estimate.max_delivery_date.is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&OrderStatus::Canceled).unwrap(), "\"canceled\"");
        assert_eq!(OrderStatus::parse("shipped"), Some(OrderStatus::Shipped));
        assert_eq!(OrderStatus::parse("SHIPPED"), None);
    }
}
