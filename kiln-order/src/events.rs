//! Webhook payload schemas, decoded at the edge and normalized into
//! [`FulfillmentEvent`] / [`PaymentEvent`].
//!
//! Unknown event types decode to an `Other` variant so they can be
//! acknowledged without being treated as malformed.

use kiln_catalog::FulfillmentProvider;
use kiln_core::CheckoutSessionObject;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{DeliveryEstimate, OrderStatus, TrackingInfo};
use crate::status::{map_gelato_status, map_printful_status};

/// Why a body could not be turned into an event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed webhook body: {0}")]
    Json(#[source] serde_json::Error),

    #[error("Unexpected shape for {}: {source}", .event_type.as_deref().unwrap_or("untyped event"))]
    Schema {
        /// The discriminant, when the body carried one.
        event_type: Option<String>,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    pub fn event_type(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Schema { event_type, .. } => event_type.as_deref(),
        }
    }
}

/// Parse once, read the discriminant, then decode the typed event.
fn decode<T: serde::de::DeserializeOwned>(raw: &[u8], tag: &str) -> Result<(Option<String>, T), DecodeError> {
    let value: Value = serde_json::from_slice(raw).map_err(DecodeError::Json)?;
    let event_type = value.get(tag).and_then(Value::as_str).map(str::to_string);
    let event = serde_json::from_value(value).map_err(|source| DecodeError::Schema {
        event_type: event_type.clone(),
        source,
    })?;
    Ok((event_type, event))
}

// ============================================================================
// Payment processor
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: CheckoutSessionObject,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StripeEvent {
    #[serde(rename = "checkout.session.completed")]
    CheckoutSessionCompleted { data: StripeEventData },
    #[serde(rename = "checkout.session.expired")]
    CheckoutSessionExpired { data: StripeEventData },
    #[serde(rename = "checkout.session.async_payment_failed")]
    CheckoutSessionAsyncPaymentFailed { data: StripeEventData },
    #[serde(other)]
    Other,
}

#[derive(Debug)]
pub enum PaymentEvent {
    /// Payment captured; the order should become paid.
    Completed(CheckoutSessionObject),
    /// Customer never finished checkout.
    Expired(CheckoutSessionObject),
    PaymentFailed(CheckoutSessionObject),
    Ignored,
}

pub fn parse_stripe(raw: &[u8]) -> Result<(Option<String>, PaymentEvent), DecodeError> {
    let (event_type, event) = decode::<StripeEvent>(raw, "type")?;
    let event = match event {
        StripeEvent::CheckoutSessionCompleted { data } => PaymentEvent::Completed(data.object),
        StripeEvent::CheckoutSessionExpired { data } => PaymentEvent::Expired(data.object),
        StripeEvent::CheckoutSessionAsyncPaymentFailed { data } => PaymentEvent::PaymentFailed(data.object),
        StripeEvent::Other => PaymentEvent::Ignored,
    };
    Ok((event_type, event))
}

// ============================================================================
// Normalized fulfillment events
// ============================================================================

/// How a fulfillment webhook points at one of our orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderLookup {
    Id(Uuid),
    Reference(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FulfillmentUpdate {
    /// `status` is `None` when the provider status is not in our table.
    Status {
        provider_status: String,
        status: Option<OrderStatus>,
        tracking: Vec<TrackingInfo>,
    },
    Shipped {
        tracking: Vec<TrackingInfo>,
    },
    DeliveryEstimate(DeliveryEstimate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentEvent {
    pub provider: FulfillmentProvider,
    pub event_type: String,
    pub lookup: Option<OrderLookup>,
    pub update: FulfillmentUpdate,
}

impl FulfillmentEvent {
    /// Label stored in status history.
    pub fn source(&self) -> String {
        format!("{}:{}", self.provider, self.event_type)
    }
}

fn tracking(code: Option<String>, url: Option<String>, method: Option<String>) -> Option<TrackingInfo> {
    let code = code.filter(|c| !c.trim().is_empty())?;
    Some(TrackingInfo {
        tracking_code: code,
        tracking_url: url.filter(|u| !u.trim().is_empty()),
        shipment_method_name: method.filter(|m| !m.trim().is_empty()),
    })
}

// ============================================================================
// Printful
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PrintfulWebhookOrder {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrintfulShipment {
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrintfulShipmentData {
    pub order: PrintfulWebhookOrder,
    #[serde(default)]
    pub shipment: Option<PrintfulShipment>,
}

#[derive(Debug, Deserialize)]
pub struct PrintfulOrderData {
    pub order: PrintfulWebhookOrder,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrintfulEvent {
    PackageShipped { data: PrintfulShipmentData },
    OrderUpdated { data: PrintfulOrderData },
    OrderFailed { data: PrintfulOrderData },
    OrderCanceled { data: PrintfulOrderData },
    #[serde(other)]
    Other,
}

/// `external_id` is the order id in simple (dashless) form. Anything that
/// does not parse is tried as a fulfillment reference.
fn printful_lookup(order: &PrintfulWebhookOrder) -> Option<OrderLookup> {
    let external_id = order.external_id.as_deref()?.trim();
    if external_id.is_empty() {
        return None;
    }
    Some(match Uuid::parse_str(external_id) {
        Ok(id) => OrderLookup::Id(id),
        Err(_) => OrderLookup::Reference(external_id.to_string()),
    })
}

/// `implied` wins over `data.order.status` for events whose type already
/// says what happened.
fn printful_status(event_type: String, data: PrintfulOrderData, implied: Option<&str>) -> FulfillmentEvent {
    if let Some(reason) = &data.reason {
        tracing::info!(event_type = %event_type, reason = %reason, "Printful order event reason");
    }
    let provider_status = match implied {
        Some(status) => status.to_string(),
        None => data.order.status.clone().unwrap_or_default(),
    };
    FulfillmentEvent {
        provider: FulfillmentProvider::Printful,
        lookup: printful_lookup(&data.order),
        update: FulfillmentUpdate::Status {
            status: map_printful_status(&provider_status),
            provider_status,
            tracking: Vec::new(),
        },
        event_type,
    }
}

/// `Ok((event_type, None))` for event types we do not act on.
pub fn parse_printful(raw: &[u8]) -> Result<(Option<String>, Option<FulfillmentEvent>), DecodeError> {
    let (event_type, event) = decode::<PrintfulEvent>(raw, "type")?;
    let name = event_type.clone().unwrap_or_default();

    let normalized = match event {
        PrintfulEvent::PackageShipped { data } => {
            let tracking = data
                .shipment
                .and_then(|s| {
                    let method = s.service.or(s.carrier);
                    tracking(s.tracking_number, s.tracking_url, method)
                })
                .into_iter()
                .collect();
            Some(FulfillmentEvent {
                provider: FulfillmentProvider::Printful,
                event_type: name,
                lookup: printful_lookup(&data.order),
                update: FulfillmentUpdate::Shipped { tracking },
            })
        }
        PrintfulEvent::OrderUpdated { data } => Some(printful_status(name, data, None)),
        PrintfulEvent::OrderFailed { data } => Some(printful_status(name, data, Some("failed"))),
        PrintfulEvent::OrderCanceled { data } => Some(printful_status(name, data, Some("canceled"))),
        PrintfulEvent::Other => None,
    };
    Ok((event_type, normalized))
}

// ============================================================================
// Gelato
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GelatoShipmentFulfillment {
    #[serde(default)]
    pub tracking_code: Option<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub shipment_method_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GelatoEventItem {
    #[serde(default)]
    pub fulfillments: Vec<GelatoShipmentFulfillment>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GelatoEvent {
    #[serde(rename_all = "camelCase")]
    OrderStatusUpdated {
        order_reference_id: String,
        fulfillment_status: String,
        #[serde(default)]
        items: Vec<GelatoEventItem>,
    },
    #[serde(rename_all = "camelCase")]
    OrderItemTrackingCodeUpdated {
        order_reference_id: String,
        #[serde(default)]
        tracking_code: Option<String>,
        #[serde(default)]
        tracking_url: Option<String>,
        #[serde(default)]
        shipment_method_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    OrderDeliveryEstimateUpdated {
        order_reference_id: String,
        #[serde(default)]
        min_delivery_date: Option<String>,
        #[serde(default)]
        max_delivery_date: Option<String>,
    },
    #[serde(other)]
    Other,
}

fn gelato_lookup(reference: String) -> Option<OrderLookup> {
    let reference = reference.trim();
    (!reference.is_empty()).then(|| OrderLookup::Reference(reference.to_string()))
}

pub fn parse_gelato(raw: &[u8]) -> Result<(Option<String>, Option<FulfillmentEvent>), DecodeError> {
    let (event_type, event) = decode::<GelatoEvent>(raw, "event")?;
    let name = event_type.clone().unwrap_or_default();

    let normalized = match event {
        GelatoEvent::OrderStatusUpdated {
            order_reference_id,
            fulfillment_status,
            items,
        } => {
            let tracking = items
                .into_iter()
                .flat_map(|item| item.fulfillments)
                .filter_map(|f| tracking(f.tracking_code, f.tracking_url, f.shipment_method_name))
                .collect();
            Some(FulfillmentEvent {
                provider: FulfillmentProvider::Gelato,
                event_type: name,
                lookup: gelato_lookup(order_reference_id),
                update: FulfillmentUpdate::Status {
                    status: map_gelato_status(&fulfillment_status),
                    provider_status: fulfillment_status,
                    tracking,
                },
            })
        }
        GelatoEvent::OrderItemTrackingCodeUpdated {
            order_reference_id,
            tracking_code,
            tracking_url,
            shipment_method_name,
        } => Some(FulfillmentEvent {
            provider: FulfillmentProvider::Gelato,
            event_type: name,
            lookup: gelato_lookup(order_reference_id),
            update: FulfillmentUpdate::Shipped {
                tracking: tracking(tracking_code, tracking_url, shipment_method_name)
                    .into_iter()
                    .collect(),
            },
        }),
        GelatoEvent::OrderDeliveryEstimateUpdated {
            order_reference_id,
            min_delivery_date,
            max_delivery_date,
        } => Some(FulfillmentEvent {
            provider: FulfillmentProvider::Gelato,
            event_type: name,
            lookup: gelato_lookup(order_reference_id),
            update: FulfillmentUpdate::DeliveryEstimate(DeliveryEstimate {
                min_delivery_date,
                max_delivery_date,
            }),
        }),
        GelatoEvent::Other => None,
    };
    Ok((event_type, normalized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bytes(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_gelato_status_with_tracking() {
        let raw = bytes(json!({
            "event": "order_status_updated",
            "orderReferenceId": "kiln_abc",
            "fulfillmentStatus": "shipped",
            "items": [{
                "fulfillments": [
                    { "trackingCode": "TRK1", "trackingUrl": "https://t/1", "shipmentMethodName": "DHL" },
                    { "trackingCode": "" }
                ]
            }]
        }));

        let (event_type, event) = parse_gelato(&raw).unwrap();
        let event = event.unwrap();
        assert_eq!(event_type.as_deref(), Some("order_status_updated"));
        assert_eq!(event.lookup, Some(OrderLookup::Reference("kiln_abc".to_string())));
        match event.update {
            FulfillmentUpdate::Status { status, tracking, .. } => {
                assert_eq!(status, Some(OrderStatus::Shipped));
                assert_eq!(tracking.len(), 1);
                assert_eq!(tracking[0].shipment_method_name.as_deref(), Some("DHL"));
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn test_gelato_unknown_status_is_unmapped() {
        let raw = bytes(json!({
            "event": "order_status_updated",
            "orderReferenceId": "kiln_abc",
            "fulfillmentStatus": "teleported"
        }));
        let (_, event) = parse_gelato(&raw).unwrap();
        assert!(matches!(
            event.unwrap().update,
            FulfillmentUpdate::Status { status: None, .. }
        ));
    }

    #[test]
    fn test_gelato_delivery_estimate() {
        let raw = bytes(json!({
            "event": "order_delivery_estimate_updated",
            "orderReferenceId": "kiln_abc",
            "minDeliveryDate": "2026-01-10",
            "maxDeliveryDate": "2026-01-14"
        }));
        let (_, event) = parse_gelato(&raw).unwrap();
        assert_eq!(
            event.unwrap().update,
            FulfillmentUpdate::DeliveryEstimate(DeliveryEstimate {
                min_delivery_date: Some("2026-01-10".to_string()),
                max_delivery_date: Some("2026-01-14".to_string()),
            })
        );
    }

    #[test]
    fn test_unknown_event_types_are_ignored() {
        let (event_type, event) = parse_gelato(&bytes(json!({ "event": "store_product_created" }))).unwrap();
        assert_eq!(event_type.as_deref(), Some("store_product_created"));
        assert!(event.is_none());

        let (_, event) = parse_printful(&bytes(json!({ "type": "product_synced", "data": {} }))).unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_gelato(b"{not json").unwrap_err();
        assert!(err.event_type().is_none());
    }

    #[test]
    fn test_schema_mismatch_keeps_event_type() {
        let err = parse_gelato(&bytes(json!({ "event": "order_status_updated" }))).unwrap_err();
        assert_eq!(err.event_type(), Some("order_status_updated"));
    }

    #[test]
    fn test_missing_discriminant_has_no_event_type() {
        let err = parse_gelato(&bytes(json!({ "foo": 1 }))).unwrap_err();
        assert!(matches!(err, DecodeError::Schema { event_type: None, .. }));
        assert_eq!(err.event_type(), None);
        assert!(err.to_string().starts_with("Unexpected shape for untyped event"));
    }

    #[test]
    fn test_printful_package_shipped() {
        let id = Uuid::new_v4();
        let raw = bytes(json!({
            "type": "package_shipped",
            "data": {
                "order": { "id": 123, "external_id": id.simple().to_string(), "status": "fulfilled" },
                "shipment": {
                    "carrier": "USPS", "service": "USPS Priority",
                    "tracking_number": "9400", "tracking_url": "https://t/9400"
                }
            }
        }));

        let (_, event) = parse_printful(&raw).unwrap();
        let event = event.unwrap();
        assert_eq!(event.lookup, Some(OrderLookup::Id(id)));
        assert_eq!(event.source(), "printful:package_shipped");
        assert_eq!(
            event.update,
            FulfillmentUpdate::Shipped {
                tracking: vec![TrackingInfo {
                    tracking_code: "9400".to_string(),
                    tracking_url: Some("https://t/9400".to_string()),
                    shipment_method_name: Some("USPS Priority".to_string()),
                }]
            }
        );
    }

    #[test]
    fn test_printful_non_uuid_external_id_is_reference() {
        let raw = bytes(json!({
            "type": "order_updated",
            "data": { "order": { "external_id": "kiln_legacy", "status": "inprocess" } }
        }));
        let (_, event) = parse_printful(&raw).unwrap();
        let event = event.unwrap();
        assert_eq!(event.lookup, Some(OrderLookup::Reference("kiln_legacy".to_string())));
        assert!(matches!(
            event.update,
            FulfillmentUpdate::Status { status: Some(OrderStatus::Paid), .. }
        ));
    }

    #[test]
    fn test_printful_failed_without_status_uses_event() {
        let raw = bytes(json!({
            "type": "order_failed",
            "data": { "order": { "external_id": Uuid::new_v4().simple().to_string() }, "reason": "bad file" }
        }));
        let (_, event) = parse_printful(&raw).unwrap();
        assert!(matches!(
            event.unwrap().update,
            FulfillmentUpdate::Status { status: Some(OrderStatus::Failed), .. }
        ));
    }

    #[test]
    fn test_stripe_completed() {
        let raw = bytes(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1", "metadata": { "orderId": "o-1" } } }
        }));
        let (event_type, event) = parse_stripe(&raw).unwrap();
        assert_eq!(event_type.as_deref(), Some("checkout.session.completed"));
        match event {
            PaymentEvent::Completed(session) => assert_eq!(session.order_id(), Some("o-1")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_stripe_other_events_are_ignored() {
        let raw = bytes(json!({ "id": "evt_2", "type": "invoice.paid", "data": { "object": {} } }));
        let (_, event) = parse_stripe(&raw).unwrap();
        assert!(matches!(event, PaymentEvent::Ignored));
    }
}
