//! Turns provider webhooks into order mutations.
//!
//! Every delivery is verified against the raw body, decoded, matched to an
//! order and applied under that order's lock. Redeliveries are expected and
//! converge on the same state.

use std::sync::Arc;

use kiln_catalog::FulfillmentProvider;
use kiln_core::{CheckoutProvider, CheckoutSessionObject, SignaturePolicy, SignatureVerifier};
use kiln_shared::ShippingAddress;
use serde::Serialize;
use uuid::Uuid;

use crate::events::{
    parse_gelato, parse_printful, parse_stripe, FulfillmentEvent, FulfillmentUpdate, OrderLookup, PaymentEvent,
};
use crate::manager::OrderManager;
use crate::models::{Order, OrderError, OrderStatus, Transition};
use crate::placement::FulfillmentCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentAck {
    pub received: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

impl FulfillmentAck {
    fn new(received: bool, event_type: Option<String>) -> Self {
        Self { received, event_type }
    }
}

/// Payment webhook outcomes that must not be acknowledged as handled.
#[derive(Debug, thiserror::Error)]
pub enum PaymentWebhookError {
    #[error("Invalid payment webhook signature")]
    InvalidSignature,

    /// The order could not be read or written. Answering non-2xx makes the
    /// processor redeliver.
    #[error("Order storage unavailable: {0}")]
    Storage(String),
}

/// One verifier per webhook source.
#[derive(Debug, Clone)]
pub struct WebhookVerifiers {
    pub payments: SignatureVerifier,
    pub printful: SignatureVerifier,
    pub gelato: SignatureVerifier,
}

pub struct WebhookDispatcher {
    orders: Arc<OrderManager>,
    fulfillment: Arc<FulfillmentCoordinator>,
    checkout: Option<Arc<dyn CheckoutProvider>>,
    verifiers: WebhookVerifiers,
    fulfillment_policy: SignaturePolicy,
}

impl WebhookDispatcher {
    pub fn new(
        orders: Arc<OrderManager>,
        fulfillment: Arc<FulfillmentCoordinator>,
        checkout: Option<Arc<dyn CheckoutProvider>>,
        verifiers: WebhookVerifiers,
        strict_fulfillment_signatures: bool,
    ) -> Self {
        let fulfillment_policy = if strict_fulfillment_signatures {
            SignaturePolicy::Enforce
        } else {
            SignaturePolicy::WarnOnly
        };

        if !verifiers.payments.has_secret() {
            tracing::warn!("No payment webhook secret configured; every payment webhook will be rejected");
        }

        Self {
            orders,
            fulfillment,
            checkout,
            verifiers,
            fulfillment_policy,
        }
    }

    // ------------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------------

    pub async fn handle_payment(&self, raw: &[u8], signature: Option<&str>) -> Result<PaymentAck, PaymentWebhookError> {
        // Payment confirmation is always enforced.
        if !self.verifiers.payments.verify(raw, signature) {
            tracing::warn!(has_signature = signature.is_some(), "Rejected payment webhook: signature mismatch");
            return Err(PaymentWebhookError::InvalidSignature);
        }

        let (event_type, event) = match parse_stripe(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable payment webhook");
                return Ok(PaymentAck { received: false });
            }
        };
        let event_type = event_type.unwrap_or_default();

        let (session, target) = match event {
            PaymentEvent::Completed(session) => (session, OrderStatus::Paid),
            PaymentEvent::Expired(session) => (session, OrderStatus::Canceled),
            PaymentEvent::PaymentFailed(session) => (session, OrderStatus::Failed),
            PaymentEvent::Ignored => {
                tracing::debug!(event_type = %event_type, "Ignoring payment event");
                return Ok(PaymentAck { received: true });
            }
        };

        let order_id = match self.resolve_payment_order(&session).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::warn!(event_type = %event_type, session_id = %session.id, "Payment event matches no order");
                return Ok(PaymentAck { received: true });
            }
            Err(e) => return Err(storage_failure(&event_type, e)),
        };

        let address = match target {
            OrderStatus::Paid => self.shipping_address_for(&session).await,
            _ => None,
        };
        let source = format!("stripe:{event_type}");

        let mutated = self
            .orders
            .mutate(order_id, |order| {
                if let Some(address) = &address {
                    if order.shipping_address.is_none() || order.status == OrderStatus::Pending {
                        order.set_shipping_address(address.clone());
                    }
                }
                Ok(order.advance_status(target, &source))
            })
            .await;

        let mutated = match mutated {
            Ok(m) => m,
            Err(OrderError::NotFound(_)) => {
                tracing::warn!(order_id = %order_id, event_type = %event_type, "Payment event for unknown order");
                return Ok(PaymentAck { received: true });
            }
            Err(e) => return Err(storage_failure(&event_type, e)),
        };

        log_transition(&mutated.order, &mutated.output, &source);

        if target == OrderStatus::Paid && mutated.output.is_applied() {
            self.start_fulfillment(&mutated.order).await;
        }

        Ok(PaymentAck { received: true })
    }

    async fn resolve_payment_order(&self, session: &CheckoutSessionObject) -> Result<Option<Uuid>, OrderError> {
        if let Some(raw) = session.order_id() {
            match Uuid::parse_str(raw) {
                Ok(id) => return Ok(Some(id)),
                Err(_) => tracing::warn!(order_id = raw, "Unparseable order id in session metadata"),
            }
        }
        Ok(self
            .orders
            .find_by_checkout_session(&session.id)
            .await?
            .map(|order| order.id))
    }

    /// Address from the event if it carries one, otherwise from the
    /// processor's copy of the session.
    async fn shipping_address_for(&self, session: &CheckoutSessionObject) -> Option<ShippingAddress> {
        if let Some(address) = session.shipping_address() {
            return Some(address);
        }

        let checkout = self.checkout.as_ref()?;
        match checkout.get_checkout_session(&session.id).await {
            Ok(details) => details.shipping_address,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Could not re-fetch checkout session");
                None
            }
        }
    }

    /// Errors are logged and left for the operator re-drive; they never fail
    /// the webhook.
    async fn start_fulfillment(&self, order: &Order) {
        if order.shipping_address.is_none() {
            tracing::error!(order_id = %order.id, "Paid order has no shipping address; fulfillment needs re-drive");
            return;
        }

        match self.fulfillment.place(order).await {
            Ok(outcome) => tracing::info!(order_id = %order.id, outcome = ?outcome, "Fulfillment dispatched"),
            Err(e) => tracing::error!(order_id = %order.id, error = %e, "Fulfillment dispatch failed"),
        }
    }

    // ------------------------------------------------------------------------
    // Fulfillment providers
    // ------------------------------------------------------------------------

    pub async fn handle_printful(&self, raw: &[u8], signature: Option<&str>) -> FulfillmentAck {
        self.handle_fulfillment(FulfillmentProvider::Printful, raw, signature).await
    }

    pub async fn handle_gelato(&self, raw: &[u8], signature: Option<&str>) -> FulfillmentAck {
        self.handle_fulfillment(FulfillmentProvider::Gelato, raw, signature).await
    }

    async fn handle_fulfillment(&self, provider: FulfillmentProvider, raw: &[u8], signature: Option<&str>) -> FulfillmentAck {
        let (verifier, parsed) = match provider {
            FulfillmentProvider::Printful => (&self.verifiers.printful, parse_printful(raw)),
            _ => (&self.verifiers.gelato, parse_gelato(raw)),
        };

        let (event_type, event) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Undecodable fulfillment webhook");
                return FulfillmentAck::new(false, e.event_type().map(str::to_string));
            }
        };

        // Verified before anything is acknowledged, including ignored types.
        if !verifier.verify(raw, signature) {
            match self.fulfillment_policy {
                SignaturePolicy::Enforce => {
                    tracing::warn!(provider = %provider, event_type = ?event_type, "Rejected fulfillment webhook: signature mismatch");
                    return FulfillmentAck::new(false, event_type);
                }
                SignaturePolicy::WarnOnly => {
                    tracing::warn!(provider = %provider, event_type = ?event_type, "Unverified fulfillment webhook, processing anyway");
                }
            }
        }

        let Some(event) = event else {
            tracing::debug!(provider = %provider, event_type = ?event_type, "Ignoring fulfillment event");
            return FulfillmentAck::new(true, event_type);
        };

        let order_id = match self.resolve_fulfillment_order(&event).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::info!(provider = %provider, event_type = %event.event_type, lookup = ?event.lookup, "Fulfillment event matches no order");
                return FulfillmentAck::new(true, event_type);
            }
            Err(e) => {
                tracing::error!(provider = %provider, error = %e, "Order lookup failed");
                return FulfillmentAck::new(false, event_type);
            }
        };

        if let FulfillmentUpdate::Status { provider_status, status: None, .. } = &event.update {
            tracing::warn!(order_id = %order_id, provider = %provider, provider_status = %provider_status, "Unmapped provider status; leaving order status unchanged");
        }

        match self.orders.mutate(order_id, |order| Ok(apply_fulfillment_update(order, &event))).await {
            Ok(mutated) => {
                if let Some(transition) = &mutated.output {
                    log_transition(&mutated.order, transition, &event.source());
                }
                FulfillmentAck::new(true, event_type)
            }
            Err(OrderError::NotFound(_)) => {
                tracing::info!(order_id = %order_id, provider = %provider, "Fulfillment event for unknown order");
                FulfillmentAck::new(true, event_type)
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, provider = %provider, error = %e, "Failed to apply fulfillment event");
                FulfillmentAck::new(false, event_type)
            }
        }
    }

    async fn resolve_fulfillment_order(&self, event: &FulfillmentEvent) -> Result<Option<Uuid>, OrderError> {
        match &event.lookup {
            None => Ok(None),
            Some(OrderLookup::Id(id)) => Ok(Some(*id)),
            Some(OrderLookup::Reference(reference)) => Ok(self
                .orders
                .find_by_fulfillment_reference(reference)
                .await?
                .map(|order| order.id)),
        }
    }
}

/// Tracking and estimates always merge. Status only moves once payment has
/// been confirmed, so a provider can never mark an unpaid order paid.
fn apply_fulfillment_update(order: &mut Order, event: &FulfillmentEvent) -> Option<Transition> {
    let (tracking, next) = match &event.update {
        FulfillmentUpdate::Status { tracking, status, .. } => (tracking.as_slice(), *status),
        FulfillmentUpdate::Shipped { tracking } => (tracking.as_slice(), Some(OrderStatus::Shipped)),
        FulfillmentUpdate::DeliveryEstimate(estimate) => {
            order.set_delivery_estimate(estimate.clone());
            return None;
        }
    };

    order.merge_tracking_all(tracking.iter().cloned());

    let next = next?;
    if order.status == OrderStatus::Pending {
        return Some(Transition::Rejected { from: order.status, to: next });
    }
    Some(order.advance_status(next, &event.source()))
}

fn log_transition(order: &Order, transition: &Transition, source: &str) {
    match transition {
        Transition::Applied { from, to } => {
            tracing::info!(order_id = %order.id, from = %from, to = %to, source, "Order status changed");
        }
        Transition::Duplicate => {
            tracing::debug!(order_id = %order.id, status = %order.status, source, "Duplicate status event");
        }
        Transition::Rejected { from, to } => {
            tracing::warn!(order_id = %order.id, from = %from, to = %to, source, "Ignored out-of-order status event");
        }
    }
}

fn storage_failure(event_type: &str, error: OrderError) -> PaymentWebhookError {
    tracing::error!(event_type, error = %error, "Payment webhook could not reach order storage");
    PaymentWebhookError::Storage(error.to_string())
}
