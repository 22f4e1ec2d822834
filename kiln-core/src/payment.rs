use std::collections::HashMap;

use async_trait::async_trait;
use kiln_shared::{Masked, ShippingAddress};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProviderResult;

/// Everything the payment processor needs to open a hosted checkout page for
/// one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionRequest {
    pub order_id: Uuid,
    pub product_name: String,
    pub product_description: Option<String>,
    pub product_image: Option<String>,
    /// Minor units
    pub unit_amount: i64,
    pub currency: String,
    pub quantity: u32,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// The subset of a completed checkout session the core acts on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionDetails {
    pub session_id: String,
    pub order_id: Option<String>,
    pub payment_status: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
}

#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    /// Short provider name recorded on the order (e.g. `stripe`).
    fn name(&self) -> &'static str;

    /// Open a hosted checkout session. The order id travels in the session
    /// metadata so the payment webhook can find the order again.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> ProviderResult<CheckoutSession>;

    /// Re-fetch a session, including the shipping address collected during
    /// checkout.
    async fn get_checkout_session(&self, session_id: &str) -> ProviderResult<CheckoutSessionDetails>;
}

// ============================================================================
// Processor wire format
// ============================================================================

/// A checkout session as the processor serializes it, both in webhook
/// payloads (`data.object`) and in the retrieve-session response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
    #[serde(default)]
    pub collected_information: Option<CollectedInformation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<WireAddress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<WireAddress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectedInformation {
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireAddress {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl CheckoutSessionObject {
    /// The order id placed in session metadata at checkout.
    pub fn order_id(&self) -> Option<&str> {
        self.metadata
            .get("orderId")
            .map(String::as_str)
            .filter(|id| !id.trim().is_empty())
    }

    /// Newer API versions nest the shipping block under
    /// `collected_information`; older ones put it at the top level. The
    /// billing address on `customer_details` is the last resort.
    pub fn shipping_address(&self) -> Option<ShippingAddress> {
        let customer = self.customer_details.as_ref();
        let shipping = self
            .collected_information
            .as_ref()
            .and_then(|c| c.shipping_details.as_ref())
            .filter(|s| s.address.is_some())
            .or_else(|| self.shipping_details.as_ref().filter(|s| s.address.is_some()));

        let (name, address) = match shipping {
            Some(details) => (
                non_blank(&details.name).or_else(|| customer.and_then(|c| non_blank(&c.name))),
                details.address.as_ref()?,
            ),
            None => {
                let customer = customer?;
                (non_blank(&customer.name), customer.address.as_ref()?)
            }
        };

        Some(ShippingAddress {
            name: name.unwrap_or_default(),
            company: None,
            line1: non_blank(&address.line1)?,
            line2: non_blank(&address.line2),
            city: non_blank(&address.city)?,
            state: non_blank(&address.state),
            postal_code: non_blank(&address.postal_code).unwrap_or_default(),
            country: non_blank(&address.country)?,
            email: customer.and_then(|c| non_blank(&c.email)).map(Masked::new),
            phone: customer.and_then(|c| non_blank(&c.phone)).map(Masked::new),
        })
    }

    pub fn into_details(self) -> CheckoutSessionDetails {
        CheckoutSessionDetails {
            order_id: self.order_id().map(str::to_string),
            shipping_address: self.shipping_address(),
            payment_status: self.payment_status,
            session_id: self.id,
        }
    }
}
