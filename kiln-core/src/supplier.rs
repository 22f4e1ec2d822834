//! Contracts for the print-on-demand fulfillment providers, plus the request
//! payloads each one accepts.
//!
//! Creating an order is billable on the provider side. Nothing in this crate
//! retries `create_order`; a retry after a timeout can double-create a
//! physical order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ProviderResult;

/// Normalized answer to create/get/cancel/confirm calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub status: String,
}

/// One shipping option returned by a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRate {
    pub id: String,
    pub name: String,
    /// Decimal amount as the provider reports it (e.g. "4.99")
    pub rate: String,
    pub currency: String,
    pub min_delivery_days: Option<u32>,
    pub max_delivery_days: Option<u32>,
}

// ============================================================================
// Printful
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintfulRecipient {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub address1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    pub country_code: String,
    pub zip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintfulFile {
    pub url: String,
}

/// Exactly one of `sync_variant_id` / `variant_id` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintfulItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_variant_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<i64>,
    pub quantity: u32,
    pub files: Vec<PrintfulFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintfulOrderRequest {
    /// Echoed back in webhooks as `data.order.external_id`.
    pub external_id: String,
    pub recipient: PrintfulRecipient,
    pub items: Vec<PrintfulItem>,
}

#[async_trait]
pub trait PrintfulApi: Send + Sync {
    /// Place an order. With `confirm == false` it stays a draft until
    /// `confirm_order` is called.
    async fn create_order(&self, order: &PrintfulOrderRequest, confirm: bool) -> ProviderResult<ProviderOrder>;

    async fn get_order(&self, id: &str) -> ProviderResult<ProviderOrder>;

    async fn quote_order(&self, order: &PrintfulOrderRequest) -> ProviderResult<Vec<ShippingRate>>;

    async fn cancel_order(&self, id: &str) -> ProviderResult<ProviderOrder>;

    async fn confirm_order(&self, id: &str) -> ProviderResult<ProviderOrder>;
}

// ============================================================================
// Gelato
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GelatoAddress {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub post_code: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GelatoFile {
    #[serde(rename = "type")]
    pub file_type: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GelatoItem {
    pub item_reference_id: String,
    pub product_uid: String,
    pub files: Vec<GelatoFile>,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GelatoOrderRequest {
    pub order_type: String,
    /// Echoed back in webhooks as `orderReferenceId`.
    pub order_reference_id: String,
    pub customer_reference_id: String,
    pub currency: String,
    pub items: Vec<GelatoItem>,
    pub shipping_address: GelatoAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_address: Option<GelatoAddress>,
}

#[async_trait]
pub trait GelatoApi: Send + Sync {
    async fn create_order(&self, order: &GelatoOrderRequest) -> ProviderResult<ProviderOrder>;

    async fn get_order(&self, id: &str) -> ProviderResult<ProviderOrder>;

    async fn quote_order(&self, order: &GelatoOrderRequest) -> ProviderResult<Vec<ShippingRate>>;

    async fn cancel_order(&self, id: &str) -> ProviderResult<ProviderOrder>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printful_item_omits_unset_variant() {
        let item = PrintfulItem {
            sync_variant_id: Some(42),
            variant_id: None,
            quantity: 2,
            files: vec![PrintfulFile { url: "https://cdn.example.com/a.png".to_string() }],
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["sync_variant_id"], 42);
        assert!(json.get("variant_id").is_none());
    }

    #[test]
    fn test_gelato_order_is_camel_case() {
        let order = GelatoOrderRequest {
            order_type: "order".to_string(),
            order_reference_id: "kiln_ref".to_string(),
            customer_reference_id: "user-1".to_string(),
            currency: "USD".to_string(),
            items: vec![GelatoItem {
                item_reference_id: "item-1".to_string(),
                product_uid: "poster_a4".to_string(),
                files: vec![GelatoFile {
                    file_type: "default".to_string(),
                    url: "https://cdn.example.com/a.png".to_string(),
                }],
                quantity: 1,
            }],
            shipping_address: GelatoAddress {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                company_name: None,
                address_line1: "1 Main St".to_string(),
                address_line2: None,
                city: "London".to_string(),
                state: None,
                post_code: "N1".to_string(),
                country: "GB".to_string(),
                email: None,
                phone: None,
            },
            return_address: None,
        };

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["orderReferenceId"], "kiln_ref");
        assert_eq!(json["items"][0]["files"][0]["type"], "default");
        assert_eq!(json["shippingAddress"]["postCode"], "N1");
        assert!(json.get("returnAddress").is_none());
    }
}
