use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which print-on-demand provider manufactures a product.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentProvider {
    Printful,
    Gelato,
    /// Fulfilled outside the system by an operator.
    Manual,
    /// Not configured. Paid orders for these products need operator action.
    #[default]
    None,
}

impl FulfillmentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Printful => "printful",
            Self::Gelato => "gelato",
            Self::Manual => "manual",
            Self::None => "none",
        }
    }

    /// Lenient parse for values read from the catalog. Unknown or empty
    /// values come back as `None` so the router reports them as
    /// misconfiguration instead of failing the read.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("printful") => Self::Printful,
            Some("gelato") => Self::Gelato,
            Some("manual") => Self::Manual,
            Some("none") | Some("") | None => Self::None,
            Some(other) => {
                tracing::warn!(provider = other, "Unsupported fulfillment provider in catalog");
                Self::None
            }
        }
    }
}

impl std::fmt::Display for FulfillmentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-specific settings attached to a product by the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentConfig {
    #[serde(default)]
    pub printful_sync_variant_id: Option<i64>,
    #[serde(default)]
    pub printful_variant_id: Option<i64>,
    #[serde(default)]
    pub gelato_product_uid: Option<String>,
    /// Print-ready design file
    #[serde(default)]
    pub file_url: Option<String>,
}

impl FulfillmentConfig {
    pub fn design_file(&self) -> Option<&str> {
        self.file_url.as_deref().filter(|url| !url.trim().is_empty())
    }

    pub fn gelato_product(&self) -> Option<&str> {
        self.gelato_product_uid.as_deref().filter(|uid| !uid.trim().is_empty())
    }
}

/// The fulfillment-relevant projection of a catalog product. The catalog owns
/// products; this crate only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    /// Major units, as the catalog reports it (25.0 == $25.00)
    pub price: f64,
    pub currency: String,
    #[serde(default)]
    pub fulfillment_provider: FulfillmentProvider,
    #[serde(default)]
    pub fulfillment_config: FulfillmentConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider() {
        assert_eq!(FulfillmentProvider::parse(Some("printful")), FulfillmentProvider::Printful);
        assert_eq!(FulfillmentProvider::parse(Some(" Gelato ")), FulfillmentProvider::Gelato);
        assert_eq!(FulfillmentProvider::parse(Some("manual")), FulfillmentProvider::Manual);
        assert_eq!(FulfillmentProvider::parse(None), FulfillmentProvider::None);
        assert_eq!(FulfillmentProvider::parse(Some("")), FulfillmentProvider::None);
        assert_eq!(FulfillmentProvider::parse(Some("prodigi")), FulfillmentProvider::None);
    }

    #[test]
    fn test_product_deserializes_without_fulfillment_fields() {
        let product: Product = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "name": "Poster",
            "description": null,
            "image": null,
            "price": 25.0,
            "currency": "USD"
        }))
        .unwrap();

        assert_eq!(product.fulfillment_provider, FulfillmentProvider::None);
        assert_eq!(product.fulfillment_config, FulfillmentConfig::default());
    }

    #[test]
    fn test_blank_config_values_are_missing() {
        let config = FulfillmentConfig {
            gelato_product_uid: Some("  ".to_string()),
            file_url: Some(String::new()),
            ..Default::default()
        };
        assert!(config.gelato_product().is_none());
        assert!(config.design_file().is_none());
    }
}
