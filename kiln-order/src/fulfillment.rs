//! Picks the fulfillment provider for a paid order and places the order
//! there.

use std::sync::Arc;

use kiln_catalog::{FulfillmentProvider, Product};
use kiln_core::supplier::{
    GelatoAddress, GelatoFile, GelatoItem, GelatoOrderRequest, PrintfulFile, PrintfulItem,
    PrintfulOrderRequest, PrintfulRecipient,
};
use kiln_core::{FulfillmentError, GelatoApi, PrintfulApi, ShippingRate};
use kiln_shared::ShippingAddress;
use uuid::Uuid;

use crate::models::Order;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Catalog or deployment setup is incomplete. Needs an operator.
    #[error("Fulfillment misconfigured for product {product_id}: {reason}")]
    Configuration { product_id: Uuid, reason: String },

    #[error(transparent)]
    Provider(#[from] FulfillmentError),
}

impl DispatchError {
    fn config(product: &Product, reason: impl Into<String>) -> Self {
        Self::Configuration {
            product_id: product.id,
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration { .. } => false,
            Self::Provider(e) => e.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Placed {
        provider: FulfillmentProvider,
        fulfillment_order_id: String,
        status: String,
    },
    /// Left to an operator; no provider call made.
    Manual,
}

/// Provider for a product, resolved against the clients this process has.
pub enum FulfillmentRoute<'a> {
    Printful(&'a dyn PrintfulApi),
    Gelato(&'a dyn GelatoApi),
    Manual,
    Unassigned { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct RouterSettings {
    /// Submit Printful orders for production immediately instead of
    /// leaving them as drafts.
    pub printful_auto_confirm: bool,
    pub gelato_return_address: Option<GelatoAddress>,
}

pub struct FulfillmentRouter {
    printful: Option<Arc<dyn PrintfulApi>>,
    gelato: Option<Arc<dyn GelatoApi>>,
    settings: RouterSettings,
}

impl FulfillmentRouter {
    pub fn new(
        printful: Option<Arc<dyn PrintfulApi>>,
        gelato: Option<Arc<dyn GelatoApi>>,
        settings: RouterSettings,
    ) -> Self {
        Self { printful, gelato, settings }
    }

    pub fn route(&self, product: &Product) -> FulfillmentRoute<'_> {
        match product.fulfillment_provider {
            FulfillmentProvider::Printful => match &self.printful {
                Some(client) => FulfillmentRoute::Printful(client.as_ref()),
                None => FulfillmentRoute::Unassigned {
                    reason: "Printful client is not configured".to_string(),
                },
            },
            FulfillmentProvider::Gelato => match &self.gelato {
                Some(client) => FulfillmentRoute::Gelato(client.as_ref()),
                None => FulfillmentRoute::Unassigned {
                    reason: "Gelato client is not configured".to_string(),
                },
            },
            FulfillmentProvider::Manual => FulfillmentRoute::Manual,
            FulfillmentProvider::None => FulfillmentRoute::Unassigned {
                reason: "product has no fulfillment provider".to_string(),
            },
        }
    }

    /// Place the provider order for a paid order.
    ///
    /// Not retried here. A timed-out create may still have succeeded on the
    /// provider side, so a blind retry risks a duplicate physical order.
    pub async fn dispatch(&self, order: &Order, product: &Product) -> Result<DispatchOutcome, DispatchError> {
        match self.route(product) {
            FulfillmentRoute::Printful(client) => {
                let request = build_printful_order(order, product)?;
                let placed = client
                    .create_order(&request, self.settings.printful_auto_confirm)
                    .await?;
                tracing::info!(
                    order_id = %order.id,
                    printful_order_id = %placed.id,
                    confirmed = self.settings.printful_auto_confirm,
                    "Printful order placed"
                );
                Ok(DispatchOutcome::Placed {
                    provider: FulfillmentProvider::Printful,
                    fulfillment_order_id: placed.id,
                    status: placed.status,
                })
            }
            FulfillmentRoute::Gelato(client) => {
                let request = build_gelato_order(order, product, self.settings.gelato_return_address.clone())?;
                let placed = client.create_order(&request).await?;
                tracing::info!(order_id = %order.id, gelato_order_id = %placed.id, "Gelato order placed");
                Ok(DispatchOutcome::Placed {
                    provider: FulfillmentProvider::Gelato,
                    fulfillment_order_id: placed.id,
                    status: placed.status,
                })
            }
            FulfillmentRoute::Manual => {
                tracing::info!(order_id = %order.id, product_id = %product.id, "Manual fulfillment, awaiting operator");
                Ok(DispatchOutcome::Manual)
            }
            FulfillmentRoute::Unassigned { reason } => Err(DispatchError::config(product, reason)),
        }
    }

    /// Shipping options for an order's address. Same payload as `dispatch`,
    /// nothing is placed.
    pub async fn quote(&self, order: &Order, product: &Product) -> Result<Vec<ShippingRate>, DispatchError> {
        let (provider, rates) = match self.route(product) {
            FulfillmentRoute::Printful(client) => {
                let request = build_printful_order(order, product)?;
                ("printful", client.quote_order(&request).await?)
            }
            FulfillmentRoute::Gelato(client) => {
                let request = build_gelato_order(order, product, self.settings.gelato_return_address.clone())?;
                ("gelato", client.quote_order(&request).await?)
            }
            FulfillmentRoute::Manual => {
                return Err(DispatchError::config(product, "manual products have no shipping quotes"))
            }
            FulfillmentRoute::Unassigned { reason } => return Err(DispatchError::config(product, reason)),
        };

        if rates.is_empty() {
            return Err(FulfillmentError::no_rates(provider).into());
        }
        Ok(rates)
    }
}

fn require_address<'a>(order: &'a Order, product: &Product) -> Result<&'a ShippingAddress, DispatchError> {
    order
        .shipping_address
        .as_ref()
        .ok_or_else(|| DispatchError::config(product, format!("order {} has no shipping address", order.id)))
}

fn require_file<'a>(product: &'a Product) -> Result<&'a str, DispatchError> {
    product
        .fulfillment_config
        .design_file()
        .ok_or_else(|| DispatchError::config(product, "missing design file url"))
}

pub fn build_printful_order(order: &Order, product: &Product) -> Result<PrintfulOrderRequest, DispatchError> {
    let config = &product.fulfillment_config;
    let (sync_variant_id, variant_id) = match (config.printful_sync_variant_id, config.printful_variant_id) {
        (Some(sync), _) => (Some(sync), None),
        (None, Some(variant)) => (None, Some(variant)),
        (None, None) => return Err(DispatchError::config(product, "missing Printful variant id")),
    };
    let file_url = require_file(product)?;
    let address = require_address(order, product)?;

    Ok(PrintfulOrderRequest {
        external_id: order.id.simple().to_string(),
        recipient: PrintfulRecipient {
            name: address.name.clone(),
            company: address.company.clone(),
            address1: address.line1.clone(),
            address2: address.line2.clone(),
            city: address.city.clone(),
            state_code: address.state.clone(),
            country_code: address.country.clone(),
            zip: address.postal_code.clone(),
            email: address.email().map(str::to_string),
            phone: address.phone().map(str::to_string),
        },
        items: vec![PrintfulItem {
            sync_variant_id,
            variant_id,
            quantity: order.quantity,
            files: vec![PrintfulFile { url: file_url.to_string() }],
        }],
    })
}

pub fn build_gelato_order(
    order: &Order,
    product: &Product,
    return_address: Option<GelatoAddress>,
) -> Result<GelatoOrderRequest, DispatchError> {
    let product_uid = product
        .fulfillment_config
        .gelato_product()
        .ok_or_else(|| DispatchError::config(product, "missing Gelato product uid"))?;
    let file_url = require_file(product)?;
    let address = require_address(order, product)?;
    let (first_name, last_name) = address.split_name();

    Ok(GelatoOrderRequest {
        order_type: "order".to_string(),
        order_reference_id: order.fulfillment_reference_id.clone(),
        customer_reference_id: order.user_id.clone(),
        currency: order.currency.to_ascii_uppercase(),
        items: vec![GelatoItem {
            item_reference_id: format!("{}-1", order.id),
            product_uid: product_uid.to_string(),
            files: vec![GelatoFile {
                file_type: "default".to_string(),
                url: file_url.to_string(),
            }],
            quantity: order.quantity,
        }],
        shipping_address: GelatoAddress {
            first_name,
            last_name,
            company_name: address.company.clone(),
            address_line1: address.line1.clone(),
            address_line2: address.line2.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            post_code: address.postal_code.clone(),
            country: address.country.clone(),
            email: address.email().map(str::to_string),
            phone: address.phone().map(str::to_string),
        },
        return_address,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::tests::sample_order;
    use crate::models::OrderStatus;
    use async_trait::async_trait;
    use kiln_catalog::FulfillmentConfig;
    use kiln_core::{FulfillmentErrorCode, ProviderOrder, ProviderResult};
    use kiln_shared::Masked;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct MockPrintful {
        pub created: Mutex<Vec<(PrintfulOrderRequest, bool)>>,
        pub fail_with: Option<u16>,
        pub rates: Vec<ShippingRate>,
    }

    #[async_trait]
    impl PrintfulApi for MockPrintful {
        async fn create_order(&self, order: &PrintfulOrderRequest, confirm: bool) -> ProviderResult<ProviderOrder> {
            if let Some(status) = self.fail_with {
                return Err(FulfillmentError::from_http_status(status, "printful", "mock failure"));
            }
            self.created.lock().unwrap().push((order.clone(), confirm));
            Ok(ProviderOrder { id: "pf_1001".to_string(), status: "draft".to_string() })
        }
        async fn get_order(&self, id: &str) -> ProviderResult<ProviderOrder> {
            Ok(ProviderOrder { id: id.to_string(), status: "draft".to_string() })
        }
        async fn quote_order(&self, _order: &PrintfulOrderRequest) -> ProviderResult<Vec<ShippingRate>> {
            Ok(self.rates.clone())
        }
        async fn cancel_order(&self, id: &str) -> ProviderResult<ProviderOrder> {
            Ok(ProviderOrder { id: id.to_string(), status: "canceled".to_string() })
        }
        async fn confirm_order(&self, id: &str) -> ProviderResult<ProviderOrder> {
            Ok(ProviderOrder { id: id.to_string(), status: "pending".to_string() })
        }
    }

    #[derive(Default)]
    pub(crate) struct MockGelato {
        pub created: Mutex<Vec<GelatoOrderRequest>>,
    }

    #[async_trait]
    impl GelatoApi for MockGelato {
        async fn create_order(&self, order: &GelatoOrderRequest) -> ProviderResult<ProviderOrder> {
            self.created.lock().unwrap().push(order.clone());
            Ok(ProviderOrder { id: "gel_77".to_string(), status: "created".to_string() })
        }
        async fn get_order(&self, id: &str) -> ProviderResult<ProviderOrder> {
            Ok(ProviderOrder { id: id.to_string(), status: "created".to_string() })
        }
        async fn quote_order(&self, _order: &GelatoOrderRequest) -> ProviderResult<Vec<ShippingRate>> {
            Ok(Vec::new())
        }
        async fn cancel_order(&self, id: &str) -> ProviderResult<ProviderOrder> {
            Ok(ProviderOrder { id: id.to_string(), status: "canceled".to_string() })
        }
    }

    pub(crate) fn test_address() -> ShippingAddress {
        ShippingAddress {
            name: "Ada Lovelace".to_string(),
            company: None,
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            state: Some("IL".to_string()),
            postal_code: "62701".to_string(),
            country: "US".to_string(),
            email: Some(Masked::from("ada@example.com")),
            phone: None,
        }
    }

    pub(crate) fn product(provider: FulfillmentProvider) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Poster".to_string(),
            description: None,
            image: None,
            price: 25.0,
            currency: "USD".to_string(),
            fulfillment_provider: provider,
            fulfillment_config: FulfillmentConfig {
                printful_sync_variant_id: Some(4011),
                printful_variant_id: None,
                gelato_product_uid: Some("flat_a4_poster".to_string()),
                file_url: Some("https://cdn.example.com/design.png".to_string()),
            },
        }
    }

    fn paid_order() -> Order {
        let mut order = sample_order();
        order.advance_status(OrderStatus::Paid, "test");
        order.shipping_address = Some(test_address());
        order
    }

    #[tokio::test]
    async fn test_printful_dispatch_builds_draft_order() {
        let printful = Arc::new(MockPrintful::default());
        let router = FulfillmentRouter::new(Some(printful.clone()), None, RouterSettings::default());
        let order = paid_order();

        let outcome = router
            .dispatch(&order, &product(FulfillmentProvider::Printful))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Placed {
                provider: FulfillmentProvider::Printful,
                fulfillment_order_id: "pf_1001".to_string(),
                status: "draft".to_string(),
            }
        );
        let created = printful.created.lock().unwrap();
        let (request, confirm) = &created[0];
        assert!(!confirm);
        assert_eq!(request.external_id, order.id.simple().to_string());
        assert_eq!(request.items[0].sync_variant_id, Some(4011));
        assert_eq!(request.items[0].quantity, 2);
        assert_eq!(request.recipient.email.as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn test_gelato_dispatch_uses_reference_id() {
        let gelato = Arc::new(MockGelato::default());
        let router = FulfillmentRouter::new(None, Some(gelato.clone()), RouterSettings::default());
        let order = paid_order();

        router
            .dispatch(&order, &product(FulfillmentProvider::Gelato))
            .await
            .unwrap();

        let created = gelato.created.lock().unwrap();
        assert_eq!(created[0].order_reference_id, order.fulfillment_reference_id);
        assert_eq!(created[0].customer_reference_id, "user-1");
        assert_eq!(created[0].items[0].item_reference_id, format!("{}-1", order.id));
        assert_eq!(created[0].shipping_address.first_name, "Ada");
        assert_eq!(created[0].shipping_address.last_name, "Lovelace");
    }

    #[tokio::test]
    async fn test_manual_makes_no_call() {
        let printful = Arc::new(MockPrintful::default());
        let router = FulfillmentRouter::new(Some(printful.clone()), None, RouterSettings::default());

        let outcome = router
            .dispatch(&paid_order(), &product(FulfillmentProvider::Manual))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Manual);
        assert!(printful.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_routes_are_configuration_errors() {
        let router = FulfillmentRouter::new(None, None, RouterSettings::default());

        let none = router.dispatch(&paid_order(), &product(FulfillmentProvider::None)).await;
        assert!(matches!(none, Err(DispatchError::Configuration { .. })));

        let missing_client = router.dispatch(&paid_order(), &product(FulfillmentProvider::Gelato)).await;
        assert!(matches!(missing_client, Err(DispatchError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_missing_variant_or_file_is_configuration_error() {
        let router = FulfillmentRouter::new(Some(Arc::new(MockPrintful::default())), None, RouterSettings::default());

        let mut no_variant = product(FulfillmentProvider::Printful);
        no_variant.fulfillment_config.printful_sync_variant_id = None;
        let err = router.dispatch(&paid_order(), &no_variant).await.unwrap_err();
        assert!(err.to_string().contains("variant"));

        let mut no_file = product(FulfillmentProvider::Printful);
        no_file.fulfillment_config.file_url = None;
        let err = router.dispatch(&paid_order(), &no_file).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_address_is_configuration_error() {
        let router = FulfillmentRouter::new(Some(Arc::new(MockPrintful::default())), None, RouterSettings::default());
        let mut order = paid_order();
        order.shipping_address = None;

        let err = router
            .dispatch(&order, &product(FulfillmentProvider::Printful))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_provider_rate_limit_is_retryable() {
        let printful = Arc::new(MockPrintful { fail_with: Some(429), ..Default::default() });
        let router = FulfillmentRouter::new(Some(printful), None, RouterSettings::default());

        let err = router
            .dispatch(&paid_order(), &product(FulfillmentProvider::Printful))
            .await
            .unwrap_err();

        match &err {
            DispatchError::Provider(e) => assert_eq!(e.code, FulfillmentErrorCode::RateLimit),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_quote_is_no_rates() {
        let router = FulfillmentRouter::new(None, Some(Arc::new(MockGelato::default())), RouterSettings::default());

        let err = router
            .quote(&paid_order(), &product(FulfillmentProvider::Gelato))
            .await
            .unwrap_err();

        match err {
            DispatchError::Provider(e) => assert_eq!(e.code, FulfillmentErrorCode::NoRatesAvailable),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_variant_id_used_without_sync_variant() {
        let mut product = product(FulfillmentProvider::Printful);
        product.fulfillment_config.printful_sync_variant_id = None;
        product.fulfillment_config.printful_variant_id = Some(71);

        let request = build_printful_order(&paid_order(), &product).unwrap();
        assert_eq!(request.items[0].variant_id, Some(71));
        assert!(request.items[0].sync_variant_id.is_none());
    }
}
