use std::sync::Arc;

use kiln_catalog::ProductRepository;
use kiln_core::{CheckoutProvider, GelatoApi, PrintfulApi};
use kiln_order::{
    CheckoutOrchestrator, FulfillmentCoordinator, FulfillmentRouter, OrderManager, OrderRepository, RouterSettings,
    WebhookDispatcher, WebhookVerifiers,
};

/// Everything the process wires together at startup. Absent clients mean
/// the matching feature is unavailable, not an error.
pub struct Services {
    pub orders: Arc<dyn OrderRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub checkout: Option<Arc<dyn CheckoutProvider>>,
    pub printful: Option<Arc<dyn PrintfulApi>>,
    pub gelato: Option<Arc<dyn GelatoApi>>,
    pub router: RouterSettings,
    pub verifiers: WebhookVerifiers,
    pub strict_fulfillment_signatures: bool,
    pub default_currency: String,
}

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderManager>,
    pub checkout: Option<Arc<CheckoutOrchestrator>>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub fulfillment: Arc<FulfillmentCoordinator>,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        let orders = Arc::new(OrderManager::new(services.orders));
        let router = FulfillmentRouter::new(services.printful, services.gelato, services.router);
        let fulfillment = Arc::new(FulfillmentCoordinator::new(
            orders.clone(),
            services.products.clone(),
            router,
        ));

        let checkout = services.checkout.clone().map(|provider| {
            Arc::new(
                CheckoutOrchestrator::new(orders.clone(), services.products.clone(), provider)
                    .with_default_currency(services.default_currency.clone()),
            )
        });

        let webhooks = Arc::new(WebhookDispatcher::new(
            orders.clone(),
            fulfillment.clone(),
            services.checkout,
            services.verifiers,
            services.strict_fulfillment_signatures,
        ));

        Self {
            orders,
            checkout,
            webhooks,
            fulfillment,
        }
    }
}
