pub mod models;
pub mod status;
pub mod repository;
pub mod manager;
pub mod fulfillment;
pub mod placement;
pub mod events;
pub mod dispatcher;
pub mod orchestrator;

pub use models::{DeliveryEstimate, NewOrder, Order, OrderError, OrderStatus, StatusChange, TrackingInfo, Transition};
pub use repository::{InMemoryOrderRepository, OrderRepository, Pagination, RepositoryError};
pub use manager::{Mutated, OrderManager};
pub use fulfillment::{DispatchError, DispatchOutcome, FulfillmentRoute, FulfillmentRouter, RouterSettings};
pub use placement::{FulfillmentCoordinator, PlacementError};
pub use dispatcher::{FulfillmentAck, PaymentAck, PaymentWebhookError, WebhookDispatcher, WebhookVerifiers};
pub use orchestrator::{CheckoutError, CheckoutOrchestrator, CheckoutResponse, CreateCheckoutRequest};
