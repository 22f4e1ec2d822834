pub mod error;
pub mod payment;
pub mod signature;
pub mod supplier;

pub use error::{FulfillmentError, FulfillmentErrorCode};
pub use payment::{
    CheckoutProvider, CheckoutSession, CheckoutSessionDetails, CheckoutSessionObject, CheckoutSessionRequest,
};
pub use signature::{SignaturePolicy, SignatureScheme, SignatureVerifier};
pub use supplier::{GelatoApi, PrintfulApi, ProviderOrder, ShippingRate};

/// Result type for every call that crosses a provider boundary.
pub type ProviderResult<T> = Result<T, FulfillmentError>;
