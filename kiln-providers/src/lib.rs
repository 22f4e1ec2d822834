//! HTTP clients for the payment processor and the print-on-demand
//! providers. Each one implements the matching `kiln_core` contract and
//! reports every failure as a `FulfillmentError`.

mod http;
pub mod gelato;
pub mod printful;
pub mod stripe;

pub use gelato::GelatoClient;
pub use http::http_client;
pub use printful::PrintfulClient;
pub use stripe::StripeClient;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),
}

pub(crate) fn require(value: Option<String>, name: &'static str) -> Result<String, ClientError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ClientError::MissingCredential(name))
}
