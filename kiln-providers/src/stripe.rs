use async_trait::async_trait;
use kiln_core::{
    CheckoutProvider, CheckoutSession, CheckoutSessionDetails, CheckoutSessionObject, CheckoutSessionRequest,
    FulfillmentError, ProviderResult,
};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use crate::http::{read_json, transport_error};
use crate::{require, ClientError};

const PROVIDER: &str = "stripe";
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Countries offered in the hosted page's shipping form when none are
/// configured.
pub const DEFAULT_SHIPPING_COUNTRIES: &[&str] = &["US", "CA", "GB", "AU", "DE", "FR", "NL", "IE", "NZ"];

#[derive(Debug, Deserialize)]
struct CreatedSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    secret_key: String,
    api_base: String,
    shipping_countries: Vec<String>,
}

impl StripeClient {
    pub fn new(
        http: Client,
        secret_key: Option<String>,
        api_base: Option<String>,
        shipping_countries: Vec<String>,
    ) -> Result<Self, ClientError> {
        let shipping_countries = if shipping_countries.is_empty() {
            DEFAULT_SHIPPING_COUNTRIES.iter().map(|c| c.to_string()).collect()
        } else {
            shipping_countries
        };

        Ok(Self {
            http,
            secret_key: require(secret_key, "stripe.secret_key")?,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            shipping_countries,
        })
    }

    async fn execute(&self, builder: RequestBuilder) -> ProviderResult<reqwest::Response> {
        builder
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))
    }

    /// The processor takes bracketed form keys rather than JSON.
    fn session_form(&self, request: &CheckoutSessionRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("client_reference_id".to_string(), request.order_id.to_string()),
            ("metadata[orderId]".to_string(), request.order_id.to_string()),
            ("payment_intent_data[metadata][orderId]".to_string(), request.order_id.to_string()),
            ("line_items[0][quantity]".to_string(), request.quantity.to_string()),
            ("line_items[0][price_data][currency]".to_string(), request.currency.clone()),
            ("line_items[0][price_data][unit_amount]".to_string(), request.unit_amount.to_string()),
            ("line_items[0][price_data][product_data][name]".to_string(), request.product_name.clone()),
        ];

        if let Some(description) = request.product_description.as_ref().filter(|d| !d.trim().is_empty()) {
            form.push(("line_items[0][price_data][product_data][description]".to_string(), description.clone()));
        }
        if let Some(image) = request.product_image.as_ref().filter(|i| !i.trim().is_empty()) {
            form.push(("line_items[0][price_data][product_data][images][0]".to_string(), image.clone()));
        }
        for (i, country) in self.shipping_countries.iter().enumerate() {
            form.push((format!("shipping_address_collection[allowed_countries][{i}]"), country.clone()));
        }
        form
    }
}

#[async_trait]
impl CheckoutProvider for StripeClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> ProviderResult<CheckoutSession> {
        let builder = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .form(&self.session_form(request));
        let response = self.execute(builder).await?;
        let created: CreatedSession = read_json(PROVIDER, response).await?;

        let url = created
            .url
            .ok_or_else(|| FulfillmentError::unknown(PROVIDER, "checkout session has no url"))?;
        tracing::debug!(order_id = %request.order_id, session_id = %created.id, "Checkout session opened");

        Ok(CheckoutSession {
            session_id: created.id,
            url,
        })
    }

    async fn get_checkout_session(&self, session_id: &str) -> ProviderResult<CheckoutSessionDetails> {
        let builder = self
            .http
            .get(format!("{}/v1/checkout/sessions/{session_id}", self.api_base));
        let response = self.execute(builder).await?;
        let session: CheckoutSessionObject = read_json(PROVIDER, response).await?;
        Ok(session.into_details())
    }
}
