use async_trait::async_trait;
use kiln_core::supplier::{PrintfulItem, PrintfulOrderRequest, PrintfulRecipient};
use kiln_core::{PrintfulApi, ProviderOrder, ProviderResult, ShippingRate};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::http::{read_json, transport_error};
use crate::{require, ClientError};

const PROVIDER: &str = "printful";
pub const DEFAULT_BASE_URL: &str = "https://api.printful.com";

/// Every Printful response wraps its payload as `{code, result}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

/// Printful returns numeric ids; drafts created elsewhere can carry strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PrintfulId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for PrintfulId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PrintfulOrder {
    id: PrintfulId,
    #[serde(default)]
    status: String,
}

impl From<PrintfulOrder> for ProviderOrder {
    fn from(order: PrintfulOrder) -> Self {
        ProviderOrder {
            id: order.id.to_string(),
            status: order.status,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrintfulRate {
    id: String,
    name: String,
    rate: String,
    currency: String,
    #[serde(default)]
    min_delivery_days: Option<u32>,
    #[serde(default)]
    max_delivery_days: Option<u32>,
}

#[derive(Serialize)]
struct RatesRequest<'a> {
    recipient: &'a PrintfulRecipient,
    items: &'a [PrintfulItem],
}

#[derive(Clone)]
pub struct PrintfulClient {
    http: Client,
    api_key: String,
    store_id: Option<String>,
    base_url: String,
}

impl PrintfulClient {
    pub fn new(
        http: Client,
        api_key: Option<String>,
        store_id: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            http,
            api_key: require(api_key, "printful.api_key")?,
            store_id: store_id.filter(|s| !s.trim().is_empty()),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.bearer_auth(&self.api_key);
        match &self.store_id {
            Some(store_id) => builder.header("X-PF-Store-Id", store_id),
            None => builder,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, builder: RequestBuilder) -> ProviderResult<T> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let envelope: Envelope<T> = read_json(PROVIDER, response).await?;
        Ok(envelope.result)
    }
}

#[async_trait]
impl PrintfulApi for PrintfulClient {
    async fn create_order(&self, order: &PrintfulOrderRequest, confirm: bool) -> ProviderResult<ProviderOrder> {
        let request = self
            .http
            .post(format!("{}/orders", self.base_url))
            .query(&[("confirm", confirm)])
            .json(order);
        let created: PrintfulOrder = self.send(request).await?;
        tracing::debug!(external_id = %order.external_id, printful_order_id = %created.id, "Printful order created");
        Ok(created.into())
    }

    async fn get_order(&self, id: &str) -> ProviderResult<ProviderOrder> {
        let order: PrintfulOrder = self.send(self.http.get(format!("{}/orders/{id}", self.base_url))).await?;
        Ok(order.into())
    }

    async fn quote_order(&self, order: &PrintfulOrderRequest) -> ProviderResult<Vec<ShippingRate>> {
        let body = RatesRequest {
            recipient: &order.recipient,
            items: &order.items,
        };
        let rates: Vec<PrintfulRate> = self
            .send(self.http.post(format!("{}/shipping/rates", self.base_url)).json(&body))
            .await?;

        Ok(rates
            .into_iter()
            .map(|r| ShippingRate {
                id: r.id,
                name: r.name,
                rate: r.rate,
                currency: r.currency,
                min_delivery_days: r.min_delivery_days,
                max_delivery_days: r.max_delivery_days,
            })
            .collect())
    }

    async fn cancel_order(&self, id: &str) -> ProviderResult<ProviderOrder> {
        let order: PrintfulOrder = self
            .send(self.http.delete(format!("{}/orders/{id}", self.base_url)))
            .await?;
        Ok(order.into())
    }

    async fn confirm_order(&self, id: &str) -> ProviderResult<ProviderOrder> {
        let order: PrintfulOrder = self
            .send(self.http.post(format!("{}/orders/{id}/confirm", self.base_url)))
            .await?;
        Ok(order.into())
    }
}
