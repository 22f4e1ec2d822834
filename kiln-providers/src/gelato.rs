use async_trait::async_trait;
use kiln_core::supplier::{GelatoAddress, GelatoItem, GelatoOrderRequest};
use kiln_core::{FulfillmentError, GelatoApi, ProviderOrder, ProviderResult, ShippingRate};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::http::{expect_success, read_json, transport_error};
use crate::{require, ClientError};

const PROVIDER: &str = "gelato";
pub const DEFAULT_BASE_URL: &str = "https://order.gelatoapis.com/v4";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GelatoOrder {
    id: String,
    #[serde(default)]
    fulfillment_status: Option<String>,
}

impl From<GelatoOrder> for ProviderOrder {
    fn from(order: GelatoOrder) -> Self {
        ProviderOrder {
            id: order.id,
            status: order.fulfillment_status.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRequest<'a> {
    order_reference_id: &'a str,
    customer_reference_id: &'a str,
    currency: &'a str,
    allow_multiple_quotes: bool,
    recipient: &'a GelatoAddress,
    products: &'a [GelatoItem],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    #[serde(default)]
    quotes: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Quote {
    #[serde(default)]
    shipment_methods: Vec<ShipmentMethod>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShipmentMethod {
    name: String,
    shipment_method_uid: String,
    price: f64,
    currency: String,
    #[serde(default)]
    min_delivery_days: Option<u32>,
    #[serde(default)]
    max_delivery_days: Option<u32>,
}

#[derive(Clone)]
pub struct GelatoClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl GelatoClient {
    pub fn new(http: Client, api_key: Option<String>, base_url: Option<String>) -> Result<Self, ClientError> {
        Ok(Self {
            http,
            api_key: require(api_key, "gelato.api_key")?,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    async fn execute(&self, builder: RequestBuilder) -> ProviderResult<reqwest::Response> {
        builder
            .header("X-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))
    }
}

#[async_trait]
impl GelatoApi for GelatoClient {
    async fn create_order(&self, order: &GelatoOrderRequest) -> ProviderResult<ProviderOrder> {
        let response = self
            .execute(self.http.post(format!("{}/orders", self.base_url)).json(order))
            .await?;
        let created: GelatoOrder = read_json(PROVIDER, response).await?;
        tracing::debug!(reference = %order.order_reference_id, gelato_order_id = %created.id, "Gelato order created");
        Ok(created.into())
    }

    async fn get_order(&self, id: &str) -> ProviderResult<ProviderOrder> {
        let response = self
            .execute(self.http.get(format!("{}/orders/{id}", self.base_url)))
            .await?;
        let order: GelatoOrder = read_json(PROVIDER, response).await?;
        Ok(order.into())
    }

    async fn quote_order(&self, order: &GelatoOrderRequest) -> ProviderResult<Vec<ShippingRate>> {
        let body = QuoteRequest {
            order_reference_id: &order.order_reference_id,
            customer_reference_id: &order.customer_reference_id,
            currency: &order.currency,
            allow_multiple_quotes: false,
            recipient: &order.shipping_address,
            products: &order.items,
        };
        let response = self
            .execute(self.http.post(format!("{}/orders:quote", self.base_url)).json(&body))
            .await?;
        let quoted: QuoteResponse = read_json(PROVIDER, response).await?;

        let rates: Vec<ShippingRate> = quoted
            .quotes
            .into_iter()
            .flat_map(|q| q.shipment_methods)
            .map(|m| ShippingRate {
                id: m.shipment_method_uid,
                name: m.name,
                rate: format!("{:.2}", m.price),
                currency: m.currency,
                min_delivery_days: m.min_delivery_days,
                max_delivery_days: m.max_delivery_days,
            })
            .collect();

        if rates.is_empty() {
            return Err(FulfillmentError::no_rates(PROVIDER));
        }
        Ok(rates)
    }

    async fn cancel_order(&self, id: &str) -> ProviderResult<ProviderOrder> {
        let response = self
            .execute(self.http.post(format!("{}/orders/{id}:cancel", self.base_url)))
            .await?;
        expect_success(PROVIDER, response).await?;
        Ok(ProviderOrder {
            id: id.to_string(),
            status: "canceled".to_string(),
        })
    }
}
