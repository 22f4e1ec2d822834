use std::time::Duration;

use kiln_core::{FulfillmentError, ProviderResult};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// One pooled client shared by every provider. The timeout bounds each
/// whole request, connect included.
pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("kiln/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Network-level failure before any response arrived.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> FulfillmentError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        FulfillmentError::service_unavailable(provider, err.to_string()).with_cause(err)
    } else {
        FulfillmentError::unknown(provider, err.to_string()).with_cause(err)
    }
}

/// Providers disagree on where the message lives in an error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.pointer("/error/message"),
        value.get("error"),
        value.get("result"),
        value.get("message"),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .map(str::to_string);
    message
}

/// Map a non-2xx response to the taxonomy, or decode the 2xx body.
pub(crate) async fn read_json<T: DeserializeOwned>(provider: &str, response: Response) -> ProviderResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        tracing::warn!(provider, status = status.as_u16(), message = %message, "Provider request failed");
        return Err(FulfillmentError::from_http_status(status.as_u16(), provider, message));
    }

    response.json::<T>().await.map_err(|e| {
        FulfillmentError::unknown(provider, format!("unexpected response body: {e}")).with_cause(e)
    })
}

/// Like [`read_json`] for endpoints whose success body carries nothing.
pub(crate) async fn expect_success(provider: &str, response: Response) -> ProviderResult<()> {
    read_json::<Value>(provider, response).await.map(|_| ()).or_else(|e| {
        // An empty 2xx body fails to decode; only real HTTP errors count.
        if e.status_code.is_some() {
            Err(e)
        } else {
            Ok(())
        }
    })
}
