use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized failure kinds shared by every provider client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentErrorCode {
    RateLimit,
    InvalidAddress,
    ServiceUnavailable,
    NoRatesAvailable,
    InvalidRequest,
    AuthenticationFailed,
    Unknown,
}

impl FulfillmentErrorCode {
    /// Deterministic mapping from a provider's HTTP status.
    pub fn from_http_status(status_code: u16) -> Self {
        match status_code {
            400 => Self::InvalidRequest,
            401 | 403 => Self::AuthenticationFailed,
            422 => Self::InvalidAddress,
            429 => Self::RateLimit,
            s if s >= 500 => Self::ServiceUnavailable,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "RATE_LIMIT",
            Self::InvalidAddress => "INVALID_ADDRESS",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::NoRatesAvailable => "NO_RATES_AVAILABLE",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable | Self::RateLimit)
    }

    /// HTTP status the API layer answers with when this error reaches a caller.
    pub fn http_status_hint(&self) -> u16 {
        match self {
            Self::RateLimit => 429,
            Self::InvalidAddress | Self::InvalidRequest => 400,
            Self::AuthenticationFailed => 401,
            Self::ServiceUnavailable => 503,
            Self::NoRatesAvailable => 404,
            Self::Unknown => 500,
        }
    }
}

impl fmt::Display for FulfillmentErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transient, normalized provider failure. Never persisted.
///
/// Provider-specific errors (HTTP client errors, JSON decoding errors, provider
/// error envelopes) are converted into this type inside the client and never
/// cross the client boundary themselves.
#[derive(Debug, thiserror::Error)]
#[error("[{provider}] {code}: {message}")]
pub struct FulfillmentError {
    pub code: FulfillmentErrorCode,
    pub provider: String,
    pub message: String,
    pub status_code: Option<u16>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FulfillmentError {
    pub fn new(code: FulfillmentErrorCode, provider: &str, message: impl Into<String>) -> Self {
        Self {
            code,
            provider: provider.to_string(),
            message: message.into(),
            status_code: None,
            cause: None,
        }
    }

    pub fn from_http_status(status_code: u16, provider: &str, message: impl Into<String>) -> Self {
        Self {
            code: FulfillmentErrorCode::from_http_status(status_code),
            provider: provider.to_string(),
            message: message.into(),
            status_code: Some(status_code),
            cause: None,
        }
    }

    /// Timeouts and connection failures. A timed-out create may still have
    /// produced an order on the provider side.
    pub fn service_unavailable(provider: &str, message: impl Into<String>) -> Self {
        Self::new(FulfillmentErrorCode::ServiceUnavailable, provider, message)
    }

    pub fn no_rates(provider: &str) -> Self {
        Self::new(
            FulfillmentErrorCode::NoRatesAvailable,
            provider,
            "no shipping rates available for this order",
        )
    }

    pub fn invalid_request(provider: &str, message: impl Into<String>) -> Self {
        Self::new(FulfillmentErrorCode::InvalidRequest, provider, message)
    }

    pub fn unknown(provider: &str, message: impl Into<String>) -> Self {
        Self::new(FulfillmentErrorCode::Unknown, provider, message)
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (400, FulfillmentErrorCode::InvalidRequest),
            (401, FulfillmentErrorCode::AuthenticationFailed),
            (403, FulfillmentErrorCode::AuthenticationFailed),
            (404, FulfillmentErrorCode::Unknown),
            (409, FulfillmentErrorCode::Unknown),
            (422, FulfillmentErrorCode::InvalidAddress),
            (429, FulfillmentErrorCode::RateLimit),
            (500, FulfillmentErrorCode::ServiceUnavailable),
            (503, FulfillmentErrorCode::ServiceUnavailable),
        ];

        for (status, expected) in cases {
            assert_eq!(FulfillmentErrorCode::from_http_status(status), expected, "status {}", status);
        }
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        let err = FulfillmentError::from_http_status(429, "printful", "Too many requests");
        assert_eq!(err.code, FulfillmentErrorCode::RateLimit);
        assert_eq!(err.status_code, Some(429));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_no_rates_is_not_retryable() {
        let err = FulfillmentError::no_rates("gelato");
        assert_eq!(err.code, FulfillmentErrorCode::NoRatesAvailable);
        assert!(!err.is_retryable());
        assert_eq!(err.code.http_status_hint(), 404);
    }

    #[test]
    fn test_permanent_errors_are_not_retryable() {
        for status in [400, 401, 403, 422] {
            assert!(!FulfillmentError::from_http_status(status, "gelato", "nope").is_retryable());
        }
    }

    #[test]
    fn test_display_includes_provider_and_code() {
        let err = FulfillmentError::from_http_status(503, "gelato", "upstream down");
        assert_eq!(err.to_string(), "[gelato] SERVICE_UNAVAILABLE: upstream down");
    }

    #[test]
    fn test_code_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&FulfillmentErrorCode::NoRatesAvailable).unwrap();
        assert_eq!(json, "\"NO_RATES_AVAILABLE\"");
    }
}
