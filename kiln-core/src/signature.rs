//! Webhook authenticity checks.
//!
//! Every check runs over the raw request bytes exactly as received. Parsing
//! and re-serializing JSON changes whitespace and key order, which breaks the
//! HMAC, so callers must hand in the unparsed body.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default tolerance for timestamped (Stripe-style) signatures.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// What to do when a webhook fails verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePolicy {
    /// Reject the delivery without touching any order.
    Enforce,
    /// Log a warning and keep processing.
    WarnOnly,
}

/// How a provider signs its webhook bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureScheme {
    /// `t=<unix>,v1=<hex>` where the MAC covers `"{t}.{body}"`.
    Timestamped { tolerance_secs: i64 },
    /// Hex HMAC-SHA256 of the body, optionally prefixed with `sha256=`.
    HexBody,
}

/// A provider's signing scheme bound to its shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    scheme: SignatureScheme,
    secret: Option<String>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("scheme", &self.scheme)
            .field("secret", &self.secret.as_ref().map(|_| "********"))
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(scheme: SignatureScheme, secret: Option<String>) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        Self { scheme, secret }
    }

    pub fn stripe(secret: Option<String>, tolerance_secs: i64) -> Self {
        Self::new(SignatureScheme::Timestamped { tolerance_secs }, secret)
    }

    pub fn hex_body(secret: Option<String>) -> Self {
        Self::new(SignatureScheme::HexBody, secret)
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// `false` when no secret is configured, the header is missing or
    /// malformed, or the MAC does not match.
    pub fn verify(&self, raw_body: &[u8], signature_header: Option<&str>) -> bool {
        self.verify_at(raw_body, signature_header, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(&self, raw_body: &[u8], signature_header: Option<&str>, now: i64) -> bool {
        let (Some(secret), Some(header)) = (self.secret.as_deref(), signature_header) else {
            return false;
        };

        match self.scheme {
            SignatureScheme::Timestamped { tolerance_secs } => {
                verify_timestamped(raw_body, header, secret, tolerance_secs, now)
            }
            SignatureScheme::HexBody => verify(raw_body, header, secret),
        }
    }
}

/// Check a hex HMAC-SHA256 signature of `raw_body` under `secret`.
pub fn verify(raw_body: &[u8], signature_header: &str, secret: &str) -> bool {
    let candidate = signature_header.trim();
    let candidate = candidate.strip_prefix("sha256=").unwrap_or(candidate);

    let Ok(expected) = hex::decode(candidate) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

/// Check a `t=<unix>,v1=<hex>[,v1=<hex>...]` header. Any matching `v1` entry
/// inside the tolerance window is accepted.
pub fn verify_timestamped(
    raw_body: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> bool {
    let mut timestamp: Option<&str> = None;
    let mut signatures = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return false;
    };
    let Ok(issued_at) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now - issued_at).abs() > tolerance_secs {
        return false;
    }

    let mut signed_payload = Vec::with_capacity(timestamp.len() + 1 + raw_body.len());
    signed_payload.extend_from_slice(timestamp.as_bytes());
    signed_payload.push(b'.');
    signed_payload.extend_from_slice(raw_body);

    signatures
        .into_iter()
        .any(|candidate| verify(&signed_payload, candidate, secret))
}

/// Hex HMAC-SHA256 of `payload`. Used to sign test fixtures and outgoing
/// callbacks.
pub fn sign(payload: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Build a `t=...,v1=...` header for `payload` at `timestamp`.
pub fn sign_timestamped(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut signed_payload = format!("{}.", timestamp).into_bytes();
    signed_payload.extend_from_slice(payload);
    format!("t={},v1={}", timestamp, sign(&signed_payload, secret))
}
