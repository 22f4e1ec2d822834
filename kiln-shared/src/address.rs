use serde::{Deserialize, Serialize};
use crate::pii::Masked;

/// Where a physical order ships to. Collected by the payment processor during
/// hosted checkout and copied onto the order when payment confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub name: String,
    pub company: Option<String>,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2
    pub country: String,
    pub email: Option<Masked<String>>,
    pub phone: Option<Masked<String>>,
}

impl ShippingAddress {
    /// Split the recipient name into (first, last). Providers such as Gelato
    /// want both; a single-word name is used for both parts.
    pub fn split_name(&self) -> (String, String) {
        let trimmed = self.name.trim();
        match trimmed.rsplit_once(' ') {
            Some((first, last)) => (first.trim().to_string(), last.trim().to_string()),
            None => (trimmed.to_string(), trimmed.to_string()),
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_ref().map(|e| e.expose().as_str())
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_ref().map(|p| p.expose().as_str())
    }
}
