use serde::Deserialize;
use std::env;

/// Process configuration, loaded once at startup and passed down by value.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
    #[serde(default)]
    pub printful: PrintfulConfig,
    #[serde(default)]
    pub gelato: GelatoConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Unset runs on in-memory stores.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: default_timeout_secs() }
    }
}

fn default_timeout_secs() -> u64 { 15 }

#[derive(Deserialize, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub api_base: Option<String>,
    #[serde(default = "default_tolerance")]
    pub signature_tolerance_secs: i64,
    #[serde(default)]
    pub shipping_countries: Vec<String>,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            webhook_secret: None,
            api_base: None,
            signature_tolerance_secs: default_tolerance(),
            shipping_countries: Vec::new(),
        }
    }
}

fn default_tolerance() -> i64 { kiln_core::signature::DEFAULT_TOLERANCE_SECS }

#[derive(Deserialize, Clone, Default)]
pub struct PrintfulConfig {
    pub api_key: Option<String>,
    pub store_id: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: Option<String>,
    /// Confirm orders for production on creation instead of leaving drafts.
    #[serde(default)]
    pub auto_confirm: bool,
}

#[derive(Deserialize, Clone, Default)]
pub struct GelatoConfig {
    pub api_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: Option<String>,
    pub return_address: Option<ReturnAddressConfig>,
}

/// Snake-case keys so the same names work from TOML and environment.
#[derive(Debug, Deserialize, Clone)]
pub struct ReturnAddressConfig {
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub post_code: String,
    pub country: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<ReturnAddressConfig> for kiln_core::supplier::GelatoAddress {
    fn from(c: ReturnAddressConfig) -> Self {
        Self {
            first_name: c.first_name,
            last_name: c.last_name,
            company_name: c.company_name,
            address_line1: c.address_line1,
            address_line2: c.address_line2,
            city: c.city,
            state: c.state,
            post_code: c.post_code,
            country: c.country,
            email: c.email,
            phone: c.phone,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    /// Reject unverified fulfillment webhooks instead of logging them.
    #[serde(default)]
    pub strict_fulfillment_signatures: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckoutConfig {
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self { default_currency: default_currency() }
    }
}

fn default_currency() -> String { "USD".to_string() }

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "********")
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &redact(&self.secret_key))
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("api_base", &self.api_base)
            .field("signature_tolerance_secs", &self.signature_tolerance_secs)
            .finish()
    }
}

impl std::fmt::Debug for PrintfulConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintfulConfig")
            .field("api_key", &redact(&self.api_key))
            .field("store_id", &self.store_id)
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("base_url", &self.base_url)
            .field("auto_confirm", &self.auto_confirm)
            .finish()
    }
}

impl std::fmt::Debug for GelatoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GelatoConfig")
            .field("api_key", &redact(&self.api_key))
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("base_url", &self.base_url)
            .field("return_address", &self.return_address.is_some())
            .finish()
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // KILN__STRIPE__SECRET_KEY=... sets stripe.secret_key
            .add_source(config::Environment::with_prefix("KILN").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http.timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = from_toml("[server]\nport = 8080\n");

        assert!(config.database.url.is_none());
        assert_eq!(config.http.timeout_secs, 15);
        assert_eq!(config.stripe.signature_tolerance_secs, 300);
        assert!(!config.printful.auto_confirm);
        assert!(!config.webhooks.strict_fulfillment_signatures);
        assert_eq!(config.checkout.default_currency, "USD");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = from_toml(
            "[server]\nport = 8080\n[stripe]\nsecret_key = \"sk_live_secret\"\nwebhook_secret = \"whsec_secret\"\n",
        );
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk_live_secret"));
        assert!(!debug.contains("whsec_secret"));
    }

    #[test]
    fn test_gelato_return_address() {
        let config = from_toml(
            r#"
            [server]
            port = 8080

            [gelato.return_address]
            first_name = "Kiln"
            last_name = "Returns"
            address_line1 = "9 Dock Rd"
            city = "Portland"
            post_code = "97201"
            country = "US"
            "#,
        );
        let address: kiln_core::supplier::GelatoAddress = config.gelato.return_address.unwrap().into();
        assert_eq!(address.first_name, "Kiln");
        assert!(address.state.is_none());
    }
}
