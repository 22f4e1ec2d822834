use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use kiln_api::{app, AppState, Services};
use kiln_catalog::{InMemoryProductRepository, ProductRepository};
use kiln_core::{CheckoutProvider, GelatoApi, PrintfulApi, SignatureVerifier};
use kiln_order::{InMemoryOrderRepository, OrderRepository, RouterSettings, WebhookVerifiers};
use kiln_providers::{ClientError, GelatoClient, PrintfulClient, StripeClient};
use kiln_store::app_config::Config;
use kiln_store::{DbClient, PgOrderRepository, PgProductRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Missing credentials switch a provider off; anything else is fatal.
fn optional_client<T>(name: &str, built: Result<T, ClientError>) -> anyhow::Result<Option<T>> {
    match built {
        Ok(client) => Ok(Some(client)),
        Err(ClientError::MissingCredential(key)) => {
            tracing::warn!(provider = name, "{} not set; {} disabled", key, name);
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to build {name} client")),
    }
}

async fn stores(config: &Config) -> anyhow::Result<(Arc<dyn OrderRepository>, Arc<dyn ProductRepository>)> {
    match config.database.url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Ok((
                Arc::new(PgOrderRepository::new(db.pool.clone())),
                Arc::new(PgProductRepository::new(db.pool)),
            ))
        }
        None => {
            tracing::warn!("database.url not set; orders and products are kept in memory");
            Ok((
                Arc::new(InMemoryOrderRepository::new()),
                Arc::new(InMemoryProductRepository::new()),
            ))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiln_api=debug,kiln_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Kiln API on port {}", config.server.port);

    let http = kiln_providers::http_client(config.http_timeout()).context("Failed to build HTTP client")?;

    let checkout: Option<Arc<dyn CheckoutProvider>> = optional_client(
        "stripe",
        StripeClient::new(
            http.clone(),
            config.stripe.secret_key.clone(),
            config.stripe.api_base.clone(),
            config.stripe.shipping_countries.clone(),
        ),
    )?
    .map(|c| Arc::new(c) as Arc<dyn CheckoutProvider>);

    let printful: Option<Arc<dyn PrintfulApi>> = optional_client(
        "printful",
        PrintfulClient::new(
            http.clone(),
            config.printful.api_key.clone(),
            config.printful.store_id.clone(),
            config.printful.base_url.clone(),
        ),
    )?
    .map(|c| Arc::new(c) as Arc<dyn PrintfulApi>);

    let gelato: Option<Arc<dyn GelatoApi>> = optional_client(
        "gelato",
        GelatoClient::new(http, config.gelato.api_key.clone(), config.gelato.base_url.clone()),
    )?
    .map(|c| Arc::new(c) as Arc<dyn GelatoApi>);

    let (orders, products) = stores(&config).await?;

    let state = AppState::new(Services {
        orders,
        products,
        checkout,
        printful,
        gelato,
        router: RouterSettings {
            printful_auto_confirm: config.printful.auto_confirm,
            gelato_return_address: config.gelato.return_address.clone().map(Into::into),
        },
        verifiers: WebhookVerifiers {
            payments: SignatureVerifier::stripe(
                config.stripe.webhook_secret.clone(),
                config.stripe.signature_tolerance_secs,
            ),
            printful: SignatureVerifier::hex_body(config.printful.webhook_secret.clone()),
            gelato: SignatureVerifier::hex_body(config.gelato.webhook_secret.clone()),
        },
        strict_fulfillment_signatures: config.webhooks.strict_fulfillment_signatures,
        default_currency: config.checkout.default_currency.clone(),
    });

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
