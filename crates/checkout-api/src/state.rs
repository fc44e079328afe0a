//! # Application State
//!
//! Shared state for the Axum application. Holds the checkout
//! orchestrator, the callback verification secret, and configuration.

use checkout_core::{
    CartStore, CheckoutOrchestrator, Currency, InMemoryBillingMethods, InMemoryCartBackend,
    InMemoryCouponStore, InMemoryLedger, ItemCatalog, PricingConfig, Price, SequentialAccounts,
    Coupon, GatewaySelector,
};
use checkout_gateway::{
    BillsbyCardGateway, BillsbyConfig, BillsbySubscriptionGateway, PayPalConfig,
    PayPalWalletGateway,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Base URL for callbacks
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Flat per-item price, in minor units
    pub unit_price_cents: i64,
    /// Gateway dispatch timeout
    pub gateway_timeout: Duration,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            unit_price_cents: std::env::var("UNIT_PRICE_CENTS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(500),
            gateway_timeout: Duration::from_secs(
                std::env::var("GATEWAY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid socket address")
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Checkout orchestrator (cart, ledger and gateways behind it)
    pub orchestrator: Arc<CheckoutOrchestrator>,
    /// Shared secret verifying inbound wallet callbacks
    pub callback_secret: String,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Create a new AppState wired from the environment
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();

        let catalog = load_item_catalog()?;
        let coupons = Arc::new(load_coupons()?);

        let pricing = PricingConfig::new(Price::from_cents(
            config.unit_price_cents,
            Currency::USD,
        ));

        let cart = Arc::new(CartStore::new(
            Arc::new(InMemoryCartBackend::new()),
            Arc::new(catalog),
            coupons.clone(),
            pricing,
        ));

        let paypal_config = PayPalConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize PayPal: {}", e))?;
        let billsby_config = BillsbyConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize Billsby: {}", e))?;

        let callback_secret = paypal_config.callback_secret.clone();

        let gateways = GatewaySelector::new()
            .with_gateway(Arc::new(BillsbyCardGateway::new(billsby_config.clone())))
            .with_gateway(Arc::new(BillsbySubscriptionGateway::new(billsby_config)))
            .with_gateway(Arc::new(PayPalWalletGateway::new(paypal_config)));

        let orchestrator = Arc::new(CheckoutOrchestrator::new(
            cart,
            coupons,
            Arc::new(InMemoryLedger::new()),
            Arc::new(SequentialAccounts::new()),
            Arc::new(InMemoryBillingMethods::standard()),
            gateways,
            config.gateway_timeout,
        ));

        Ok(Self {
            orchestrator,
            callback_secret,
            config,
        })
    }

    /// Assemble state from pre-built parts (used by tests)
    pub fn from_parts(
        orchestrator: Arc<CheckoutOrchestrator>,
        callback_secret: impl Into<String>,
        config: AppConfig,
    ) -> Self {
        Self {
            orchestrator,
            callback_secret: callback_secret.into(),
            config,
        }
    }
}

/// Load item catalog from config file
fn load_item_catalog() -> anyhow::Result<ItemCatalog> {
    let config_paths = [
        "config/catalog.toml",
        "../config/catalog.toml",
        "../../config/catalog.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let catalog = ItemCatalog::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded {} items from {}", catalog.items.len(), path);
            return Ok(catalog);
        }
    }

    tracing::warn!("No item catalog found, using empty catalog");
    Ok(ItemCatalog::new())
}

#[derive(Debug, Deserialize)]
struct CouponFile {
    #[serde(default)]
    coupons: Vec<Coupon>,
}

/// Load coupons from config file
fn load_coupons() -> anyhow::Result<InMemoryCouponStore> {
    let store = InMemoryCouponStore::new();

    let config_paths = [
        "config/coupons.toml",
        "../config/coupons.toml",
        "../../config/coupons.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let file: CouponFile = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            tracing::info!("Loaded {} coupons from {}", file.coupons.len(), path);
            for coupon in file.coupons {
                store.insert(coupon);
            }
            return Ok(store);
        }
    }

    tracing::warn!("No coupon config found, starting with none");
    Ok(store)
}
