//! Rekber Server
//!
//! The escrow platform's service binary: wires the store, the chat hub,
//! the escrow engine and the gateway ingestor into one HTTP/WebSocket
//! surface.
//!
//! ```bash
//! # Start against PostgreSQL
//! rekber-server
//!
//! # Start with a custom config file
//! rekber-server --config /etc/rekber/config.toml
//!
//! # Start with the in-memory store and seeded demo data
//! rekber-server --memory
//!
//! # Environment overrides
//! REKBER__SERVER__PORT=8080 rekber-server
//! ```

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rust_decimal_macros::dec;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rekber_api::{create_router, ApiConfig, AppState};
use rekber_chat::{ChatConfig, ChatHub, MessageStore, RoomGate};
use rekber_db::{Database, DatabaseConfig as DbConfig};
use rekber_escrow::{EscrowService, EscrowStore, MemStore, StoreGate, TracingSink};
use rekber_gateway::{GatewayConfig, WebhookIngestor};
use rekber_types::{
    BuyerAccount, MerchantAccount, MerchantId, Product, ProductId, Tier, UserId, UserRole,
};

use crate::config::ServerConfig;

/// Rekber Server - P2P escrow platform
#[derive(Parser, Debug)]
#[command(name = "rekber-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "REKBER_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "REKBER_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "REKBER_PORT")]
    port: Option<u16>,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Run on the in-memory store with seeded demo data
    #[arg(long)]
    memory: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "REKBER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "REKBER_LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        server_config.server.host = host;
    }
    if let Some(port) = args.port {
        server_config.server.port = port;
    }
    if let Some(url) = args.database_url {
        server_config.database.url = url;
    }
    if let Some(level) = args.log_level {
        server_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        server_config.logging.format = format;
    }

    init_logging(&server_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Rekber server"
    );

    if server_config.gateway.api_key == "change-me-in-production" {
        tracing::warn!("Gateway API key is the placeholder value; callbacks will not verify against a real gateway");
    }

    // Stores
    let (store, messages): (Arc<dyn EscrowStore>, Arc<dyn MessageStore>) = if args.memory {
        tracing::warn!("Running on the in-memory store; nothing will survive a restart");
        let mem = Arc::new(seeded_mem_store().await);
        (mem.clone(), mem)
    } else {
        let db = init_database(&server_config.database).await?;
        let pg = db.store();
        (Arc::new(pg.clone()), Arc::new(pg))
    };

    // Domain services
    let gate: Arc<dyn RoomGate> = Arc::new(StoreGate::new(store.clone()));
    let hub = Arc::new(ChatHub::new(
        ChatConfig {
            history_replay: server_config.chat.history_replay,
            max_message_len: server_config.chat.max_message_len,
        },
        messages.clone(),
        gate.clone(),
    ));
    let engine = Arc::new(EscrowService::new(
        store.clone(),
        hub.clone(),
        Arc::new(TracingSink),
    ));
    let ingestor = Arc::new(WebhookIngestor::new(
        GatewayConfig {
            merchant_code: server_config.gateway.merchant_code.clone(),
            api_key: server_config.gateway.api_key.clone(),
            base_url: server_config.gateway.base_url.clone(),
        },
        engine.clone(),
        store.clone(),
    ));

    let state = Arc::new(AppState {
        engine,
        hub,
        ingestor,
        store,
        messages,
        gate,
    });

    let api_config = ApiConfig {
        enable_cors: server_config.api.enable_cors,
        cors_origins: server_config.api.cors_origins.clone(),
        enable_tracing: server_config.api.enable_tracing,
    };
    let app = create_router(state, api_config);

    let addr = server_config.server.socket_addr()?;
    tracing::info!(
        host = %server_config.server.host,
        port = %server_config.server.port,
        "Server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(server_config.server.shutdown_timeout()))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber.with(fmt::layer().json().with_target(true)).init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }

    Ok(())
}

/// Connect to PostgreSQL and optionally run migrations
async fn init_database(config: &config::DatabaseSettings) -> anyhow::Result<Database> {
    let db = Database::connect(&DbConfig {
        url: config.url.clone(),
        max_connections: config.max_connections,
        min_connections: config.min_connections,
        acquire_timeout_secs: config.acquire_timeout_secs,
    })
    .await?;

    if config.run_migrations {
        db.migrate().await?;
    }
    if !db.health_check().await {
        anyhow::bail!("database health check failed");
    }
    tracing::info!("Database ready");
    Ok(db)
}

/// A small, deterministic development world
async fn seeded_mem_store() -> MemStore {
    let store = MemStore::new();
    let buyer = UserId::new();
    let owner = UserId::new();
    let arbiter = UserId::new();
    let merchant = MerchantId::new();
    let product = ProductId::new();

    for (id, name, role) in [
        (buyer, "demo-buyer", UserRole::Buyer),
        (owner, "demo-merchant", UserRole::Merchant),
        (arbiter, "demo-arbiter", UserRole::Arbiter),
    ] {
        store
            .seed_user(BuyerAccount {
                id,
                username: name.into(),
                role,
                tier: Tier::Bronze,
                total_success_trx: 0,
                credit_balance: dec!(0),
            })
            .await;
        tracing::info!(user = name, id = %id, "seeded demo user");
    }
    store
        .seed_merchant(MerchantAccount {
            id: merchant,
            owner_user_id: owner,
            shop_name: "Demo Shop".into(),
            balance: dec!(0),
            tier: Tier::Bronze,
            total_success_trx: 0,
        })
        .await;
    store
        .seed_product(Product {
            id: product,
            merchant_id: merchant,
            name: "Demo Keyboard".into(),
            price: dec!(150000),
            stock: 25,
            active: true,
        })
        .await;
    tracing::info!(product = %product, "seeded demo product");
    store
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    tracing::info!(
        timeout_secs = timeout.as_secs(),
        "Waiting for in-flight requests to complete..."
    );
    tokio::time::sleep(timeout).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_port_override() {
        let args = Args::parse_from(["rekber-server", "--port", "8080", "--memory"]);
        assert_eq!(args.port, Some(8080));
        assert!(args.memory);
    }
}
