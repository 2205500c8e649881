//! Rekber Database Layer
//!
//! PostgreSQL persistence for the escrow platform: the durable
//! implementation of the escrow store and the chat message store, behind
//! one connection pool with a bounded acquire timeout. Concurrency control
//! is row locking (`SELECT ... FOR UPDATE` on the transaction row, guarded
//! updates for stock and balances), not application mutexes, so multiple
//! service instances can run against the same database.

pub mod config;
pub mod error;
pub mod models;
mod store;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use store::PgStore;

/// Database connection pool
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Connecting to PostgreSQL: {}", config.url_masked());

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> DbResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }

    /// Connectivity check
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }
}
