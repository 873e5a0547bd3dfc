use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::errors::RepositoryResult;
use crate::repositories::CatalogStore;

pub mod components;
pub mod images;
pub mod teams;

/// PostgreSQL-backed catalog store
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(Self::connect_options(config))
            .await
            .with_context(|| {
                format!(
                    "failed to connect to database {} at {}:{}",
                    config.name, config.host, config.port
                )
            })?;

        info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            "Connected to database"
        );

        Ok(Self { pool })
    }

    pub fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name)
            .ssl_mode(PgSslMode::Disable)
    }
}

#[async_trait]
impl CatalogStore for Database {
    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
