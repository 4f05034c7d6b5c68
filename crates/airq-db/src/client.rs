//! PostgreSQL client and pool management

use crate::{DbError, DbResult};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Database client wrapping a sqlx connection pool
#[derive(Clone)]
pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    /// Connect using a `postgres://` URL
    pub async fn connect(database_url: &str, max_connections: u32) -> DbResult<Self> {
        if database_url.is_empty() {
            return Err(DbError::ConfigError("DATABASE_URL is empty".to_string()));
        }

        let pool = pool_options(max_connections).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn pool_options(max_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(30))
}
