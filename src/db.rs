use std::{future::Future, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{config::DatabaseConfig, error::StoreError};

/// Upper bound for any single store operation, independent of the client connection.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .idle_timeout(Duration::from_secs(cfg.max_idle_secs))
        .acquire_timeout(Duration::from_secs(5))
        .connect(&cfg.url)
        .await
        .context("connect to database")?;
    Ok(pool)
}

/// Runs a query future under [`QUERY_TIMEOUT`]. Deadline expiry is a plain
/// store failure, never a conflict.
pub async fn bounded<T, F>(fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(sqlx::Error::RowNotFound)) => Err(StoreError::NotFound),
        Ok(Err(e)) => Err(StoreError::Database(e)),
        Err(_) => Err(StoreError::Timeout),
    }
}
