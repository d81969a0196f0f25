use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(acquire_timeout(config.request_timeout_secs))
        .connect(&config.database_url)
        .await
}

/// Half the request budget, so a starved pool fails inside the callback
/// deadline and surfaces as a storage error.
fn acquire_timeout(request_timeout_secs: u64) -> Duration {
    Duration::from_millis((request_timeout_secs.saturating_mul(1_000) / 2).max(100))
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}
