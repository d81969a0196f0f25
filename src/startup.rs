use crate::config::{Config, StorageKind};
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

/// Checks configuration and, for Postgres storage, database readiness.
/// `pool` is `None` for in-memory storage.
pub async fn validate_environment(config: &Config, pool: Option<&PgPool>) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Some(pool) = pool {
        if let Err(e) = validate_database(pool).await {
            report.database = false;
            report.errors.push(format!("Database: {:#}", e));
        }
    }

    report
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.storage == StorageKind::Postgres
        && !(config.database_url.starts_with("postgres://")
            || config.database_url.starts_with("postgresql://"))
    {
        anyhow::bail!("DATABASE_URL must be a postgres:// URL");
    }
    if config.payme.merchant_login.trim().is_empty() {
        anyhow::bail!("PAYME_MERCHANT_LOGIN is empty");
    }
    if config.payme.secret_key.is_empty() {
        anyhow::bail!("PAYME_SECRET_KEY is empty");
    }
    if config.payme.account_field.trim().is_empty() {
        anyhow::bail!("PAYME_ACCOUNT_FIELD is empty");
    }
    if config.payme.minor_unit_scale == 0 {
        anyhow::bail!("PAYME_MINOR_UNIT_SCALE must be greater than 0");
    }
    if config.request_timeout_secs == 0 {
        anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than 0");
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}
