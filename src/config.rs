use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;

use crate::payme::amount::DEFAULT_MINOR_UNIT_SCALE;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Postgres,
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageKind::Postgres),
            "memory" => Ok(StorageKind::Memory),
            other => anyhow::bail!("STORAGE must be 'postgres' or 'memory', got '{}'", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        }
    }
}

/// Merchant credentials and callback conventions.
#[derive(Deserialize, Clone)]
pub struct PaymeConfig {
    pub merchant_login: String,
    pub secret_key: String,
    pub account_field: String,
    pub minor_unit_scale: u32,
}

impl fmt::Debug for PaymeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymeConfig")
            .field("merchant_login", &self.merchant_login)
            .field("secret_key", &"****")
            .field("account_field", &self.account_field)
            .field("minor_unit_scale", &self.minor_unit_scale)
            .finish()
    }
}

/// An order preloaded into in-memory storage for local runs.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SeedOrder {
    pub id: i64,
    pub amount: BigDecimal,
}

/// Parses `id:amount` pairs separated by commas, e.g. `501:50000,502:120.50`.
pub fn parse_seed_orders(raw: &str) -> Result<Vec<SeedOrder>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, amount) = entry
                .split_once(':')
                .with_context(|| format!("seed order '{}' must be id:amount", entry))?;
            Ok(SeedOrder {
                id: id
                    .trim()
                    .parse()
                    .with_context(|| format!("seed order id '{}' is not an integer", id))?,
                amount: amount
                    .trim()
                    .parse()
                    .with_context(|| format!("seed order amount '{}' is not a decimal", amount))?,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub storage: StorageKind,
    pub database_url: String,
    pub payme: PaymeConfig,
    pub request_timeout_secs: u64,
    pub log_request_body: bool,
    pub log_format: LogFormat,
    /// Only read with `STORAGE=memory`.
    pub memory_seed_orders: Vec<SeedOrder>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let storage: StorageKind = var("STORAGE", "postgres").parse()?;
        let database_url = match storage {
            StorageKind::Postgres => lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            StorageKind::Memory => lookup("DATABASE_URL").unwrap_or_default(),
        };

        Ok(Config {
            server_port: var("SERVER_PORT", "3000")
                .parse()
                .context("SERVER_PORT must be a port number")?,
            storage,
            database_url,
            payme: PaymeConfig {
                merchant_login: var("PAYME_MERCHANT_LOGIN", "Paycom"),
                secret_key: lookup("PAYME_SECRET_KEY").context("PAYME_SECRET_KEY must be set")?,
                account_field: var("PAYME_ACCOUNT_FIELD", "order_id"),
                minor_unit_scale: var(
                    "PAYME_MINOR_UNIT_SCALE",
                    &DEFAULT_MINOR_UNIT_SCALE.to_string(),
                )
                .parse()
                .context("PAYME_MINOR_UNIT_SCALE must be a positive integer")?,
            },
            request_timeout_secs: var("REQUEST_TIMEOUT_SECS", "10")
                .parse()
                .context("REQUEST_TIMEOUT_SECS must be a number of seconds")?,
            log_request_body: var("LOG_REQUEST_BODY", "false").parse().unwrap_or(false),
            log_format: var("LOG_FORMAT", "text").parse()?,
            memory_seed_orders: parse_seed_orders(&var("MEMORY_SEED_ORDERS", ""))
                .context("MEMORY_SEED_ORDERS is invalid")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn applies_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/billing"),
            ("PAYME_SECRET_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.storage, StorageKind::Postgres);
        assert_eq!(config.payme.merchant_login, "Paycom");
        assert_eq!(config.payme.account_field, "order_id");
        assert_eq!(config.payme.minor_unit_scale, 100);
        assert_eq!(config.request_timeout_secs, 10);
        assert!(!config.log_request_body);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn secret_key_is_required() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/billing")]))
            .unwrap_err();
        assert!(err.to_string().contains("PAYME_SECRET_KEY"));
    }

    #[test]
    fn memory_storage_needs_no_database() {
        let config = Config::from_lookup(lookup(&[
            ("STORAGE", "memory"),
            ("PAYME_SECRET_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.storage, StorageKind::Memory);
        assert!(config.database_url.is_empty());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_lookup(lookup(&[
            ("STORAGE", "redis"),
            ("PAYME_SECRET_KEY", "secret"),
        ]))
        .is_err());
        assert!(Config::from_lookup(lookup(&[
            ("STORAGE", "memory"),
            ("PAYME_SECRET_KEY", "secret"),
            ("SERVER_PORT", "http"),
        ]))
        .is_err());
    }

    #[test]
    fn parses_memory_seed_orders() {
        let config = Config::from_lookup(lookup(&[
            ("STORAGE", "memory"),
            ("PAYME_SECRET_KEY", "secret"),
            ("MEMORY_SEED_ORDERS", "501:50000, 502:120.50,"),
        ]))
        .unwrap();

        assert_eq!(
            config.memory_seed_orders,
            vec![
                SeedOrder { id: 501, amount: BigDecimal::from(50_000) },
                SeedOrder { id: 502, amount: "120.50".parse().unwrap() },
            ]
        );
        assert!(parse_seed_orders("").unwrap().is_empty());
        assert!(parse_seed_orders("501").is_err());
        assert!(parse_seed_orders("abc:10").is_err());
        assert!(parse_seed_orders("501:ten").is_err());
    }

    #[test]
    fn debug_masks_secret_key() {
        let config = Config::from_lookup(lookup(&[
            ("STORAGE", "memory"),
            ("PAYME_SECRET_KEY", "very-secret"),
        ]))
        .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("****"));
    }
}
