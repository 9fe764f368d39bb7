//! Configuration module for credit-service.

use crate::services::ledger::{
    FixedCosts, DEFAULT_FRAME_PROMPT_CREDITS, DEFAULT_IMAGE_GENERATION_CREDITS,
};
use crate::services::skills::PromptLanguage;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct CreditConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// `None` runs on the in-process store (development only).
    pub database: Option<DatabaseConfig>,
    pub billing: BillingConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Default)]
pub struct BillingConfig {
    pub costs: FixedCosts,
    /// Last-resort text model for script polishing.
    pub default_text_model: Option<String>,
    pub prompt_language: PromptLanguage,
}

impl CreditConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.is_production();

        let database = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url,
                max_connections: parse_env("DB_MAX_CONNECTIONS", 10),
                min_connections: parse_env("DB_MIN_CONNECTIONS", 1),
            }),
            _ if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required in production but not set"
                )));
            }
            _ => None,
        };

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "credit-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database,
            billing: BillingConfig {
                costs: FixedCosts::new(
                    parse_env("BILLING_FRAME_PROMPT_CREDITS", DEFAULT_FRAME_PROMPT_CREDITS),
                    parse_env(
                        "BILLING_IMAGE_GENERATION_CREDITS",
                        DEFAULT_IMAGE_GENERATION_CREDITS,
                    ),
                ),
                default_text_model: env::var("BILLING_DEFAULT_TEXT_MODEL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                prompt_language: PromptLanguage::parse(
                    &env::var("PROMPT_LANGUAGE").unwrap_or_default(),
                ),
            },
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
