//! Provider configuration model: credentials, candidate models and pricing
//! for one AI service type.

use super::ServiceType;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stored owner id meaning "no specific user".
pub const PLATFORM_OWNER_ID: i64 = 0;

/// Who a provider config belongs to. Platform and user scopes are a strict
/// partition: no query ever mixes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "scope", content = "user_id")]
pub enum ConfigOwner {
    Platform,
    User(i64),
}

impl ConfigOwner {
    pub fn from_owner_id(owner_user_id: i64) -> Self {
        if owner_user_id == PLATFORM_OWNER_ID {
            Self::Platform
        } else {
            Self::User(owner_user_id)
        }
    }

    pub fn owner_id(&self) -> i64 {
        match self {
            Self::Platform => PLATFORM_OWNER_ID,
            Self::User(id) => *id,
        }
    }

    pub fn is_platform(&self) -> bool {
        matches!(self, Self::Platform)
    }
}

/// Provider configuration. The secret never leaves the process through
/// serialization; use [`ProviderConfigView`] for outward representations.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderConfig {
    pub config_id: i64,
    pub owner: ConfigOwner,
    pub service_type: ServiceType,
    pub provider: String,
    pub name: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub secret: Secret<String>,
    pub models: Vec<String>,
    pub priority: i32,
    pub is_default: bool,
    pub is_active: bool,
    pub credit_cost: i64,
    pub settings: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl ProviderConfig {
    /// Whether this config lists `model` among its candidates.
    pub fn serves_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    /// First candidate model, used when the caller pins none.
    pub fn primary_model(&self) -> Option<&str> {
        self.models
            .iter()
            .map(|m| m.trim())
            .find(|m| !m.is_empty())
    }

    pub fn has_secret(&self) -> bool {
        !self.secret.expose_secret().is_empty()
    }
}

/// Database row shape for `provider_configs`.
#[derive(Debug, FromRow)]
pub(crate) struct ProviderConfigRow {
    pub config_id: i64,
    pub owner_user_id: i64,
    pub service_type: ServiceType,
    pub provider: String,
    pub name: String,
    pub base_url: String,
    pub secret: String,
    pub models: Vec<String>,
    pub priority: i32,
    pub is_default: bool,
    pub is_active: bool,
    pub credit_cost: i64,
    pub settings: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl From<ProviderConfigRow> for ProviderConfig {
    fn from(row: ProviderConfigRow) -> Self {
        Self {
            config_id: row.config_id,
            owner: ConfigOwner::from_owner_id(row.owner_user_id),
            service_type: row.service_type,
            provider: row.provider,
            name: row.name,
            base_url: row.base_url,
            secret: Secret::new(row.secret),
            models: row.models,
            priority: row.priority,
            is_default: row.is_default,
            is_active: row.is_active,
            credit_cost: row.credit_cost,
            settings: row.settings,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        }
    }
}

/// Input for creating a provider config.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProviderConfig {
    pub service_type: ServiceType,
    pub provider: String,
    pub name: String,
    pub base_url: String,
    pub secret: Secret<String>,
    pub models: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub credit_cost: i64,
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

fn default_active() -> bool {
    true
}

/// Partial update of a provider config. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProviderConfig {
    pub provider: Option<String>,
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub secret: Option<Secret<String>>,
    pub models: Option<Vec<String>>,
    pub priority: Option<i32>,
    pub is_default: Option<bool>,
    pub is_active: Option<bool>,
    pub credit_cost: Option<i64>,
    pub settings: Option<serde_json::Value>,
}

impl UpdateProviderConfig {
    /// Apply the patch to an in-memory config.
    pub fn apply_to(&self, config: &mut ProviderConfig) {
        if let Some(provider) = &self.provider {
            config.provider = provider.clone();
        }
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(secret) = &self.secret {
            config.secret = secret.clone();
        }
        if let Some(models) = &self.models {
            config.models = models.clone();
        }
        if let Some(priority) = self.priority {
            config.priority = priority;
        }
        if let Some(is_default) = self.is_default {
            config.is_default = is_default;
        }
        if let Some(is_active) = self.is_active {
            config.is_active = is_active;
        }
        if let Some(credit_cost) = self.credit_cost {
            config.credit_cost = credit_cost;
        }
        if let Some(settings) = &self.settings {
            config.settings = Some(settings.clone());
        }
    }
}

/// Client-safe view of a provider config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfigView {
    pub config_id: i64,
    pub owner: ConfigOwner,
    pub service_type: ServiceType,
    pub provider: String,
    pub name: String,
    pub base_url: String,
    pub api_key_set: bool,
    pub models: Vec<String>,
    pub priority: i32,
    pub is_default: bool,
    pub is_active: bool,
    pub credit_cost: i64,
    pub settings: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl From<&ProviderConfig> for ProviderConfigView {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            config_id: config.config_id,
            owner: config.owner,
            service_type: config.service_type,
            provider: config.provider.clone(),
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            api_key_set: config.has_secret(),
            models: config.models.clone(),
            priority: config.priority,
            is_default: config.is_default,
            is_active: config.is_active,
            credit_cost: config.credit_cost,
            settings: config.settings.clone(),
            created_utc: config.created_utc,
            updated_utc: config.updated_utc,
        }
    }
}
