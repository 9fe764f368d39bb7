//! Provider config management scoped by owner, plus the pricing overview.

use crate::error::CreditError;
use crate::models::{
    ConfigOwner, NewProviderConfig, ProviderConfig, ProviderConfigView, ServiceType,
    UpdateProviderConfig, PLATFORM_OWNER_ID,
};
use crate::services::resolver::ConfigResolver;
use crate::services::store::CreditStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Resolved price for one service type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingItem {
    pub service_type: ServiceType,
    pub config_id: i64,
    pub model: String,
    pub credit_cost: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricingOverview {
    pub items: Vec<PricingItem>,
    pub user_configs: Vec<ProviderConfigView>,
    pub platform_configs: Vec<ProviderConfigView>,
}

/// User id 0 is the platform's owner id in storage.
fn check_owner(owner: ConfigOwner) -> Result<(), CreditError> {
    match owner {
        ConfigOwner::User(PLATFORM_OWNER_ID) => Err(CreditError::InvalidInput(format!(
            "user id {} is reserved for platform configs",
            PLATFORM_OWNER_ID
        ))),
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct ProviderConfigService {
    store: Arc<dyn CreditStore>,
    resolver: ConfigResolver,
}

impl ProviderConfigService {
    pub fn new(store: Arc<dyn CreditStore>, resolver: ConfigResolver) -> Self {
        Self { store, resolver }
    }

    #[instrument(skip(self, input), fields(owner = ?owner, service_type = %input.service_type))]
    pub async fn create(
        &self,
        owner: ConfigOwner,
        input: &NewProviderConfig,
    ) -> Result<ProviderConfig, CreditError> {
        check_owner(owner)?;
        if input.credit_cost < 0 {
            return Err(CreditError::InvalidAmount(input.credit_cost));
        }
        let config = self.store.create_config(owner, input).await?;
        info!(
            config_id = config.config_id,
            owner_user_id = owner.owner_id(),
            "Provider config created"
        );
        Ok(config)
    }

    /// All configs of exactly one owner scope, priority desc then id asc.
    pub async fn list(
        &self,
        owner: ConfigOwner,
        service_type: Option<ServiceType>,
    ) -> Result<Vec<ProviderConfig>, CreditError> {
        check_owner(owner)?;
        self.store.list_configs(owner, service_type, false).await
    }

    pub async fn list_platform_configs(
        &self,
        service_type: Option<ServiceType>,
    ) -> Result<Vec<ProviderConfig>, CreditError> {
        self.list(ConfigOwner::Platform, service_type).await
    }

    pub async fn list_user_configs(
        &self,
        user_id: i64,
        service_type: Option<ServiceType>,
    ) -> Result<Vec<ProviderConfig>, CreditError> {
        self.list(ConfigOwner::User(user_id), service_type).await
    }

    #[instrument(skip(self, patch), fields(owner = ?owner))]
    pub async fn update(
        &self,
        owner: ConfigOwner,
        config_id: i64,
        patch: &UpdateProviderConfig,
    ) -> Result<ProviderConfig, CreditError> {
        check_owner(owner)?;
        if let Some(cost) = patch.credit_cost.filter(|c| *c < 0) {
            return Err(CreditError::InvalidAmount(cost));
        }
        let config = self
            .store
            .update_config(owner, config_id, patch)
            .await?
            .ok_or_else(|| CreditError::NotFound(format!("provider config {}", config_id)))?;
        info!(config_id = config_id, "Provider config updated");
        Ok(config)
    }

    #[instrument(skip(self), fields(owner = ?owner))]
    pub async fn delete(&self, owner: ConfigOwner, config_id: i64) -> Result<(), CreditError> {
        check_owner(owner)?;
        if !self.store.delete_config(owner, config_id).await? {
            return Err(CreditError::NotFound(format!(
                "provider config {}",
                config_id
            )));
        }
        info!(config_id = config_id, "Provider config deleted");
        Ok(())
    }

    pub async fn default_platform_config(
        &self,
        service_type: ServiceType,
    ) -> Result<Option<ProviderConfig>, CreditError> {
        self.resolver.default_config(service_type).await
    }

    /// Effective price per service type for `user_id`, with both config scopes.
    #[instrument(skip(self))]
    pub async fn pricing_overview(&self, user_id: i64) -> Result<PricingOverview, CreditError> {
        let mut items = Vec::new();
        for service_type in ServiceType::ALL {
            match self.resolver.resolve_price(service_type, "", user_id).await {
                Ok(quote) => items.push(PricingItem {
                    service_type,
                    config_id: quote.pricing_config_id.unwrap_or(quote.execution.config.config_id),
                    model: quote.execution.model,
                    credit_cost: quote.credit_cost,
                }),
                Err(CreditError::NoConfigFound { .. }) => {
                    warn!(service_type = %service_type, "No provider config for pricing overview");
                }
                Err(e) => return Err(e),
            }
        }

        let user_configs = self.list_user_configs(user_id, None).await?;
        let platform_configs = self.list_platform_configs(None).await?;

        Ok(PricingOverview {
            items,
            user_configs: user_configs.iter().map(ProviderConfigView::from).collect(),
            platform_configs: platform_configs
                .iter()
                .map(ProviderConfigView::from)
                .collect(),
        })
    }
}
