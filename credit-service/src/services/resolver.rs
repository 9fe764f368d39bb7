//! Provider config resolution.
//!
//! Selection answers "which config executes this request"; pricing answers
//! "what does it cost". User-owned configs win selection but never pricing:
//! the price always comes from platform configs for the model actually used.
//! Both are pure functions over config lists; [`ConfigResolver`] only loads
//! the two ownership scopes and calls them.

use crate::error::CreditError;
use crate::models::{ConfigOwner, ProviderConfig, ServiceType};
use crate::services::store::CreditStore;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, instrument};

/// The config a request executes against and the model it will use.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionChoice {
    pub config: ProviderConfig,
    pub model: String,
}

/// Execution choice plus the platform price for its model.
#[derive(Debug, Clone, Serialize)]
pub struct PriceQuote {
    pub execution: ExecutionChoice,
    pub credit_cost: i64,
    /// Platform config the price was taken from; `None` means the call is free.
    pub pricing_config_id: Option<i64>,
}

impl PriceQuote {
    pub fn model(&self) -> &str {
        &self.execution.model
    }
}

fn usable(config: &ProviderConfig, owner: ConfigOwner, service_type: ServiceType) -> bool {
    config.owner == owner && config.service_type == service_type && config.is_active
}

/// Higher priority first, then lowest id.
fn by_priority(a: &&ProviderConfig, b: &&ProviderConfig) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then(a.config_id.cmp(&b.config_id))
}

fn best<'a>(
    configs: &'a [ProviderConfig],
    owner: ConfigOwner,
    service_type: ServiceType,
    extra: impl Fn(&ProviderConfig) -> bool,
) -> Option<&'a ProviderConfig> {
    configs
        .iter()
        .filter(|c| usable(c, owner, service_type) && extra(c))
        .min_by(by_priority)
}

/// Platform default for a service type: `is_default` first, then priority,
/// then lowest id.
pub fn default_platform_config(
    platform_configs: &[ProviderConfig],
    service_type: ServiceType,
) -> Option<&ProviderConfig> {
    platform_configs
        .iter()
        .filter(|c| usable(c, ConfigOwner::Platform, service_type))
        .min_by(|a, b| b.is_default.cmp(&a.is_default).then(by_priority(a, b)))
}

/// Pick the config and model a request executes against.
pub fn select_for_execution(
    user_id: i64,
    user_configs: &[ProviderConfig],
    platform_configs: &[ProviderConfig],
    service_type: ServiceType,
    model_hint: &str,
) -> Result<ExecutionChoice, CreditError> {
    let owner = ConfigOwner::User(user_id);
    let hint = model_hint.trim();

    if !hint.is_empty() {
        let config = best(user_configs, owner, service_type, |c| c.serves_model(hint))
            .or_else(|| {
                best(platform_configs, ConfigOwner::Platform, service_type, |c| {
                    c.serves_model(hint)
                })
            })
            .ok_or_else(|| CreditError::NoConfigFound {
                service_type,
                model: Some(hint.to_string()),
            })?;
        return Ok(ExecutionChoice {
            config: config.clone(),
            model: hint.to_string(),
        });
    }

    let config = best(user_configs, owner, service_type, |_| true)
        .or_else(|| default_platform_config(platform_configs, service_type))
        .ok_or(CreditError::NoConfigFound {
            service_type,
            model: None,
        })?;

    Ok(ExecutionChoice {
        model: config.primary_model().unwrap_or_default().to_string(),
        config: config.clone(),
    })
}

/// Platform price for `model`: `(credit_cost, pricing_config_id)`.
///
/// An exact platform match with a positive cost wins. Otherwise the
/// highest-priority positively priced platform config for the service type
/// applies; if there is none the call is free.
pub fn select_price(
    platform_configs: &[ProviderConfig],
    service_type: ServiceType,
    model: &str,
) -> (i64, Option<i64>) {
    let model = model.trim();
    let exact = if model.is_empty() {
        None
    } else {
        best(platform_configs, ConfigOwner::Platform, service_type, |c| {
            c.serves_model(model)
        })
    };

    if let Some(config) = exact.filter(|c| c.credit_cost > 0) {
        return (config.credit_cost, Some(config.config_id));
    }

    best(platform_configs, ConfigOwner::Platform, service_type, |c| {
        c.credit_cost > 0
    })
    .map_or((0, None), |c| (c.credit_cost, Some(c.config_id)))
}

#[derive(Clone)]
pub struct ConfigResolver {
    store: Arc<dyn CreditStore>,
}

impl ConfigResolver {
    pub fn new(store: Arc<dyn CreditStore>) -> Self {
        Self { store }
    }

    async fn scopes(
        &self,
        user_id: i64,
        service_type: ServiceType,
    ) -> Result<(Vec<ProviderConfig>, Vec<ProviderConfig>), CreditError> {
        let user_configs = self
            .store
            .list_configs(ConfigOwner::User(user_id), Some(service_type), true)
            .await?;
        let platform_configs = self
            .store
            .list_configs(ConfigOwner::Platform, Some(service_type), true)
            .await?;
        Ok((user_configs, platform_configs))
    }

    #[instrument(skip(self))]
    pub async fn resolve_for_execution(
        &self,
        service_type: ServiceType,
        model_hint: &str,
        user_id: i64,
    ) -> Result<ExecutionChoice, CreditError> {
        let (user_configs, platform_configs) = self.scopes(user_id, service_type).await?;
        select_for_execution(
            user_id,
            &user_configs,
            &platform_configs,
            service_type,
            model_hint,
        )
    }

    #[instrument(skip(self))]
    pub async fn resolve_price(
        &self,
        service_type: ServiceType,
        model_hint: &str,
        user_id: i64,
    ) -> Result<PriceQuote, CreditError> {
        let (user_configs, platform_configs) = self.scopes(user_id, service_type).await?;
        let execution = select_for_execution(
            user_id,
            &user_configs,
            &platform_configs,
            service_type,
            model_hint,
        )?;
        let (credit_cost, pricing_config_id) =
            select_price(&platform_configs, service_type, &execution.model);

        debug!(
            config_id = execution.config.config_id,
            model = %execution.model,
            credit_cost = credit_cost,
            "Resolved price"
        );

        Ok(PriceQuote {
            execution,
            credit_cost,
            pricing_config_id,
        })
    }

    /// Platform default config for a service type.
    pub async fn default_config(
        &self,
        service_type: ServiceType,
    ) -> Result<Option<ProviderConfig>, CreditError> {
        let platform_configs = self
            .store
            .list_configs(ConfigOwner::Platform, Some(service_type), true)
            .await?;
        Ok(default_platform_config(&platform_configs, service_type).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use secrecy::Secret;

    fn config(
        id: i64,
        owner: ConfigOwner,
        model: &str,
        priority: i32,
        cost: i64,
    ) -> ProviderConfig {
        ProviderConfig {
            config_id: id,
            owner,
            service_type: ServiceType::Text,
            provider: "openai".to_string(),
            name: format!("cfg-{}", id),
            base_url: "https://api.example.com".to_string(),
            secret: Secret::new("secret".to_string()),
            models: vec![model.to_string()],
            priority,
            is_default: false,
            is_active: true,
            credit_cost: cost,
            settings: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    const USER: i64 = 7;

    #[test]
    fn hint_prefers_user_config_regardless_of_priority() {
        let users = vec![config(1, ConfigOwner::User(USER), "gpt-4o", 1, 0)];
        let platform = vec![config(2, ConfigOwner::Platform, "gpt-4o", 100, 3)];

        let choice =
            select_for_execution(USER, &users, &platform, ServiceType::Text, "gpt-4o").unwrap();
        assert_eq!(choice.config.config_id, 1);
        assert_eq!(choice.model, "gpt-4o");
    }

    #[test]
    fn hint_falls_back_to_platform_then_fails() {
        let users = vec![config(1, ConfigOwner::User(USER), "mine", 1, 0)];
        let platform = vec![config(2, ConfigOwner::Platform, "gpt-4o", 1, 3)];

        let choice =
            select_for_execution(USER, &users, &platform, ServiceType::Text, "gpt-4o").unwrap();
        assert_eq!(choice.config.config_id, 2);

        let err = select_for_execution(USER, &users, &platform, ServiceType::Text, "unknown")
            .unwrap_err();
        assert!(matches!(err, CreditError::NoConfigFound { model: Some(ref m), .. } if m == "unknown"));
    }

    #[test]
    fn no_hint_uses_highest_priority_user_config_with_lowest_id_tiebreak() {
        let users = vec![
            config(3, ConfigOwner::User(USER), "b", 5, 0),
            config(2, ConfigOwner::User(USER), "a", 5, 0),
            config(1, ConfigOwner::User(USER), "low", 1, 0),
        ];
        let choice = select_for_execution(USER, &users, &[], ServiceType::Text, "").unwrap();
        assert_eq!(choice.config.config_id, 2);
        assert_eq!(choice.model, "a");
    }

    #[test]
    fn no_hint_falls_back_to_platform_default() {
        let mut flagged = config(2, ConfigOwner::Platform, "default-model", 1, 2);
        flagged.is_default = true;
        let platform = vec![config(1, ConfigOwner::Platform, "other", 50, 2), flagged];

        let choice = select_for_execution(USER, &[], &platform, ServiceType::Text, "").unwrap();
        assert_eq!(choice.config.config_id, 2);
        assert_eq!(choice.model, "default-model");
    }

    #[test]
    fn selection_ignores_inactive_foreign_and_other_service_configs() {
        let mut inactive = config(1, ConfigOwner::User(USER), "m", 9, 0);
        inactive.is_active = false;
        let foreign = config(2, ConfigOwner::User(USER + 1), "m", 9, 0);
        let mut image = config(3, ConfigOwner::User(USER), "m", 9, 0);
        image.service_type = ServiceType::Image;

        let users = vec![inactive, foreign, image];
        let err = select_for_execution(USER, &users, &[], ServiceType::Text, "m").unwrap_err();
        assert!(matches!(err, CreditError::NoConfigFound { .. }));
    }

    #[test]
    fn price_uses_exact_platform_model() {
        let platform = vec![
            config(1, ConfigOwner::Platform, "cheap", 10, 1),
            config(2, ConfigOwner::Platform, "premium", 1, 8),
        ];
        assert_eq!(
            select_price(&platform, ServiceType::Text, "premium"),
            (8, Some(2))
        );
    }

    #[test]
    fn zero_cost_exact_match_falls_back_to_positive_price() {
        let platform = vec![
            config(1, ConfigOwner::Platform, "placeholder", 100, 0),
            config(2, ConfigOwner::Platform, "standard", 5, 4),
            config(3, ConfigOwner::Platform, "other", 1, 9),
        ];
        assert_eq!(
            select_price(&platform, ServiceType::Text, "placeholder"),
            (4, Some(2))
        );
        assert_eq!(
            select_price(&platform, ServiceType::Text, "unknown"),
            (4, Some(2))
        );
    }

    #[test]
    fn price_is_zero_without_positive_platform_configs() {
        let platform = vec![config(1, ConfigOwner::Platform, "free", 1, 0)];
        assert_eq!(select_price(&platform, ServiceType::Text, "free"), (0, None));
    }

    #[test]
    fn price_never_reads_user_owned_configs() {
        let mixed = vec![
            config(1, ConfigOwner::User(USER), "gpt-4o", 100, 1),
            config(2, ConfigOwner::Platform, "gpt-4o", 1, 6),
        ];
        assert_eq!(select_price(&mixed, ServiceType::Text, "gpt-4o"), (6, Some(2)));

        let only_user = vec![config(1, ConfigOwner::User(USER), "gpt-4o", 100, 1)];
        assert_eq!(select_price(&only_user, ServiceType::Text, "gpt-4o"), (0, None));
    }
}
