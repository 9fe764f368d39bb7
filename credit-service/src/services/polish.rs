//! Billed script polishing: the reference caller of [`BillingOrchestrator`].

use crate::error::CreditError;
use crate::models::ServiceType;
use crate::services::billing::BillingOrchestrator;
use crate::services::providers::GenerationRequest;
use crate::services::skills::{normalize_polished_output, resolve_skill, PromptLanguage};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Last-resort text model when neither the caller nor the platform names one.
pub const DEFAULT_POLISH_TEXT_MODEL: &str = "doubao-seed-1-8-251228";

const POLISH_TEMPERATURE: f32 = 0.45;
const POLISH_MAX_TOKENS: i32 = 2600;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolishedScript {
    pub content: String,
    pub skill: String,
    pub model: String,
    pub credit_cost: i64,
}

#[derive(Clone)]
pub struct ScriptPolisher {
    billing: BillingOrchestrator,
    default_text_model: String,
    language: PromptLanguage,
}

impl ScriptPolisher {
    pub fn new(
        billing: BillingOrchestrator,
        default_text_model: Option<String>,
        language: PromptLanguage,
    ) -> Self {
        let default_text_model = default_text_model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_POLISH_TEXT_MODEL.to_string());
        Self {
            billing,
            default_text_model,
            language,
        }
    }

    /// Model to try first: the caller's model, else the platform default text
    /// config's first model, else the configured default.
    pub async fn resolve_model_hint(&self, requested_model: &str) -> Result<String, CreditError> {
        let requested = requested_model.trim();
        if !requested.is_empty() {
            return Ok(requested.to_string());
        }

        let platform_default = self
            .billing
            .resolver()
            .default_config(ServiceType::Text)
            .await?;
        if let Some(model) = platform_default.as_ref().and_then(|c| c.primary_model()) {
            return Ok(model.to_string());
        }

        Ok(self.default_text_model.clone())
    }

    /// Polish `content` with `skill`, charging `user_id` for the text call.
    /// The ledger detail is `"<detail_prefix>:<skill>"`.
    #[instrument(skip(self, content), fields(content_len = content.len()))]
    pub async fn polish(
        &self,
        user_id: i64,
        content: &str,
        model: &str,
        skill: &str,
        detail_prefix: &str,
    ) -> Result<PolishedScript, CreditError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CreditError::InvalidInput("empty content".to_string()));
        }

        let skill = resolve_skill(skill);
        let request = GenerationRequest::new(skill.user_prompt(self.language, content))
            .with_system_prompt(skill.system_prompt(self.language))
            .with_temperature(POLISH_TEMPERATURE)
            .with_max_tokens(POLISH_MAX_TOKENS);

        let model_hint = self.resolve_model_hint(model).await?;
        let detail = format!("{}:{}", detail_prefix, skill.name);

        let billed = self
            .billing
            .run(
                user_id,
                ServiceType::Text,
                model,
                &model_hint,
                &detail,
                |client, _model| async move {
                    let output = client
                        .generate(&request)
                        .await
                        .map_err(CreditError::from)?;
                    let polished = normalize_polished_output(&output.text);
                    if polished.is_empty() {
                        warn!("Polished content is empty");
                        return Err(CreditError::Provider(
                            "polished content is empty".to_string(),
                        ));
                    }
                    Ok::<_, CreditError>(polished)
                },
            )
            .await?;

        info!(
            user_id = user_id,
            skill_name = skill.name,
            model = %billed.model,
            length = billed.value.chars().count(),
            "Script polished"
        );

        Ok(PolishedScript {
            content: billed.value,
            skill: skill.name.to_string(),
            model: billed.model,
            credit_cost: billed.credit_cost,
        })
    }
}
