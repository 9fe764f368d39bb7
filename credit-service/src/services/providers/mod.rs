//! External AI capability abstraction.
//!
//! Billing only needs one contract from a provider: attempt a generation and
//! report success or failure. Concrete HTTP clients live outside this crate
//! and plug in through [`ClientFactory`].

pub mod mock;

use crate::error::CreditError;
use crate::models::ProviderConfig;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),
}

impl From<ProviderError> for CreditError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured(msg) => CreditError::ClientUnavailable(msg),
            ProviderError::ApiError(msg) => CreditError::Provider(msg),
        }
    }
}

/// Generation parameters for AI requests.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    /// Temperature (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// Maximum output tokens.
    pub max_tokens: Option<i32>,
}

/// One generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub params: GenerationParams,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.params.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: i32) -> Self {
        self.params.max_tokens = Some(max_tokens);
        self
    }
}

/// Result of a generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
}

/// A ready-to-call client bound to one config and model.
#[async_trait]
pub trait AiCapability: Send + Sync {
    /// Model this client calls.
    fn model(&self) -> &str;

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, ProviderError>;
}

/// Builds clients from provider configs. An error means the client is
/// unreachable for that config and model.
pub trait ClientFactory: Send + Sync {
    fn build(
        &self,
        config: &ProviderConfig,
        model: &str,
    ) -> Result<Arc<dyn AiCapability>, ProviderError>;
}

/// Factory used when no provider clients are registered: every build fails,
/// so billed calls are refunded and reported as unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledClientFactory;

impl ClientFactory for DisabledClientFactory {
    fn build(
        &self,
        config: &ProviderConfig,
        model: &str,
    ) -> Result<Arc<dyn AiCapability>, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "no client registered for provider '{}' (model '{}')",
            config.provider, model
        )))
    }
}
