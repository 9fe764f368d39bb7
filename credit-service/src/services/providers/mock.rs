//! Mock provider implementations for testing.

use super::{AiCapability, ClientFactory, GenerationOutput, GenerationRequest, ProviderError};
use crate::models::ProviderConfig;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What a mock capability does when called.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Echo the prompt back.
    Echo,
    /// Return this text verbatim.
    Respond(String),
    /// Fail with an API error.
    Fail(String),
}

/// Mock AI capability for testing.
pub struct MockCapability {
    model: String,
    behavior: MockBehavior,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl AiCapability for MockCapability {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let text = match &self.behavior {
            MockBehavior::Echo => format!("Mock response for: {}", request.prompt),
            MockBehavior::Respond(text) => text.clone(),
            MockBehavior::Fail(msg) => return Err(ProviderError::ApiError(msg.clone())),
        };

        Ok(GenerationOutput {
            input_tokens: request.prompt.len() as i32 / 4,
            output_tokens: text.len() as i32 / 4,
            text,
        })
    }
}

/// Mock client factory. Models marked unavailable fail to build; every
/// other model gets a [`MockCapability`] with the factory's behavior.
pub struct MockClientFactory {
    behavior: MockBehavior,
    unavailable_models: HashSet<String>,
    built: Mutex<Vec<(i64, String)>>,
    calls: Arc<AtomicUsize>,
}

impl MockClientFactory {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            unavailable_models: HashSet::new(),
            built: Mutex::new(Vec::new()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_unavailable_model(mut self, model: impl Into<String>) -> Self {
        self.unavailable_models.insert(model.into());
        self
    }

    /// `(config_id, model)` of every client built so far.
    pub fn built(&self) -> Vec<(i64, String)> {
        self.built.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Total generation calls across all built clients.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ClientFactory for MockClientFactory {
    fn build(
        &self,
        config: &ProviderConfig,
        model: &str,
    ) -> Result<Arc<dyn AiCapability>, ProviderError> {
        if self.unavailable_models.contains(model) {
            return Err(ProviderError::NotConfigured(format!(
                "Mock client for model '{}' not available",
                model
            )));
        }

        if let Ok(mut built) = self.built.lock() {
            built.push((config.config_id, model.to_string()));
        }

        Ok(Arc::new(MockCapability {
            model: model.to_string(),
            behavior: self.behavior.clone(),
            calls: self.calls.clone(),
        }))
    }
}
