//! services/api/src/pipeline/gateway.rs
//!
//! The provider gateway: decides which backend and model serve a request and
//! hands out the matching `ExamWriter`. Built once at startup and shared.

use crate::adapters::{GeminiExamAdapter, QwenExamAdapter};
use crate::config::Config;
use mock_exam_core::domain::AiProvider;
use mock_exam_core::ports::{ExamWriter, PortError, PortResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Process-level provider defaults, usually read from the environment.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub default_provider: Option<String>,
    pub openai_default_model: Option<String>,
    pub qwen_default_model: Option<String>,
    pub gemini_default_model: Option<String>,
}

impl ProviderSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_provider: config.ai_provider.clone(),
            openai_default_model: config.openai_default_model.clone(),
            qwen_default_model: config.qwen_default_model.clone(),
            gemini_default_model: config.gemini_default_model.clone(),
        }
    }
}

/// Maps each provider to the writer that speaks its protocol.
pub struct ProviderRegistry {
    settings: ProviderSettings,
    writers: HashMap<AiProvider, Arc<dyn ExamWriter>>,
}

impl ProviderRegistry {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            writers: HashMap::new(),
        }
    }

    /// Registers a writer for every provider whose credentials are configured.
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let mut registry = Self::new(ProviderSettings::from_config(config));

        if let Some(key) = &config.qwen_api_key {
            registry = registry.with_writer(
                AiProvider::Qwen,
                Arc::new(QwenExamAdapter::new(
                    http.clone(),
                    key.clone(),
                    config.qwen_base_url.clone(),
                )),
            );
        }
        if let Some(key) = &config.gemini_api_key {
            registry = registry.with_writer(
                AiProvider::Gemini,
                Arc::new(GeminiExamAdapter::new(http, key.clone())),
            );
        }

        info!(
            "Exam providers ready: {:?} (default: {})",
            registry.writers.keys().collect::<Vec<_>>(),
            registry.resolve_provider(None)
        );
        registry
    }

    pub fn with_writer(mut self, provider: AiProvider, writer: Arc<dyn ExamWriter>) -> Self {
        self.writers.insert(provider, writer);
        self
    }

    /// Request value, then `AI_PROVIDER`, then the hard-coded fallback.
    pub fn resolve_provider(&self, requested: Option<&str>) -> AiProvider {
        AiProvider::resolve(requested, self.settings.default_provider.as_deref())
    }

    /// Explicit override, then the provider's configured default, then a fixed model id.
    pub fn resolve_model(&self, provider: AiProvider, requested: Option<&str>) -> String {
        if let Some(model) = requested.map(str::trim).filter(|m| !m.is_empty()) {
            return model.to_string();
        }
        let (configured, fallback) = match provider {
            AiProvider::OpenAi => (&self.settings.openai_default_model, "gpt-4o-mini"),
            AiProvider::Qwen => (&self.settings.qwen_default_model, "qwen-plus"),
            AiProvider::Gemini => (&self.settings.gemini_default_model, "gemini-1.5-flash"),
        };
        configured.clone().unwrap_or_else(|| fallback.to_string())
    }

    pub fn writer(&self, provider: AiProvider) -> PortResult<Arc<dyn ExamWriter>> {
        let missing_credentials = match provider {
            AiProvider::OpenAi => {
                return Err(PortError::Configuration(
                    "The configured model cannot read PDF/PPT attachments directly; \
                     set AI_PROVIDER to qwen or gemini."
                        .to_string(),
                ))
            }
            AiProvider::Qwen => {
                "QWEN_API_KEY or DASHSCOPE_API_KEY is not configured; cannot call the Qwen API."
            }
            AiProvider::Gemini => "GEMINI_API_KEY is not configured; cannot call the Gemini API.",
        };

        self.writers
            .get(&provider)
            .cloned()
            .ok_or_else(|| PortError::Configuration(missing_credentials.to_string()))
    }
}
