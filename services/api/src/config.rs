//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

const DEFAULT_QWEN_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,
    pub supabase_url: String,
    pub supabase_service_role_key: String,
    pub storage_bucket: String,
    pub ai_provider: Option<String>,
    pub openai_default_model: Option<String>,
    pub qwen_api_key: Option<String>,
    pub qwen_base_url: String,
    pub qwen_default_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_default_model: Option<String>,
    pub chrome_executable: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required("DATABASE_URL")?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = std::env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load Storage / Identity Settings ---
        let supabase_url = required("SUPABASE_URL")?.trim_end_matches('/').to_string();
        let supabase_service_role_key = required("SUPABASE_SERVICE_ROLE_KEY")?;
        let storage_bucket =
            optional("SUPABASE_STORAGE_BUCKET").unwrap_or_else(|| "course-assets".to_string());

        // --- Load Provider Settings (keys are optional) ---
        let ai_provider = optional("AI_PROVIDER");
        let openai_default_model = optional("OPENAI_DEFAULT_MODEL");
        let qwen_api_key = optional("QWEN_API_KEY").or_else(|| optional("DASHSCOPE_API_KEY"));
        let qwen_base_url = optional("QWEN_BASE_URL")
            .or_else(|| optional("DASHSCOPE_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_QWEN_BASE_URL.to_string());
        let qwen_default_model = optional("QWEN_DEFAULT_MODEL");
        let gemini_api_key = optional("GEMINI_API_KEY");
        let gemini_default_model = optional("GEMINI_DEFAULT_MODEL");

        let chrome_executable = optional("CHROME_EXECUTABLE").map(PathBuf::from);

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            supabase_url,
            supabase_service_role_key,
            storage_bucket,
            ai_provider,
            openai_default_model,
            qwen_api_key,
            qwen_base_url,
            qwen_default_model,
            gemini_api_key,
            gemini_default_model,
            chrome_executable,
        })
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    optional(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

/// Reads a variable, treating blank values as unset.
fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
