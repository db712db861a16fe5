//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// Base URL of Gemini's OpenAI-compatible endpoint.
pub const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials and endpoint for the LLM provider.
#[derive(Clone, Debug)]
pub struct LlmCredentials {
    pub api_key: String,
    /// `None` means the provider's default endpoint.
    pub api_base: Option<String>,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub curriculum_model: String,
    pub tutor_model: String,
    pub quiz_model: String,
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
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Load Server and Storage Settings ---
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://tutor.db?mode=rwc".to_string());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());

        // --- Load API Keys (as optional) ---
        let openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty());
        let gemini_api_key = lookup("GEMINI_API_KEY").filter(|k| !k.is_empty());
        let llm_base_url = lookup("LLM_BASE_URL").filter(|u| !u.is_empty());

        // --- Load Model Settings ---
        let default_model = if openai_api_key.is_none() && gemini_api_key.is_some() {
            "gemini-2.5-flash"
        } else {
            "gpt-4o-mini"
        };
        let curriculum_model =
            lookup("CURRICULUM_MODEL").unwrap_or_else(|| default_model.to_string());
        let tutor_model = lookup("TUTOR_MODEL").unwrap_or_else(|| default_model.to_string());
        let quiz_model = lookup("QUIZ_MODEL").unwrap_or_else(|| default_model.to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            openai_api_key,
            gemini_api_key,
            llm_base_url,
            curriculum_model,
            tutor_model,
            quiz_model,
        })
    }

    /// Picks the provider credentials. An OpenAI key wins over a Gemini key.
    pub fn llm_credentials(&self) -> Result<LlmCredentials, ConfigError> {
        if let Some(api_key) = &self.openai_api_key {
            return Ok(LlmCredentials {
                api_key: api_key.clone(),
                api_base: self.llm_base_url.clone(),
            });
        }
        if let Some(api_key) = &self.gemini_api_key {
            return Ok(LlmCredentials {
                api_key: api_key.clone(),
                api_base: Some(
                    self.llm_base_url
                        .clone()
                        .unwrap_or_else(|| GEMINI_OPENAI_BASE.to_string()),
                ),
            });
        }
        Err(ConfigError::MissingVar(
            "OPENAI_API_KEY or GEMINI_API_KEY".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.bind_address.to_string(), "127.0.0.1:3000");
        assert_eq!(config.database_url, "sqlite://tutor.db?mode=rwc");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.tutor_model, "gpt-4o-mini");
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let err = Config::from_lookup(lookup(&[("RUST_LOG", "chatty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "RUST_LOG"));
    }

    #[test]
    fn gemini_key_uses_the_compatible_endpoint() {
        let config = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "g-key")])).unwrap();
        let credentials = config.llm_credentials().unwrap();

        assert_eq!(credentials.api_base.as_deref(), Some(GEMINI_OPENAI_BASE));
        assert_eq!(config.quiz_model, "gemini-2.5-flash");
    }

    #[test]
    fn missing_keys_fail_only_when_credentials_are_requested() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(matches!(
            config.llm_credentials(),
            Err(ConfigError::MissingVar(_))
        ));
    }
}
