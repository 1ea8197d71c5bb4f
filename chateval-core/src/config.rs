// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration for the evaluation harness
//!
//! Two concerns live here:
//! - [`ModelConfig`]: the judge deployment and the credential used to call it.
//!   Credential selection is an explicit rule ([`CredentialSettings::resolve`])
//!   instead of ad-hoc environment inspection.
//! - [`RunSettings`]: optional TOML file with model and run defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// OAuth scope requested for Azure AD tokens
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

/// Azure OpenAI REST API version used when none is configured
pub const DEFAULT_API_VERSION: &str = "2024-02-01";

pub const DEFAULT_EVALUATION_NAME: &str = "eval-sdk-dev";
pub const DEFAULT_EVALUATION_MODEL: &str = "gpt-35-turbo";

pub const API_KEY_ENV: &str = "AZURE_OPENAI_KEY";
pub const ENDPOINT_ENV: &str = "AZURE_OPENAI_ENDPOINT";
pub const AD_TOKEN_ENV: &str = "AZURE_OPENAI_AD_TOKEN";

/// Errors raised while building configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No credential available: set AZURE_OPENAI_KEY or provide an Azure AD token")]
    NoCredential,

    #[error("Token provider failed: {0}")]
    TokenProvider(String),

    #[error("Missing Azure OpenAI endpoint (set AZURE_OPENAI_ENDPOINT or [model].endpoint)")]
    MissingEndpoint,

    #[error("Failed to read settings {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Credential attached to judge requests
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Sent as the `api-key` header
    ApiKey(String),
    /// Sent as `Authorization: Bearer <token>`
    BearerToken(String),
}

impl Credential {
    pub fn is_api_key(&self) -> bool {
        matches!(self, Credential::ApiKey(_))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Credential::BearerToken(_) => f.write_str("BearerToken(<redacted>)"),
        }
    }
}

/// Source of Azure AD bearer tokens
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self, scope: &str) -> Result<String, ConfigError>;
}

/// Token provider that always returns the same token
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn bearer_token(&self, _scope: &str) -> Result<String, ConfigError> {
        Ok(self.token.clone())
    }
}

/// Reads a pre-acquired token from `AZURE_OPENAI_AD_TOKEN`
#[derive(Debug, Default)]
pub struct EnvTokenProvider;

impl TokenProvider for EnvTokenProvider {
    fn bearer_token(&self, scope: &str) -> Result<String, ConfigError> {
        match std::env::var(AD_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(ConfigError::TokenProvider(format!(
                "{AD_TOKEN_ENV} is not set (scope {scope})"
            ))),
        }
    }
}

/// Inputs to credential selection
#[derive(Debug, Clone, Default)]
pub struct CredentialSettings {
    pub api_key: Option<String>,
}

impl CredentialSettings {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok(),
        }
    }

    /// Pick the credential for judge requests.
    ///
    /// A non-empty API key always wins and logs a warning, since token-based
    /// auth is preferred. Otherwise the token provider is asked for a token
    /// scoped to Cognitive Services. With neither, resolution fails.
    pub fn resolve(
        &self,
        token_provider: Option<&dyn TokenProvider>,
    ) -> Result<Credential, ConfigError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            warn!("Using key-based authentication; Azure AD authentication is recommended instead");
            return Ok(Credential::ApiKey(key.to_string()));
        }

        match token_provider {
            Some(provider) => {
                info!("Using Azure AD authentication");
                let token = provider.bearer_token(COGNITIVE_SERVICES_SCOPE)?;
                Ok(Credential::BearerToken(token))
            }
            None => Err(ConfigError::NoCredential),
        }
    }
}

/// Judge model deployment configuration
///
/// Built once before a run and shared read-only by every evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub credential: Credential,
    pub request_timeout_secs: Option<u64>,
}

impl ModelConfig {
    pub fn new(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            deployment: deployment.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            credential,
            request_timeout_secs: None,
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Resolve a full model config. `AZURE_OPENAI_ENDPOINT` takes precedence
    /// over the settings file endpoint.
    pub fn resolve(
        deployment: impl Into<String>,
        settings: &ModelSettings,
        credentials: &CredentialSettings,
        token_provider: Option<&dyn TokenProvider>,
    ) -> Result<Self, ConfigError> {
        Self::resolve_with_env_endpoint(
            std::env::var(ENDPOINT_ENV).ok(),
            deployment,
            settings,
            credentials,
            token_provider,
        )
    }

    fn resolve_with_env_endpoint(
        env_endpoint: Option<String>,
        deployment: impl Into<String>,
        settings: &ModelSettings,
        credentials: &CredentialSettings,
        token_provider: Option<&dyn TokenProvider>,
    ) -> Result<Self, ConfigError> {
        let endpoint = env_endpoint
            .filter(|e| !e.trim().is_empty())
            .or_else(|| settings.endpoint.clone())
            .filter(|e| !e.trim().is_empty())
            .ok_or(ConfigError::MissingEndpoint)?;
        let credential = credentials.resolve(token_provider)?;

        let mut config = Self::new(endpoint, deployment, credential)
            .with_request_timeout_secs(settings.request_timeout_secs);
        if let Some(api_version) = &settings.api_version {
            config = config.with_api_version(api_version.clone());
        }
        Ok(config)
    }
}

/// What to do when an evaluator fails on a row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorErrorPolicy {
    /// Abort the whole run
    #[default]
    Abort,
    /// Leave the metric's scores absent for that row and continue
    Skip,
}

/// `[model]` section of the settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// `[run]` section of the settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub evaluation_name: Option<String>,
    pub output_path: Option<PathBuf>,
    pub studio_base_url: Option<String>,
    pub on_evaluator_error: EvaluatorErrorPolicy,
}

/// Settings file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub model: ModelSettings,
    pub run: RunOptions,
}

impl RunSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate process environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct FailingProvider;

    impl TokenProvider for FailingProvider {
        fn bearer_token(&self, _scope: &str) -> Result<String, ConfigError> {
            Err(ConfigError::TokenProvider("no login session".to_string()))
        }
    }

    #[test]
    fn test_api_key_wins_over_token() {
        let settings = CredentialSettings {
            api_key: Some("secret-key".to_string()),
        };
        let provider = StaticTokenProvider::new("aad-token");

        let credential = settings.resolve(Some(&provider)).unwrap();
        assert_eq!(credential, Credential::ApiKey("secret-key".to_string()));
    }

    #[test]
    fn test_token_used_without_key() {
        let settings = CredentialSettings {
            api_key: Some("   ".to_string()),
        };
        let provider = StaticTokenProvider::new("aad-token");

        let credential = settings.resolve(Some(&provider)).unwrap();
        assert_eq!(credential, Credential::BearerToken("aad-token".to_string()));
    }

    #[test]
    fn test_no_credential() {
        let settings = CredentialSettings::default();
        assert!(matches!(
            settings.resolve(None),
            Err(ConfigError::NoCredential)
        ));
        assert!(matches!(
            settings.resolve(Some(&FailingProvider)),
            Err(ConfigError::TokenProvider(_))
        ));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let rendered = format!("{:?}", Credential::ApiKey("secret-key".to_string()));
        assert!(!rendered.contains("secret-key"));
    }

    #[test]
    fn test_model_config_from_settings() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let settings = ModelSettings {
            endpoint: Some("https://example.openai.azure.com".to_string()),
            api_version: Some("2024-06-01".to_string()),
            request_timeout_secs: Some(30),
            ..Default::default()
        };
        let credentials = CredentialSettings {
            api_key: Some("k".to_string()),
        };

        let config = ModelConfig::resolve("gpt-4o", &settings, &credentials, None).unwrap();
        assert_eq!(config.deployment, "gpt-4o");
        assert_eq!(config.api_version, "2024-06-01");
        assert_eq!(config.request_timeout_secs, Some(30));
        assert!(config.credential.is_api_key());
    }

    #[test]
    fn test_env_endpoint_wins_over_settings_file() {
        let settings = ModelSettings {
            endpoint: Some("https://from-file.example".to_string()),
            ..Default::default()
        };
        let credentials = CredentialSettings {
            api_key: Some("k".to_string()),
        };

        let config = ModelConfig::resolve_with_env_endpoint(
            Some("https://from-env.example".to_string()),
            "judge",
            &settings,
            &credentials,
            None,
        )
        .unwrap();
        assert_eq!(config.endpoint, "https://from-env.example");

        let config = ModelConfig::resolve_with_env_endpoint(
            Some("  ".to_string()),
            "judge",
            &settings,
            &credentials,
            None,
        )
        .unwrap();
        assert_eq!(config.endpoint, "https://from-file.example");

        let missing = ModelConfig::resolve_with_env_endpoint(
            None,
            "judge",
            &ModelSettings::default(),
            &credentials,
            None,
        );
        assert!(matches!(missing, Err(ConfigError::MissingEndpoint)));
    }

    #[test]
    fn test_resolve_reads_endpoint_from_environment() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let previous = std::env::var(ENDPOINT_ENV).ok();
        std::env::set_var(ENDPOINT_ENV, "https://from-env.example");

        let settings = ModelSettings {
            endpoint: Some("https://from-file.example".to_string()),
            ..Default::default()
        };
        let credentials = CredentialSettings {
            api_key: Some("k".to_string()),
        };
        let result = ModelConfig::resolve("judge", &settings, &credentials, None);

        match previous {
            Some(value) => std::env::set_var(ENDPOINT_ENV, value),
            None => std::env::remove_var(ENDPOINT_ENV),
        }
        assert_eq!(result.unwrap().endpoint, "https://from-env.example");
    }

    #[test]
    fn test_parse_settings() {
        let settings = RunSettings::from_toml_str(
            r#"
[model]
endpoint = "https://example.openai.azure.com"
deployment = "gpt-4o-mini"

[run]
evaluation_name = "nightly"
studio_base_url = "https://studio.example.com"
on_evaluator_error = "skip"
"#,
        )
        .unwrap();

        assert_eq!(settings.model.deployment.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(settings.run.evaluation_name.as_deref(), Some("nightly"));
        assert_eq!(settings.run.on_evaluator_error, EvaluatorErrorPolicy::Skip);
        assert_eq!(settings.run.output_path, None);
    }

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings = RunSettings::from_toml_str("").unwrap();
        assert_eq!(settings, RunSettings::default());
        assert_eq!(settings.run.on_evaluator_error, EvaluatorErrorPolicy::Abort);
    }
}
