//! Provider configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::ProviderError;

/// Environment variable consulted when `api_key` is not configured.
pub const API_KEY_ENV_VAR: &str = "GN_API_KEY";

/// Configuration block accepted by [`crate::GreyNoiseProvider::configure`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// GreyNoise API key.
    pub api_key: Option<String>,
    /// Override for the API base URL.
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Decode the configuration value sent by the host. `null` is an empty configuration.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|err| ProviderError::Configuration(err.to_string()))
    }

    /// The configured key, or `env_key` when none is configured. Empty keys count as unset.
    pub fn api_key_or(&self, env_key: Option<String>) -> Option<String> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Some(key.to_string()),
            Some(_) => None,
            None => env_key.filter(|key| !key.is_empty()),
        }
    }

    /// The configured key, falling back to [`API_KEY_ENV_VAR`].
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key_or(std::env::var(API_KEY_ENV_VAR).ok())
    }

    /// The parsed base URL override, if any.
    pub fn base_url(&self) -> Result<Option<Url>, url::ParseError> {
        self.base_url.as_deref().map(Url::parse).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value() {
        let config = ProviderConfig::from_value(json!({
            "api_key": "secret",
            "base_url": "https://api.greynoise.io",
        }))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("secret"));

        assert_eq!(ProviderConfig::from_value(Value::Null).unwrap(), ProviderConfig::default());

        let err = ProviderConfig::from_value(json!({"api_key": 42})).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert_eq!(err.to_diagnostic().summary, "Provider configuration error");
    }

    #[test]
    fn test_api_key_fallback() {
        let config = ProviderConfig::default();
        assert_eq!(config.api_key_or(Some("from-env".into())).as_deref(), Some("from-env"));
        assert_eq!(config.api_key_or(Some(String::new())), None);
        assert_eq!(config.api_key_or(None), None);

        let config = ProviderConfig {
            api_key: Some("configured".into()),
            ..Default::default()
        };
        assert_eq!(config.api_key_or(Some("from-env".into())).as_deref(), Some("configured"));
    }

    #[test]
    fn test_base_url() {
        assert_eq!(ProviderConfig::default().base_url().unwrap(), None);

        let config = ProviderConfig {
            base_url: Some("http://localhost:8080".into()),
            ..Default::default()
        };
        assert_eq!(config.base_url().unwrap().unwrap().as_str(), "http://localhost:8080/");

        let config = ProviderConfig {
            base_url: Some("not a url".into()),
            ..Default::default()
        };
        assert!(config.base_url().is_err());
    }
}
