//! Errors surfaced at the host boundary.

use thiserror::Error;

use crate::client::ClientError;
use crate::schema::Diagnostic;

/// Errors returned by provider callbacks.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote entity does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Configuration or state failed local validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A resource or data source callback ran before `configure`.
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// The requested resource or data source type is not served by this provider.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// State could not be converted to or from its model.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The API call failed.
    #[error("API error: {0}")]
    Client(ClientError),

    /// Unexpected failure inside the provider.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// The error message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::NotConfigured(msg)
            | Self::UnknownResource(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::Serialization(err) => err.to_string(),
            Self::Client(err) => err.to_string(),
        }
    }

    /// Render the error as an error diagnostic with a summary matching its kind.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let summary = match self {
            Self::NotFound(_) => "Resource not found",
            Self::Validation(_) => "Invalid configuration",
            Self::Configuration(_) => "Provider configuration error",
            Self::NotConfigured(_) => "Provider not configured",
            Self::UnknownResource(_) => "Unknown resource type",
            Self::Serialization(_) => "State error",
            Self::Client(_) => "GreyNoise API error",
            Self::Internal(_) => "Internal provider error",
        };
        Diagnostic::error(summary).with_detail(self.message())
    }
}

impl From<ClientError> for ProviderError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound => {
                Self::NotFound("the API reported the entity as missing".into())
            },
            err if err.is_validation() => Self::Validation(err.to_string()),
            err => Self::Client(err),
        }
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        err.to_diagnostic()
    }
}
