//! Error types returned by [`GreyNoiseClient`](super::GreyNoiseClient).

use reqwest::StatusCode;
use thiserror::Error;

use super::transport::TransportError;

/// Errors that can occur when calling the GreyNoise API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (connection, timeout, TLS).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The API responded 404 for the requested entity.
    #[error("not found")]
    NotFound,

    /// The API responded with a status other than the one the operation expects.
    #[error("invalid status code: {}, expected: {}", .actual.as_u16(), .expected.as_u16())]
    UnexpectedStatus {
        /// Status the operation expects on success.
        expected: StatusCode,
        /// Status the API actually returned.
        actual: StatusCode,
    },

    /// A required input field was empty. Raised before any request is issued.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// An input field holds a value outside its allowed set.
    #[error("{field} is invalid: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The response body was not valid JSON for the expected type.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request was cancelled by the caller before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// The request URL could not be built.
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    pub(crate) fn unexpected_status(expected: StatusCode, actual: StatusCode) -> Self {
        Self::UnexpectedStatus { expected, actual }
    }

    pub(crate) fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// The HTTP status carried by the error, if the API responded at all.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::NotFound => Some(StatusCode::NOT_FOUND),
            Self::UnexpectedStatus { actual, .. } => Some(*actual),
            _ => None,
        }
    }

    /// Whether the API reported the entity as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Whether the error was raised locally, before any request was sent.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingField(_) | Self::InvalidField { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_status_display() {
        let err = ClientError::unexpected_status(StatusCode::OK, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "invalid status code: 500, expected: 200");
        assert_eq!(err.status_code(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_validation_errors() {
        let err = ClientError::MissingField("filter");
        assert_eq!(err.to_string(), "filter is required");
        assert!(err.is_validation());
        assert_eq!(err.status_code(), None);

        let err = ClientError::invalid_field("sort_by", "unknown");
        assert_eq!(err.to_string(), "sort_by is invalid: unknown");
        assert!(err.is_validation());
    }

    #[test]
    fn test_not_found() {
        let err = ClientError::NotFound;
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), Some(StatusCode::NOT_FOUND));
    }
}
