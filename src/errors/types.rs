//! # Error Types
//!
//! Error taxonomy for Conjur configuration, authentication and secret retrieval.

/// Custom result type for Conjur credential operations
pub type Result<T> = std::result::Result<T, ConjurError>;

/// Main error type for the Conjur credential engine
#[derive(thiserror::Error, Debug)]
pub enum ConjurError {
    /// Invalid global policy or configuration, raised before any network call
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Neither the API-key nor the JWT flow had its inputs available
    #[error("No Conjur credentials available for account '{account}' at '{appliance_url}'")]
    NoCredentials { appliance_url: String, account: String },

    /// Non-200 response from the authenticate endpoint
    #[error("Error authenticating to Conjur [{status}]: {body}")]
    Auth { status: u16, body: String },

    /// Non-200 response from a secret or resource listing endpoint
    #[error("Error fetching from Conjur [{status}]: {body}")]
    SecretFetch { status: u16, body: String },

    /// Failure while rebuilding a credential directory
    #[error("Directory rebuild failed for '{context_key}': {message}")]
    DirectoryRebuild { context_key: String, message: String },

    /// Network-level failure below HTTP
    #[error("Transport error: {context}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// Undecodable response payload
    #[error("Serialization error: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ConjurError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a missing-credentials error
    pub fn no_credentials<U: Into<String>, A: Into<String>>(appliance_url: U, account: A) -> Self {
        Self::NoCredentials { appliance_url: appliance_url.into(), account: account.into() }
    }

    /// Create an authentication error from an upstream response
    pub fn auth<S: Into<String>>(status: u16, body: S) -> Self {
        Self::Auth { status, body: body.into() }
    }

    /// Create a secret fetch error from an upstream response
    pub fn secret_fetch<S: Into<String>>(status: u16, body: S) -> Self {
        Self::SecretFetch { status, body: body.into() }
    }

    /// Create a directory rebuild error
    pub fn directory_rebuild<K: Into<String>, S: Into<String>>(context_key: K, message: S) -> Self {
        Self::DirectoryRebuild { context_key: context_key.into(), message: message.into() }
    }

    /// Wrap a reqwest failure with the operation that was attempted
    pub fn transport<S: Into<String>>(context: S, source: reqwest::Error) -> Self {
        Self::Transport { context: context.into(), source }
    }

    /// Wrap a JSON decoding failure
    pub fn serialization<S: Into<String>>(context: S, source: serde_json::Error) -> Self {
        Self::Serialization { context: context.into(), source }
    }

    /// Upstream HTTP status carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ConjurError::Auth { status, .. } | ConjurError::SecretFetch { status, .. } => {
                Some(*status)
            }
            ConjurError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if a caller may reasonably retry the failed operation
    pub fn is_retryable(&self) -> bool {
        match self {
            ConjurError::Transport { .. } => true,
            ConjurError::Auth { status, .. } | ConjurError::SecretFetch { status, .. } => {
                *status >= 500 || *status == 429
            }
            _ => false,
        }
    }
}

impl From<validator::ValidationErrors> for ConjurError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::configuration(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = ConjurError::configuration("identity fields missing");
        assert!(matches!(error, ConjurError::Configuration { .. }));
        assert_eq!(error.to_string(), "Configuration error: identity fields missing");
    }

    #[test]
    fn test_auth_error_carries_upstream_response() {
        let error = ConjurError::auth(401, "Unauthorized");
        assert_eq!(error.status_code(), Some(401));
        assert_eq!(error.to_string(), "Error authenticating to Conjur [401]: Unauthorized");
    }

    #[test]
    fn test_no_credentials_display() {
        let error = ConjurError::no_credentials("https://conjur:8083", "myacct");
        assert!(error.to_string().contains("myacct"));
        assert!(error.to_string().contains("https://conjur:8083"));
        assert_eq!(error.status_code(), None);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ConjurError::secret_fetch(503, "unavailable").is_retryable());
        assert!(ConjurError::auth(429, "slow down").is_retryable());
        assert!(!ConjurError::secret_fetch(404, "not found").is_retryable());
        assert!(!ConjurError::auth(401, "nope").is_retryable());
        assert!(!ConjurError::configuration("bad").is_retryable());
    }

    #[test]
    fn test_serialization_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let error = ConjurError::serialization("Decoding resource listing", json_error);
        assert!(matches!(error, ConjurError::Serialization { .. }));
        assert_eq!(error.to_string(), "Serialization error: Decoding resource listing");
    }
}
