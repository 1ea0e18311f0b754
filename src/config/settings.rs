//! # Global Settings
//!
//! Process-wide defaults and authentication policy for the Conjur integration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use super::ConnectionConfig;
use crate::errors::{ConjurError, Result};

/// Identity field carrying the full item name
pub const IDENTITY_FULL_NAME: &str = "jenkins_full_name";
/// Identity field carrying the parent's full name
pub const IDENTITY_PARENT_FULL_NAME: &str = "jenkins_parent_full_name";
/// Identity field carrying the short item name
pub const IDENTITY_NAME: &str = "jenkins_name";

/// Default lifetime of a cached credential directory
pub const DEFAULT_DIRECTORY_TTL_SECS: u64 = 120;
/// Default per-request HTTP timeout
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Global Conjur settings: the default connection plus the JWT policy
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GlobalConjurConfig {
    /// Connection used when no namespace level overrides it
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// JWT (identity token) authentication is enabled
    #[serde(default)]
    pub enable_jwks: bool,

    /// Per-context credential directories are listed from Conjur; only takes
    /// effect together with `enable_jwks`
    #[serde(default)]
    pub enable_context_aware_credential_store: bool,

    /// Authenticator service id used as the authn path for the JWT flow
    #[serde(default)]
    pub auth_web_service_id: String,

    /// Simplified identity format; when set the identity field list is not checked
    #[serde(default)]
    pub enable_identity_format_fields_from_token: bool,

    /// Comma separated identity fields taken from the token
    #[serde(default = "default_identity_fields")]
    pub identity_format_fields_from_token: String,

    /// Credential directory time-to-live in seconds
    #[serde(default = "default_directory_ttl")]
    #[validate(range(min = 1, max = 86400, message = "Directory TTL must be between 1 and 86400 seconds"))]
    pub directory_ttl_secs: u64,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub http_timeout_secs: u64,
}

fn default_identity_fields() -> String {
    IDENTITY_FULL_NAME.to_string()
}

fn default_directory_ttl() -> u64 {
    DEFAULT_DIRECTORY_TTL_SECS
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl Default for GlobalConjurConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            enable_jwks: false,
            enable_context_aware_credential_store: false,
            auth_web_service_id: String::new(),
            enable_identity_format_fields_from_token: false,
            identity_format_fields_from_token: default_identity_fields(),
            directory_ttl_secs: DEFAULT_DIRECTORY_TTL_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl GlobalConjurConfig {
    /// Create settings around a default connection
    pub fn with_connection(connection: ConnectionConfig) -> Self {
        Self { connection, ..Default::default() }
    }

    /// Load settings from `CONJUR_*` environment variables
    ///
    /// The default connection uses `CONJUR_APPLIANCE_URL`, `CONJUR_ACCOUNT` and
    /// `CONJUR_CREDENTIAL_ID`; policy flags use `CONJUR_JWT_ENABLED`,
    /// `CONJUR_CONTEXT_AWARE_STORE`, `CONJUR_AUTH_WEBSERVICE_ID`,
    /// `CONJUR_SIMPLIFIED_IDENTITY` and `CONJUR_IDENTITY_FORMAT_FIELDS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.connection.appliance_url =
            std::env::var(super::ENV_APPLIANCE_URL).unwrap_or_default();
        config.connection.account = std::env::var(super::ENV_ACCOUNT).unwrap_or_default();
        config.connection.credential_ref = std::env::var("CONJUR_CREDENTIAL_ID").ok();

        config.enable_jwks = parse_bool_var("CONJUR_JWT_ENABLED")?.unwrap_or(false);
        config.enable_context_aware_credential_store =
            parse_bool_var("CONJUR_CONTEXT_AWARE_STORE")?.unwrap_or(false);
        config.enable_identity_format_fields_from_token =
            parse_bool_var("CONJUR_SIMPLIFIED_IDENTITY")?.unwrap_or(false);
        if let Ok(service_id) = std::env::var("CONJUR_AUTH_WEBSERVICE_ID") {
            config.auth_web_service_id = service_id;
        }
        if let Ok(fields) = std::env::var("CONJUR_IDENTITY_FORMAT_FIELDS") {
            config.identity_format_fields_from_token = fields;
        }
        if let Some(ttl) = parse_u64_var("CONJUR_DIRECTORY_TTL_SECS")? {
            config.directory_ttl_secs = ttl;
        }
        if let Some(timeout) = parse_u64_var("CONJUR_HTTP_TIMEOUT_SECS")? {
            config.http_timeout_secs = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate numeric ranges
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(ConjurError::from)
    }

    /// The configured identity fields, trimmed, blanks dropped
    pub fn identity_fields(&self) -> Vec<&str> {
        self.identity_format_fields_from_token
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect()
    }

    /// Enforce the identity-claim policy for JWT authentication.
    ///
    /// With JWT enabled and the simplified format disabled, the identity fields must
    /// name the full item name, or both the parent full name and the short name.
    pub fn check_identity_policy(&self) -> Result<()> {
        if !self.enable_jwks || self.enable_identity_format_fields_from_token {
            return Ok(());
        }

        let fields = self.identity_fields();
        let has_full_name = fields.contains(&IDENTITY_FULL_NAME);
        let has_split_name =
            fields.contains(&IDENTITY_PARENT_FULL_NAME) && fields.contains(&IDENTITY_NAME);

        if has_full_name || has_split_name {
            Ok(())
        } else {
            Err(ConjurError::configuration(format!(
                "Identity format fields must contain {} or both {} and {}",
                IDENTITY_FULL_NAME, IDENTITY_PARENT_FULL_NAME, IDENTITY_NAME
            )))
        }
    }

    /// Credential directories are listed only with JWT auth and the context-aware
    /// store both enabled
    pub fn context_aware_store_enabled(&self) -> bool {
        self.enable_jwks && self.enable_context_aware_credential_store
    }

    /// Lifetime of cached credential directories
    pub fn directory_ttl(&self) -> Duration {
        Duration::from_secs(self.directory_ttl_secs)
    }

    /// Per-request HTTP timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn parse_bool_var(name: &str) -> Result<Option<bool>> {
    match std::env::var(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" | "" => Ok(Some(false)),
            other => Err(ConjurError::configuration(format!("Invalid boolean for {}: {}", name, other))),
        },
        Err(_) => Ok(None),
    }
}

fn parse_u64_var(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConjurError::configuration(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_policy(fields: &str) -> GlobalConjurConfig {
        GlobalConjurConfig {
            enable_jwks: true,
            identity_format_fields_from_token: fields.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = GlobalConjurConfig::default();
        assert_eq!(config.directory_ttl(), Duration::from_secs(120));
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert_eq!(config.identity_fields(), vec!["jenkins_full_name"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_identity_policy_accepts_full_name() {
        assert!(jwt_policy("jenkins_full_name").check_identity_policy().is_ok());
        assert!(jwt_policy("jenkins_name, jenkins_full_name").check_identity_policy().is_ok());
    }

    #[test]
    fn test_identity_policy_accepts_parent_and_name() {
        assert!(jwt_policy("jenkins_parent_full_name,jenkins_name").check_identity_policy().is_ok());
    }

    #[test]
    fn test_identity_policy_rejects_partial_fields() {
        let err = jwt_policy("jenkins_parent_full_name").check_identity_policy().unwrap_err();
        assert!(matches!(err, ConjurError::Configuration { .. }));

        let err = jwt_policy("jenkins_name,jenkins_pronoun").check_identity_policy().unwrap_err();
        assert!(matches!(err, ConjurError::Configuration { .. }));
    }

    #[test]
    fn test_identity_policy_skipped_when_simplified_or_disabled() {
        let mut config = jwt_policy("jenkins_name");
        config.enable_identity_format_fields_from_token = true;
        assert!(config.check_identity_policy().is_ok());

        let mut config = jwt_policy("jenkins_name");
        config.enable_jwks = false;
        assert!(config.check_identity_policy().is_ok());
    }

    #[test]
    fn test_context_aware_store_needs_jwt() {
        let mut config = GlobalConjurConfig::default();
        assert!(!config.context_aware_store_enabled());

        config.enable_context_aware_credential_store = true;
        assert!(!config.context_aware_store_enabled());

        config.enable_jwks = true;
        assert!(config.context_aware_store_enabled());
    }

    #[test]
    fn test_validation_rejects_zero_ttl() {
        let config = GlobalConjurConfig { directory_ttl_secs: 0, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("directory_ttl_secs"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: GlobalConjurConfig = serde_json::from_str(
            r#"{"connection":{"appliance_url":"https://conjur:8083","account":"myacct"}}"#,
        )
        .unwrap();
        assert_eq!(config.connection.account, "myacct");
        assert_eq!(config.directory_ttl_secs, 120);
        assert!(!config.enable_jwks);
    }
}
