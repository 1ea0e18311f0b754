//! # Configuration Management
//!
//! Connection configuration for the Conjur server, the global policy settings, and
//! the resolver that picks the effective configuration for a namespace context.

pub mod resolver;
pub mod settings;

use serde::{Deserialize, Serialize};

use crate::secrets::types::SecretString;

pub use resolver::ConfigResolver;
pub use settings::GlobalConjurConfig;

/// Environment variable holding the Conjur appliance URL
pub const ENV_APPLIANCE_URL: &str = "CONJUR_APPLIANCE_URL";
/// Environment variable holding the Conjur account
pub const ENV_ACCOUNT: &str = "CONJUR_ACCOUNT";
/// Environment variable holding the API-key login
pub const ENV_AUTHN_LOGIN: &str = "CONJUR_AUTHN_LOGIN";
/// Environment variable holding the API key
pub const ENV_AUTHN_API_KEY: &str = "CONJUR_AUTHN_API_KEY";

/// Identifies which Conjur server and account to talk to, and which stored static
/// credential (if any) supplies API-key authentication.
///
/// Blank strings mean "not configured here"; they are backfilled by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub appliance_url: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub credential_ref: Option<String>,
}

impl ConnectionConfig {
    /// Create a configuration for the given server and account
    pub fn new(appliance_url: impl Into<String>, account: impl Into<String>) -> Self {
        Self { appliance_url: appliance_url.into(), account: account.into(), credential_ref: None }
    }

    /// Reference a stored static credential used for API-key authentication
    pub fn with_credential_ref(mut self, credential_ref: impl Into<String>) -> Self {
        self.credential_ref = Some(credential_ref.into());
        self
    }

    /// The credential reference, if one is set and non-blank
    pub fn credential_ref(&self) -> Option<&str> {
        self.credential_ref.as_deref().filter(|r| !r.trim().is_empty())
    }

    /// True when neither the URL nor the account is set
    pub fn is_blank(&self) -> bool {
        self.appliance_url.trim().is_empty() && self.account.trim().is_empty()
    }
}

/// A configuration declared at one level of the namespace hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedConfig {
    pub config: ConnectionConfig,
    /// When false this level overrides everything above it.
    #[serde(default = "default_inherit")]
    pub inherit_from_parent: bool,
}

fn default_inherit() -> bool {
    true
}

impl ScopedConfig {
    /// A configuration that replaces any inherited one
    pub fn overriding(config: ConnectionConfig) -> Self {
        Self { config, inherit_from_parent: false }
    }

    /// A configuration that defers to the enclosing levels
    pub fn inheriting(config: ConnectionConfig) -> Self {
        Self { config, inherit_from_parent: true }
    }
}

/// Snapshot of the `CONJUR_*` environment variables used as a last-resort fallback.
#[derive(Debug, Clone, Default)]
pub struct EnvFallback {
    pub appliance_url: Option<String>,
    pub account: Option<String>,
    pub authn_login: Option<String>,
    pub authn_api_key: Option<SecretString>,
}

impl EnvFallback {
    /// Capture the fallback values from the process environment
    pub fn from_env() -> Self {
        Self {
            appliance_url: std::env::var(ENV_APPLIANCE_URL).ok(),
            account: std::env::var(ENV_ACCOUNT).ok(),
            authn_login: std::env::var(ENV_AUTHN_LOGIN).ok(),
            authn_api_key: std::env::var(ENV_AUTHN_API_KEY).ok().map(SecretString::new),
        }
    }

    /// A snapshot with nothing set
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_ref_ignores_blank() {
        let config = ConnectionConfig::new("https://conjur", "acct").with_credential_ref("  ");
        assert_eq!(config.credential_ref(), None);

        let config = ConnectionConfig::new("https://conjur", "acct").with_credential_ref("conjur-login");
        assert_eq!(config.credential_ref(), Some("conjur-login"));
    }

    #[test]
    fn test_blank_config() {
        assert!(ConnectionConfig::default().is_blank());
        assert!(!ConnectionConfig::new("", "acct").is_blank());
    }

    #[test]
    fn test_scoped_config_defaults_to_inherit() {
        let scoped: ScopedConfig =
            serde_json::from_str(r#"{"config":{"appliance_url":"https://c","account":"a"}}"#)
                .unwrap();
        assert!(scoped.inherit_from_parent);
        assert_eq!(scoped.config.credential_ref, None);
    }
}
