//! # Structured Logging
//!
//! Subscriber setup for the `tracing` ecosystem. Library code only emits events;
//! binaries decide where they go by calling [`init_logging`] once at startup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::GlobalConjurConfig;

/// How log events are filtered and rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, used when `RUST_LOG` is unset
    pub level: String,
    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl LoggingConfig {
    /// `debug` when verbose, `info` otherwise
    pub fn for_verbosity(verbose: bool, json: bool) -> Self {
        Self { level: if verbose { "debug" } else { "info" }.to_string(), json }
    }

    /// Filter from `RUST_LOG`, falling back to the configured level
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Install the global subscriber.
///
/// An already installed subscriber (integration tests, embedding hosts) is kept.
pub fn init_logging(config: &LoggingConfig) {
    let builder = FmtSubscriber::builder().with_env_filter(config.env_filter());

    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };

    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already set; keeping it");
    }
}

/// Log the effective global settings at startup
pub fn log_config_info(config: &GlobalConjurConfig) {
    tracing::info!(
        appliance_url = %config.connection.appliance_url,
        account = %config.connection.account,
        jwt_enabled = config.enable_jwks,
        context_aware_store = config.enable_context_aware_credential_store,
        simplified_identity = config.enable_identity_format_fields_from_token,
        directory_ttl_secs = config.directory_ttl_secs,
        http_timeout_secs = config.http_timeout_secs,
        "Conjur credential configuration"
    );
}
