//! # Conjur Credentials
//!
//! Hierarchical secret resolution and authentication caching for CyberArk Conjur.
//!
//! Callers live in a namespace of folders, jobs and runs. Each level may carry its
//! own Conjur connection; credentials listed from Conjur are visible in the context
//! whose configuration listed them and in everything below it.
//!
//! ## Architecture
//!
//! ```text
//! ConjurCredentialService
//!   ├── ConfigResolver            effective connection per context
//!   ├── AuthNegotiator            API key or identity token → access token
//!   ├── ConjurClient              secret reads, variable listing
//!   ├── CredentialDirectoryCache  per-context directory, TTL, single flight
//!   └── CredentialResolutionWalker  own directory, then enclosing folders
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conjur_credentials::{
//!     ConjurCredentialService, EnvFallback, GlobalConjurConfig, InMemoryCredentialStore, Item,
//!     NoIdentityTokens, Result,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let service = ConjurCredentialService::new(
//!         GlobalConjurConfig::from_env()?,
//!         EnvFallback::from_env(),
//!         Arc::new(InMemoryCredentialStore::new()),
//!         Arc::new(NoIdentityTokens),
//!     )?;
//!
//!     let job = Item::job_at_path(&Item::root(), "team/deploy").as_context();
//!     if let Some(entry) = service.resolve_credential("db-password", &job).await {
//!         println!("{} -> {}", entry.id, entry.variable_path);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod secrets;

// Re-export commonly used types and traits
pub use config::{ConfigResolver, ConnectionConfig, EnvFallback, GlobalConjurConfig, ScopedConfig};
pub use domain::{ContextKind, ContextRef, Item, NamespaceContext};
pub use errors::{ConjurError, Result};
pub use observability::{init_logging, LoggingConfig};
pub use secrets::{
    AuthNegotiator, BearerToken, ConjurClient, ConjurCredentialService, CredentialDirectoryCache,
    CredentialLookup, CredentialResolutionWalker, DirectoryEntry, DirectoryEntryKind, IdentityTokenIssuer,
    InMemoryCredentialStore, NoIdentityTokens, ResolvedCredential, SecretBytes, SecretString,
    StaticCredential,
};

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "conjur-credentials");
    }
}
