//! # Conjur credential service
//!
//! Ties configuration resolution, authentication, the directory cache and secret
//! retrieval together behind one object. Create one per process (or per tenant)
//! and share it; all state lives in its fields.
//!
//! # Example
//!
//! ```rust,ignore
//! use conjur_credentials::{ConjurCredentialService, GlobalConjurConfig, EnvFallback, Item};
//!
//! let service = ConjurCredentialService::new(
//!     GlobalConjurConfig::from_env()?,
//!     EnvFallback::from_env(),
//!     credentials,
//!     Arc::new(NoIdentityTokens),
//! )?;
//!
//! let job = Item::job_at_path(&Item::root(), "team/deploy").as_context();
//! if let Some(found) = service.credential_secret("db-password", &job).await? {
//!     use_password(found.secret.expose_secret());
//! }
//! ```

use std::sync::Arc;
use tracing::{debug, instrument};

use super::authn::{AuthNegotiator, CredentialLookup, IdentityTokenIssuer};
use super::client::{build_http_client, ConjurClient};
use super::directory::{
    CachedDirectory, ConjurDirectorySource, CredentialDirectoryCache, DirectoryEntry, DirectoryEntryKind,
    DirectorySource,
};
use super::types::{BearerToken, SecretBytes};
use super::walker::CredentialResolutionWalker;
use crate::config::{ConfigResolver, EnvFallback, GlobalConjurConfig};
use crate::domain::ContextRef;
use crate::errors::Result;

/// A directory entry together with its fetched secret value
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub entry: DirectoryEntry,
    pub secret: SecretBytes,
}

/// Entry point for resolving and fetching Conjur credentials
#[derive(Debug, Clone)]
pub struct ConjurCredentialService {
    global: Arc<GlobalConjurConfig>,
    resolver: Arc<ConfigResolver>,
    negotiator: Arc<AuthNegotiator>,
    client: ConjurClient,
    cache: Arc<CredentialDirectoryCache>,
    walker: CredentialResolutionWalker,
}

impl ConjurCredentialService {
    /// Build a service that lists directories from Conjur itself
    pub fn new(
        global: GlobalConjurConfig,
        env: EnvFallback,
        credentials: Arc<dyn CredentialLookup>,
        identity: Arc<dyn IdentityTokenIssuer>,
    ) -> Result<Self> {
        global.validate()?;
        let global = Arc::new(global);
        let http = build_http_client(&global)?;

        let resolver = Arc::new(ConfigResolver::new(Arc::clone(&global), env.clone()));
        let negotiator =
            Arc::new(AuthNegotiator::new(http.clone(), Arc::clone(&global), env, credentials, identity));
        let client = ConjurClient::new(http);

        let source = ConjurDirectorySource::new(Arc::clone(&resolver), Arc::clone(&negotiator), client.clone());
        let cache = Arc::new(
            CredentialDirectoryCache::new(Arc::new(source), global.directory_ttl())
                .with_listing_enabled(global.context_aware_store_enabled()),
        );
        let walker = CredentialResolutionWalker::new(Arc::clone(&cache));

        debug!(
            directory_ttl_secs = global.directory_ttl_secs,
            jwt_enabled = global.enable_jwks,
            context_aware_store = global.context_aware_store_enabled(),
            "Conjur credential service initialized"
        );
        Ok(Self { global, resolver, negotiator, client, cache, walker })
    }

    /// Replace where credential directories come from
    pub fn with_directory_source(mut self, source: Arc<dyn DirectorySource>) -> Self {
        self.cache = Arc::new(
            CredentialDirectoryCache::new(source, self.global.directory_ttl())
                .with_listing_enabled(self.global.context_aware_store_enabled()),
        );
        self.walker = CredentialResolutionWalker::new(Arc::clone(&self.cache));
        self
    }

    pub fn global(&self) -> &GlobalConjurConfig {
        &self.global
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    pub fn directory_cache(&self) -> &CredentialDirectoryCache {
        &self.cache
    }

    /// Resolve the configuration for `context` and authenticate against it
    pub async fn authenticate(&self, context: Option<&ContextRef>) -> Result<BearerToken> {
        let config = self.resolver.resolve(context);
        self.negotiator.authenticate(&config, context).await
    }

    /// Fetch the variable at `variable_path` with the configuration of `context`
    #[instrument(skip(self, context))]
    pub async fn secret(&self, variable_path: &str, context: Option<&ContextRef>) -> Result<SecretBytes> {
        let config = self.resolver.resolve(context);
        let token = self.negotiator.authenticate(&config, context).await?;
        self.client.fetch_secret(&token, &config.account, &config.appliance_url, variable_path).await
    }

    /// The directory visible in `context`
    pub async fn directory(&self, context: &ContextRef) -> Arc<CachedDirectory> {
        self.cache.get_directory(context).await
    }

    /// Find the entry for `credential_id` as seen from `context`
    pub async fn resolve_credential(&self, credential_id: &str, context: &ContextRef) -> Option<DirectoryEntry> {
        self.walker.resolve(credential_id, context).await
    }

    /// Find the entry for `credential_id` and fetch its secret.
    ///
    /// The secret is read with the configuration of the level whose directory
    /// listed the entry. `Ok(None)` when no directory on the way to the root holds
    /// the id.
    #[instrument(skip(self, context), fields(context = %context.full_name()))]
    pub async fn credential_secret(
        &self,
        credential_id: &str,
        context: &ContextRef,
    ) -> Result<Option<ResolvedCredential>> {
        let Some(found) = self.walker.locate(credential_id, context).await else {
            return Ok(None);
        };
        let secret = self.secret(&found.entry.variable_path, Some(&found.level)).await?;
        Ok(Some(ResolvedCredential { entry: found.entry, secret }))
    }

    /// Entries of `kind` in the directory of `context`
    pub async fn credentials_of_kind(&self, kind: DirectoryEntryKind, context: &ContextRef) -> Vec<DirectoryEntry> {
        self.cache.get_directory(context).await.of_kind(kind).cloned().collect()
    }
}
