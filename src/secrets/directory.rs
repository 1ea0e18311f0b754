//! # Credential directory
//!
//! Every namespace context sees a directory of credential entries derived from the
//! variable resources its Conjur configuration can list. Directories are built
//! lazily and memoized per context for a fixed time-to-live.
//!
//! A failed rebuild never takes a directory away: the previous copy keeps being
//! served, and a context that never had one sees an empty directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::authn::AuthNegotiator;
use super::client::{ConjurClient, RawResource};
use super::memo::ExpiringMemo;
use crate::config::ConfigResolver;
use crate::domain::{owning_item, ContextRef};
use crate::errors::{ConjurError, Result};

/// Annotation carrying the username of a credential
pub const ANNOTATION_USERNAME: &str = "jenkins_credential_username";
/// Annotation selecting the credential kind
pub const ANNOTATION_TYPE: &str = "jenkins_credential_type";

const TYPE_PLAIN: &str = "credential";
const TYPE_USERNAME: &str = "usernamecredential";
const TYPE_USERNAME_SSH_KEY: &str = "usernamesshkeycredential";

/// Kind of credential a directory entry stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryEntryKind {
    /// The secret value on its own
    Plain,
    /// Username plus the secret as password
    UsernamePassword,
    /// Username plus the secret as private key
    UsernameSshKey,
}

impl DirectoryEntryKind {
    /// Prefix of derived entry ids; plain entries have none
    fn id_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Plain => None,
            Self::UsernamePassword => Some("username"),
            Self::UsernameSshKey => Some("usernamesshkey"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::UsernamePassword => "username_password",
            Self::UsernameSshKey => "username_ssh_key",
        }
    }
}

impl fmt::Display for DirectoryEntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One credential visible in a directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Credential id callers look up
    pub id: String,
    /// Conjur variable holding the secret
    pub variable_path: String,
    pub inferred_username: Option<String>,
    pub inferred_kind: DirectoryEntryKind,
}

impl DirectoryEntry {
    fn new(variable_path: &str, username: Option<&str>, kind: DirectoryEntryKind) -> Self {
        let dashed = variable_path.replace('/', "-");
        let id = match kind.id_prefix() {
            Some(prefix) => format!("{}-{}", prefix, dashed),
            None => dashed,
        };
        Self {
            id,
            variable_path: variable_path.to_string(),
            inferred_username: username.map(str::to_string),
            inferred_kind: kind,
        }
    }
}

/// Directory entries for one variable resource.
///
/// Every variable yields a plain entry. A username or SSH key typed variable yields
/// a second entry of that kind. Resources whose id has no variable path yield none.
pub fn entries_from_resource(resource: &RawResource) -> Vec<DirectoryEntry> {
    let Some(variable_path) = resource.variable_path() else {
        debug!(id = %resource.id, "Skipping resource without a variable path");
        return Vec::new();
    };

    let username = resource.annotation(ANNOTATION_USERNAME);
    let declared_type = resource.annotation(ANNOTATION_TYPE).map(str::to_lowercase);
    let kind = match declared_type.as_deref() {
        Some(TYPE_USERNAME) => Some(DirectoryEntryKind::UsernamePassword),
        Some(TYPE_USERNAME_SSH_KEY) => Some(DirectoryEntryKind::UsernameSshKey),
        Some(TYPE_PLAIN) => None,
        Some(other) => {
            debug!(path = %variable_path, credential_type = %other, "Unknown credential type");
            None
        }
        None if username.is_some() => Some(DirectoryEntryKind::UsernamePassword),
        None => None,
    };

    let mut entries = vec![DirectoryEntry::new(variable_path, None, DirectoryEntryKind::Plain)];
    if let Some(kind) = kind {
        entries.push(DirectoryEntry::new(variable_path, username, kind));
    }
    entries
}

/// An immutable snapshot of the credentials visible in one context
#[derive(Debug, Clone)]
pub struct CachedDirectory {
    entries: Vec<DirectoryEntry>,
    built_at: DateTime<Utc>,
    ttl: Duration,
}

impl CachedDirectory {
    pub fn new(entries: Vec<DirectoryEntry>, ttl: Duration) -> Self {
        Self { entries, built_at: Utc::now(), ttl }
    }

    pub fn empty(ttl: Duration) -> Self {
        Self::new(Vec::new(), ttl)
    }

    /// Entry with exactly this id
    pub fn find(&self, credential_id: &str) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|entry| entry.id == credential_id)
    }

    pub fn of_kind(&self, kind: DirectoryEntryKind) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter().filter(move |entry| entry.inferred_kind == kind)
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Produces the directory entries visible in a context
#[async_trait]
pub trait DirectorySource: Send + Sync {
    async fn list_entries(&self, context: &ContextRef) -> Result<Vec<DirectoryEntry>>;
}

/// Lists variables from the Conjur server configured for the context
#[derive(Debug, Clone)]
pub struct ConjurDirectorySource {
    resolver: Arc<ConfigResolver>,
    negotiator: Arc<AuthNegotiator>,
    client: ConjurClient,
}

impl ConjurDirectorySource {
    pub fn new(resolver: Arc<ConfigResolver>, negotiator: Arc<AuthNegotiator>, client: ConjurClient) -> Self {
        Self { resolver, negotiator, client }
    }
}

#[async_trait]
impl DirectorySource for ConjurDirectorySource {
    #[instrument(skip(self, context), fields(context = %context.full_name()))]
    async fn list_entries(&self, context: &ContextRef) -> Result<Vec<DirectoryEntry>> {
        let config = self.resolver.resolve(Some(context));
        let token = self.negotiator.authenticate(&config, Some(context)).await?;
        let resources = self.client.list_resources(&token, &config.account, &config.appliance_url).await?;

        let entries: Vec<DirectoryEntry> = resources.iter().flat_map(entries_from_resource).collect();
        debug!(resources = resources.len(), entries = entries.len(), "Built credential directory");
        Ok(entries)
    }
}

/// Per-context directory cache with single-flight rebuilds.
///
/// Runs share the directory of their job.
pub struct CredentialDirectoryCache {
    memo: ExpiringMemo<String, CachedDirectory, ConjurError>,
    source: Arc<dyn DirectorySource>,
    listing_enabled: bool,
}

impl fmt::Debug for CredentialDirectoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialDirectoryCache")
            .field("memo", &self.memo)
            .field("listing_enabled", &self.listing_enabled)
            .finish_non_exhaustive()
    }
}

impl CredentialDirectoryCache {
    pub fn new(source: Arc<dyn DirectorySource>, ttl: Duration) -> Self {
        Self { memo: ExpiringMemo::new(ttl), source, listing_enabled: true }
    }

    /// When disabled every context sees an empty directory and nothing is listed
    pub fn with_listing_enabled(mut self, enabled: bool) -> Self {
        self.listing_enabled = enabled;
        self
    }

    pub fn listing_enabled(&self) -> bool {
        self.listing_enabled
    }

    /// The directory visible in `context`.
    ///
    /// Never fails: rebuild errors are logged and the previous (or an empty)
    /// directory is returned.
    pub async fn get_directory(&self, context: &ContextRef) -> Arc<CachedDirectory> {
        let ttl = self.memo.ttl();
        if !self.listing_enabled || context.is_root() {
            return Arc::new(CachedDirectory::empty(ttl));
        }

        let scope = owning_item(context);
        let key = scope.cache_key();
        let source = Arc::clone(&self.source);
        let build_key = key.clone();

        let built = self
            .memo
            .get_or_build(key.clone(), move || async move {
                debug!(context_key = %build_key, "Rebuilding credential directory");
                source
                    .list_entries(&scope)
                    .await
                    .map(|entries| CachedDirectory::new(entries, ttl))
                    .map_err(|e| ConjurError::directory_rebuild(build_key, e.to_string()))
            })
            .await;

        match built {
            Ok(directory) => directory,
            Err(error) => {
                let previous = self.memo.peek(&key);
                warn!(
                    context_key = %key,
                    error = %error,
                    serving_previous = previous.is_some(),
                    "Credential directory rebuild failed"
                );
                previous.unwrap_or_else(|| Arc::new(CachedDirectory::empty(ttl)))
            }
        }
    }

    /// Drop the cached directory of `context`
    pub fn invalidate(&self, context: &ContextRef) {
        self.memo.invalidate(&owning_item(context).cache_key());
    }

    pub fn clear(&self) {
        self.memo.clear();
    }

    /// Number of cached directories
    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}
