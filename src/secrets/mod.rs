//! Conjur secret resolution.
//!
//! - [`authn`]: negotiates access tokens (API key or identity token)
//! - [`client`]: authenticated secret reads and variable listing
//! - [`directory`]: per-context credential directories with a time-to-live
//! - [`walker`]: credential lookup across the namespace hierarchy
//! - [`service`]: the facade tying these together
//!
//! Secret material is carried in the redacting wrappers from [`types`].

pub mod authn;
pub mod client;
pub mod directory;
pub mod memo;
pub mod service;
pub mod types;
pub mod walker;

pub use authn::{
    AuthNegotiator, AuthnInfo, AuthnMethod, AuthnRequest, CredentialLookup, IdentityTokenIssuer,
    InMemoryCredentialStore, NoIdentityTokens, StaticCredential,
};
pub use client::{build_http_client, Annotation, ConjurClient, RawResource};
pub use directory::{
    entries_from_resource, CachedDirectory, ConjurDirectorySource, CredentialDirectoryCache, DirectoryEntry,
    DirectoryEntryKind, DirectorySource,
};
pub use memo::ExpiringMemo;
pub use service::{ConjurCredentialService, ResolvedCredential};
pub use types::{BearerToken, SecretBytes, SecretString};
pub use walker::{CredentialResolutionWalker, LocatedEntry};
