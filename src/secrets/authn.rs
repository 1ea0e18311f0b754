//! # Authentication negotiation
//!
//! Builds exactly one authenticate request against Conjur, using either a static
//! login/API key or a short-lived identity token (JWT), and returns the access token
//! verbatim.
//!
//! Inputs are gathered in a fixed order: the stored credential named by the
//! connection's `credential_ref`, the connection's own URL and account, the
//! `CONJUR_*` environment, and finally an identity token issued for the requesting
//! context when no static credential was found at all.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::client::base_url;
use super::types::{BearerToken, SecretString};
use crate::config::{ConnectionConfig, EnvFallback, GlobalConjurConfig};
use crate::domain::{owning_item, ContextRef};
use crate::errors::{ConjurError, Result};

/// Authenticator path used for API-key logins
pub const DEFAULT_AUTHN_PATH: &str = "authn";
/// Prefix applied to a bare JWT authenticator service id
pub const JWT_AUTHN_PREFIX: &str = "authn-jwt";

/// A stored login and API key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticCredential {
    pub login: String,
    pub api_key: SecretString,
}

impl StaticCredential {
    pub fn new(login: impl Into<String>, api_key: impl Into<SecretString>) -> Self {
        Self { login: login.into(), api_key: api_key.into() }
    }
}

/// Finds stored static credentials by id
#[async_trait]
pub trait CredentialLookup: Send + Sync {
    /// Look up `credential_id` in the global scope and the scope of `context`
    async fn lookup(&self, credential_id: &str, context: Option<&ContextRef>) -> Option<StaticCredential>;
}

/// Issues identity tokens bound to a namespace context
#[async_trait]
pub trait IdentityTokenIssuer: Send + Sync {
    async fn issue(&self, context: &ContextRef) -> Option<SecretString>;
}

/// Issuer for deployments without JWT authentication
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentityTokens;

#[async_trait]
impl IdentityTokenIssuer for NoIdentityTokens {
    async fn issue(&self, _context: &ContextRef) -> Option<SecretString> {
        None
    }
}

/// In-memory credential store.
///
/// Global credentials are visible everywhere. Scoped credentials are visible to the
/// item they are attached to and everything below it.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    global: DashMap<String, StaticCredential>,
    scoped: DashMap<(String, String), StaticCredential>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_global(&self, credential_id: impl Into<String>, credential: StaticCredential) {
        self.global.insert(credential_id.into(), credential);
    }

    /// Attach a credential to the item identified by `scope_key` (its cache key)
    pub fn insert_scoped(
        &self,
        scope_key: impl Into<String>,
        credential_id: impl Into<String>,
        credential: StaticCredential,
    ) {
        self.scoped.insert((scope_key.into(), credential_id.into()), credential);
    }
}

#[async_trait]
impl CredentialLookup for InMemoryCredentialStore {
    async fn lookup(&self, credential_id: &str, context: Option<&ContextRef>) -> Option<StaticCredential> {
        if let Some(found) = self.global.get(credential_id) {
            return Some(found.clone());
        }

        let mut level = context.map(owning_item);
        let max_steps = context.map_or(0, |ctx| ctx.depth() + 1);
        for _ in 0..max_steps {
            let current = level?;
            let key = (current.cache_key(), credential_id.to_string());
            if let Some(found) = self.scoped.get(&key) {
                return Some(found.clone());
            }
            level = current.enclosing();
        }
        None
    }
}

/// How a request proves its identity
#[derive(Clone, PartialEq, Eq)]
pub enum AuthnMethod {
    ApiKey { login: String, api_key: SecretString },
    Jwt { token: SecretString },
}

impl AuthnMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ApiKey { .. } => "api_key",
            Self::Jwt { .. } => "jwt",
        }
    }
}

impl std::fmt::Debug for AuthnMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey { login, .. } => f.debug_struct("ApiKey").field("login", login).finish_non_exhaustive(),
            Self::Jwt { .. } => f.debug_struct("Jwt").finish_non_exhaustive(),
        }
    }
}

/// Fully resolved authentication parameters
#[derive(Debug, Clone, Default)]
pub struct AuthnInfo {
    pub appliance_url: String,
    pub account: String,
    pub authn_path: String,
    pub login: Option<String>,
    pub api_key: Option<SecretString>,
    pub identity_token: Option<SecretString>,
}

impl AuthnInfo {
    /// The single authentication method these parameters support, if any.
    ///
    /// An issued identity token with no login selects JWT; otherwise a non-blank
    /// login and API key select the API-key flow.
    pub fn method(&self) -> Option<AuthnMethod> {
        let login = self.login.as_deref().filter(|login| !login.trim().is_empty());

        if login.is_none() && !self.authn_path.trim().is_empty() {
            if let Some(token) = self.identity_token.as_ref().filter(|token| !token.is_blank()) {
                return Some(AuthnMethod::Jwt { token: token.clone() });
            }
        }

        match (login, self.api_key.as_ref().filter(|key| !key.is_blank())) {
            (Some(login), Some(api_key)) => {
                Some(AuthnMethod::ApiKey { login: login.to_string(), api_key: api_key.clone() })
            }
            _ => None,
        }
    }
}

/// One authenticate call: target URL plus request body
#[derive(Debug, Clone)]
pub struct AuthnRequest {
    pub url: String,
    pub method: AuthnMethod,
}

impl AuthnRequest {
    /// Build the request for `info`, or fail with `NoCredentials`
    pub fn from_info(info: &AuthnInfo) -> Result<Self> {
        let method = info
            .method()
            .ok_or_else(|| ConjurError::no_credentials(&info.appliance_url, &info.account))?;
        let appliance_url = base_url(&info.appliance_url);

        let url = match &method {
            AuthnMethod::ApiKey { login, .. } => {
                let encoded_login: String = url::form_urlencoded::byte_serialize(login.as_bytes()).collect();
                format!(
                    "{}/{}/{}/{}/authenticate",
                    appliance_url, info.authn_path, info.account, encoded_login
                )
            }
            AuthnMethod::Jwt { .. } => {
                format!("{}/{}/{}/authenticate", appliance_url, jwt_authn_path(&info.authn_path), info.account)
            }
        };

        Ok(Self { url, method })
    }

    /// Wire body: the raw API key, or `jwt=<token>`
    pub fn body(&self) -> SecretString {
        match &self.method {
            AuthnMethod::ApiKey { api_key, .. } => api_key.clone(),
            AuthnMethod::Jwt { token } => SecretString::new(format!("jwt={}", token.expose_secret())),
        }
    }
}

/// A bare service id lives under the JWT authenticator; a full path is used as is
fn jwt_authn_path(authn_path: &str) -> String {
    if authn_path.contains('/') {
        authn_path.to_string()
    } else {
        format!("{}/{}", JWT_AUTHN_PREFIX, authn_path)
    }
}

/// Negotiates Conjur access tokens
#[derive(Clone)]
pub struct AuthNegotiator {
    http: reqwest::Client,
    global: Arc<GlobalConjurConfig>,
    env: EnvFallback,
    credentials: Arc<dyn CredentialLookup>,
    identity: Arc<dyn IdentityTokenIssuer>,
}

impl std::fmt::Debug for AuthNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthNegotiator").field("env", &self.env).finish_non_exhaustive()
    }
}

impl AuthNegotiator {
    pub fn new(
        http: reqwest::Client,
        global: Arc<GlobalConjurConfig>,
        env: EnvFallback,
        credentials: Arc<dyn CredentialLookup>,
        identity: Arc<dyn IdentityTokenIssuer>,
    ) -> Self {
        Self { http, global, env, credentials, identity }
    }

    /// Gather authentication parameters for `config` requested from `context`
    pub async fn authn_info(&self, config: &ConnectionConfig, context: Option<&ContextRef>) -> AuthnInfo {
        let mut info = AuthnInfo { authn_path: DEFAULT_AUTHN_PATH.to_string(), ..Default::default() };

        if let Some(credential_ref) = config.credential_ref() {
            match self.credentials.lookup(credential_ref, context).await {
                Some(credential) => {
                    info.login = Some(credential.login);
                    info.api_key = Some(credential.api_key);
                }
                None => warn!(credential_id = %credential_ref, "Referenced Conjur credential not found"),
            }
        }
        if !config.appliance_url.trim().is_empty() {
            info.appliance_url = config.appliance_url.clone();
        }
        if !config.account.trim().is_empty() {
            info.account = config.account.clone();
        }

        self.apply_env(&mut info);

        if info.login.is_none() && info.api_key.is_none() {
            if let Some(context) = context {
                self.apply_identity_token(&mut info, context).await;
            }
        }

        if info.account.trim().is_empty() {
            info.account = self.global.connection.account.clone();
        }
        if info.appliance_url.trim().is_empty() {
            info.appliance_url = self.global.connection.appliance_url.clone();
        }
        info
    }

    fn apply_env(&self, info: &mut AuthnInfo) {
        if info.appliance_url.is_empty() {
            if let Some(url) = &self.env.appliance_url {
                info.appliance_url = url.clone();
            }
        }
        if info.account.is_empty() {
            if let Some(account) = &self.env.account {
                info.account = account.clone();
            }
        }
        if info.login.is_none() {
            info.login = self.env.authn_login.clone();
        }
        if info.api_key.is_none() {
            info.api_key = self.env.authn_api_key.clone();
        }
    }

    async fn apply_identity_token(&self, info: &mut AuthnInfo, context: &ContextRef) {
        if !self.global.enable_jwks {
            return;
        }
        match self.identity.issue(context).await {
            Some(token) => {
                debug!(context = %context.full_name(), "Using identity token for Conjur authentication");
                info.login = None;
                info.authn_path = self.global.auth_web_service_id.clone();
                info.identity_token = Some(token);
            }
            None => debug!(context = %context.full_name(), "No identity token issued"),
        }
    }

    /// Authenticate and return the access token.
    ///
    /// # Errors
    ///
    /// - [`ConjurError::Configuration`] when the JWT identity policy is violated
    /// - [`ConjurError::NoCredentials`] when neither flow has its inputs
    /// - [`ConjurError::Auth`] for a non-200 response
    #[instrument(skip(self, config, context), fields(account = %config.account))]
    pub async fn authenticate(
        &self,
        config: &ConnectionConfig,
        context: Option<&ContextRef>,
    ) -> Result<BearerToken> {
        self.global.check_identity_policy()?;
        let info = self.authn_info(config, context).await;

        let request = AuthnRequest::from_info(&info)?;
        debug!(
            method = request.method.name(),
            authn_path = %info.authn_path,
            account = %info.account,
            "Authenticating with Conjur"
        );

        let response = self
            .http
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(request.body().expose_secret().to_string())
            .send()
            .await
            .map_err(|e| ConjurError::transport("POST authenticate", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ConjurError::transport("Reading authenticate response", e))?;

        if status != reqwest::StatusCode::OK {
            warn!(status = status.as_u16(), account = %info.account, "Conjur authentication rejected");
            return Err(ConjurError::auth(status.as_u16(), body));
        }

        debug!(account = %info.account, "Conjur authentication succeeded");
        Ok(BearerToken::new(body))
    }
}
