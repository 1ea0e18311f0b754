//! Effective configuration resolution
//!
//! Walks from a namespace context outward and picks the nearest configuration that
//! declares "do not inherit", falling back to the global default. Blank fields are
//! then backfilled from the environment and the global default.

use std::sync::Arc;
use tracing::{debug, trace};

use super::{ConnectionConfig, EnvFallback, GlobalConjurConfig};
use crate::domain::{ContextKind, ContextRef, NamespaceContext};

/// Resolves the [`ConnectionConfig`] that applies to a namespace context
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    global: Arc<GlobalConjurConfig>,
    env: EnvFallback,
}

impl ConfigResolver {
    pub fn new(global: Arc<GlobalConjurConfig>, env: EnvFallback) -> Self {
        Self { global, env }
    }

    pub fn global(&self) -> &GlobalConjurConfig {
        &self.global
    }

    pub fn env(&self) -> &EnvFallback {
        &self.env
    }

    /// The effective configuration for `context`, with blanks backfilled
    pub fn resolve(&self, context: Option<&ContextRef>) -> ConnectionConfig {
        let selected = match context.and_then(|ctx| self.select(ctx)) {
            Some(config) => config,
            None => {
                trace!("Using global Conjur configuration");
                self.global.connection.clone()
            }
        };
        self.backfill(selected)
    }

    /// Nearest non-inheriting configuration, or `None` for the global default
    fn select(&self, context: &ContextRef) -> Option<ConnectionConfig> {
        let mut next: Option<ContextRef> = match context.kind() {
            ContextKind::Root => return None,
            ContextKind::Run => {
                let job = context.enclosing()?;
                if let Some(config) = overriding_config(job.as_ref()) {
                    debug!(context = %context.full_name(), "Using job-level Conjur configuration");
                    return Some(config);
                }
                job.enclosing()
            }
            ContextKind::Job | ContextKind::Folder => {
                if let Some(config) = overriding_config(context.as_ref()) {
                    debug!(context = %context.full_name(), "Using item-level Conjur configuration");
                    return Some(config);
                }
                context.enclosing()
            }
        };

        for _ in 0..context.depth() {
            let level = next?;
            if level.is_root() {
                return None;
            }
            if level.kind().is_container() {
                if let Some(config) = overriding_config(level.as_ref()) {
                    debug!(
                        context = %context.full_name(),
                        folder = %level.full_name(),
                        "Using inherited folder Conjur configuration"
                    );
                    return Some(config);
                }
            }
            next = level.enclosing();
        }
        None
    }

    fn backfill(&self, mut config: ConnectionConfig) -> ConnectionConfig {
        if config.appliance_url.trim().is_empty() {
            config.appliance_url = self
                .env
                .appliance_url
                .clone()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| self.global.connection.appliance_url.clone());
        }
        if config.account.trim().is_empty() {
            config.account = self
                .env
                .account
                .clone()
                .filter(|account| !account.trim().is_empty())
                .unwrap_or_else(|| self.global.connection.account.clone());
        }
        config
    }
}

fn overriding_config(level: &dyn NamespaceContext) -> Option<ConnectionConfig> {
    level.scoped_config().filter(|scoped| !scoped.inherit_from_parent).map(|scoped| scoped.config)
}
