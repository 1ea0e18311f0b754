//! In-memory namespace tree
//!
//! [`Item`] is a ready-made [`NamespaceContext`] for hosts that do not have their
//! own hierarchy model, and for the CLI.

use std::sync::Arc;

use super::context::{ContextKind, ContextRef, NamespaceContext};
use crate::config::ScopedConfig;

/// A node in an `Arc` linked namespace tree
#[derive(Debug, Clone)]
pub struct Item {
    name: String,
    kind: ContextKind,
    parent: Option<Arc<Item>>,
    config: Option<ScopedConfig>,
}

impl Item {
    /// The root of a new tree
    pub fn root() -> Arc<Self> {
        Arc::new(Self { name: String::new(), kind: ContextKind::Root, parent: None, config: None })
    }

    /// A folder inside `parent`
    pub fn folder(parent: &Arc<Item>, name: &str) -> Arc<Self> {
        Self::child(parent, ContextKind::Folder, name)
    }

    /// A job inside `parent`
    pub fn job(parent: &Arc<Item>, name: &str) -> Arc<Self> {
        Self::child(parent, ContextKind::Job, name)
    }

    /// Build number `number` of `job`
    pub fn run(job: &Arc<Item>, number: u64) -> Arc<Self> {
        Self::child(job, ContextKind::Run, &format!("#{}", number))
    }

    fn child(parent: &Arc<Item>, kind: ContextKind, name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            kind,
            parent: Some(Arc::clone(parent)),
            config: None,
        })
    }

    /// A copy of this node carrying `config`.
    ///
    /// Children created from the old node keep pointing at it, so attach
    /// configuration before building the levels below.
    pub fn with_config(&self, config: ScopedConfig) -> Arc<Self> {
        Arc::new(Self { config: Some(config), ..self.clone() })
    }

    /// Folders for every segment but the last, which becomes a job
    pub fn job_at_path(root: &Arc<Item>, path: &str) -> Arc<Self> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((job, folders)) = segments.split_last() else {
            return Arc::clone(root);
        };

        let parent = folders.iter().fold(Arc::clone(root), |parent, name| Item::folder(&parent, name));
        Item::job(&parent, job)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Item>> {
        self.parent.as_ref()
    }

    /// Upcast to a shared context handle
    pub fn as_context(self: &Arc<Self>) -> ContextRef {
        Arc::clone(self) as ContextRef
    }
}

impl NamespaceContext for Item {
    fn kind(&self) -> ContextKind {
        self.kind
    }

    fn full_name(&self) -> String {
        match &self.parent {
            Some(parent) if !parent.is_root() => format!("{}/{}", parent.full_name(), self.name),
            _ => self.name.clone(),
        }
    }

    fn enclosing(&self) -> Option<ContextRef> {
        self.parent.as_ref().map(|parent| Arc::clone(parent) as ContextRef)
    }

    fn scoped_config(&self) -> Option<ScopedConfig> {
        self.config.clone()
    }
}
