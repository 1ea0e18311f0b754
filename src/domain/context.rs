//! Namespace context abstraction
//!
//! A namespace context is a node in the caller's hierarchy (root, folder, job, run).
//! It is used both for configuration inheritance and for credential visibility.

use std::fmt;
use std::sync::Arc;

use crate::config::ScopedConfig;

/// Shared handle to a namespace context
pub type ContextRef = Arc<dyn NamespaceContext>;

/// Kind of node in the namespace hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Root,
    Folder,
    Job,
    Run,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Folder => "folder",
            Self::Job => "job",
            Self::Run => "run",
        }
    }

    /// Containers hold other items and own a credential directory
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Root | Self::Folder)
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capability interface every context variant implements.
///
/// Walkers only ever call these methods; they never inspect concrete types.
pub trait NamespaceContext: Send + Sync + fmt::Debug {
    /// What kind of node this is
    fn kind(&self) -> ContextKind;

    /// Slash separated path from the root, empty for the root itself
    fn full_name(&self) -> String;

    /// The item directly enclosing this one, `None` at the root
    fn enclosing(&self) -> Option<ContextRef>;

    /// Configuration declared at this level, if any
    fn scoped_config(&self) -> Option<ScopedConfig>;

    fn is_root(&self) -> bool {
        self.kind() == ContextKind::Root
    }

    /// Stable identity used to key per-context caches
    fn cache_key(&self) -> String {
        format!("{}:{}", self.kind(), self.full_name())
    }

    /// Number of path segments; bounds every upward walk
    fn depth(&self) -> usize {
        self.full_name().split('/').filter(|segment| !segment.is_empty()).count()
    }
}

/// The lookup scope for a context: a run is scoped by its owning job.
pub fn owning_item(context: &ContextRef) -> ContextRef {
    match context.kind() {
        ContextKind::Run => context.enclosing().unwrap_or_else(|| Arc::clone(context)),
        _ => Arc::clone(context),
    }
}
