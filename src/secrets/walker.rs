//! Credential resolution across the namespace hierarchy.
//!
//! A credential id is looked up in the requesting context's own directory first, then
//! in each enclosing folder outward. Jobs and runs are never consulted on the way
//! up, and the root has no directory.

use std::sync::Arc;
use tracing::{debug, trace};

use super::directory::{CredentialDirectoryCache, DirectoryEntry};
use crate::domain::{owning_item, ContextKind, ContextRef};

/// An entry together with the level whose directory listed it
#[derive(Debug, Clone)]
pub struct LocatedEntry {
    pub entry: DirectoryEntry,
    /// Its configuration reaches the server the entry was listed from
    pub level: ContextRef,
}

/// Walks outward through enclosing containers until a directory holds the id
#[derive(Debug, Clone)]
pub struct CredentialResolutionWalker {
    cache: Arc<CredentialDirectoryCache>,
}

impl CredentialResolutionWalker {
    pub fn new(cache: Arc<CredentialDirectoryCache>) -> Self {
        Self { cache }
    }

    /// Find `credential_id` as seen from `context`
    pub async fn resolve(&self, credential_id: &str, context: &ContextRef) -> Option<DirectoryEntry> {
        self.locate(credential_id, context).await.map(|found| found.entry)
    }

    /// Find `credential_id` and the level whose directory holds it.
    ///
    /// Makes at most `context.depth()` outward steps, so a malformed hierarchy
    /// cannot keep the walk going.
    pub async fn locate(&self, credential_id: &str, context: &ContextRef) -> Option<LocatedEntry> {
        if let Some(entry) = self.cache.get_directory(context).await.find(credential_id) {
            debug!(credential_id = %credential_id, context = %context.full_name(), "Credential found in own directory");
            return Some(LocatedEntry { entry: entry.clone(), level: owning_item(context) });
        }

        let mut next = match context.kind() {
            ContextKind::Run => context.enclosing().and_then(|job| job.enclosing()),
            _ => context.enclosing(),
        };

        for _ in 0..context.depth() {
            let level = next?;
            if level.is_root() {
                break;
            }
            if level.kind().is_container() {
                trace!(credential_id = %credential_id, level = %level.full_name(), "Searching enclosing folder");
                if let Some(entry) = self.cache.get_directory(&level).await.find(credential_id) {
                    debug!(
                        credential_id = %credential_id,
                        context = %context.full_name(),
                        folder = %level.full_name(),
                        "Credential found in enclosing folder"
                    );
                    let entry = entry.clone();
                    return Some(LocatedEntry { entry, level });
                }
            }
            next = level.enclosing();
        }

        debug!(credential_id = %credential_id, context = %context.full_name(), "Credential not found");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopedConfig;
    use crate::domain::{Item, NamespaceContext};
    use crate::errors::Result;
    use crate::secrets::client::RawResource;
    use crate::secrets::directory::{entries_from_resource, DirectorySource};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves fixed variable paths per context and records every listing
    #[derive(Default)]
    struct FixedSource {
        paths: HashMap<String, Vec<&'static str>>,
        listed: Mutex<Vec<String>>,
    }

    impl FixedSource {
        fn with(mut self, full_name: &str, paths: &[&'static str]) -> Self {
            self.paths.insert(full_name.to_string(), paths.to_vec());
            self
        }

        fn listed(&self) -> Vec<String> {
            self.listed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DirectorySource for FixedSource {
        async fn list_entries(&self, context: &ContextRef) -> Result<Vec<DirectoryEntry>> {
            self.listed.lock().unwrap().push(context.full_name());
            let paths = self.paths.get(&context.full_name()).cloned().unwrap_or_default();
            Ok(paths
                .iter()
                .flat_map(|path| {
                    entries_from_resource(&RawResource {
                        id: format!("acct:variable:{}", path),
                        annotations: vec![],
                    })
                })
                .collect())
        }
    }

    fn walker(source: Arc<FixedSource>) -> CredentialResolutionWalker {
        let cache = CredentialDirectoryCache::new(source, Duration::from_secs(120));
        CredentialResolutionWalker::new(Arc::new(cache))
    }

    #[tokio::test]
    async fn test_found_in_own_directory() {
        let source = Arc::new(FixedSource::default().with("team/deploy", &["db/password"]));
        let job = Item::job_at_path(&Item::root(), "team/deploy").as_context();

        let entry = walker(source.clone()).resolve("db-password", &job).await.unwrap();
        assert_eq!(entry.variable_path, "db/password");
        assert_eq!(source.listed(), vec!["team/deploy"]);
    }

    #[tokio::test]
    async fn test_run_walks_from_job_folder_outward() {
        let source = Arc::new(FixedSource::default().with("org", &["shared/token"]));
        let job = Item::job_at_path(&Item::root(), "org/team/deploy");
        let run = Item::run(&job, 12).as_context();

        let entry = walker(source.clone()).resolve("shared-token", &run).await.unwrap();
        assert_eq!(entry.variable_path, "shared/token");
        assert_eq!(source.listed(), vec!["org/team/deploy", "org/team", "org"]);
    }

    #[tokio::test]
    async fn test_locate_reports_matching_level() {
        let source =
            Arc::new(FixedSource::default().with("org", &["shared/token"]).with("org/team/deploy", &["own"]));
        let job = Item::job_at_path(&Item::root(), "org/team/deploy");
        let run = Item::run(&job, 3).as_context();
        let walker = walker(source);

        let found = walker.locate("shared-token", &run).await.unwrap();
        assert_eq!(found.level.full_name(), "org");
        assert_eq!(found.level.kind(), ContextKind::Folder);

        let own = walker.locate("own", &run).await.unwrap();
        assert_eq!(own.level.full_name(), "org/team/deploy");
        assert_eq!(own.level.kind(), ContextKind::Job);
    }

    #[tokio::test]
    async fn test_nearest_folder_wins() {
        let source = Arc::new(FixedSource::default().with("org", &["token"]).with("org/team", &["token"]));
        let job = Item::job_at_path(&Item::root(), "org/team/deploy").as_context();

        let entry = walker(source.clone()).resolve("token", &job).await.unwrap();
        assert_eq!(entry.id, "token");
        assert_eq!(source.listed(), vec!["org/team/deploy", "org/team"]);
    }

    #[tokio::test]
    async fn test_missing_credential_is_none() {
        let source = Arc::new(FixedSource::default());
        let job = Item::job_at_path(&Item::root(), "a/b/c/job").as_context();

        assert!(walker(source.clone()).resolve("nope", &job).await.is_none());
        assert_eq!(source.listed(), vec!["a/b/c/job", "a/b/c", "a/b", "a"]);
    }

    /// A folder whose enclosing folder is always another copy of itself
    #[derive(Debug)]
    struct EndlessFolder;

    impl NamespaceContext for EndlessFolder {
        fn kind(&self) -> ContextKind {
            ContextKind::Folder
        }

        fn full_name(&self) -> String {
            "x/y".to_string()
        }

        fn enclosing(&self) -> Option<ContextRef> {
            Some(Arc::new(EndlessFolder))
        }

        fn scoped_config(&self) -> Option<ScopedConfig> {
            None
        }
    }

    #[tokio::test]
    async fn test_walk_is_bounded_by_depth() {
        let source = Arc::new(FixedSource::default());
        let context: ContextRef = Arc::new(EndlessFolder);

        assert!(walker(source.clone()).resolve("nope", &context).await.is_none());
        assert_eq!(source.listed(), vec!["x/y"]);
    }
}
