//! Workspace (database) lifecycle: naming, index provisioning and teardown.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use crate::error::WorkloadError;
use crate::record::ROBOTS;
use crate::store::DocumentStore;

/// Name shared by every workspace; seed runs use it as-is.
pub const WORKSPACE_PREFIX: &str = "_LOADCHECK_";

/// Field carrying the lookup index.
pub const INDEXED_FIELD: &str = "name";

/// The database under which one run's collections live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace(String);

impl Workspace {
    /// Fixed workspace used for seeding the demo dataset.
    pub fn seed() -> Self {
        Self(WORKSPACE_PREFIX.to_string())
    }

    /// Fresh workspace with a random 8 hex digit suffix.
    pub fn ephemeral<R: Rng>(rng: &mut R) -> Self {
        let suffix: [u8; 4] = rng.random();
        Self(format!("{WORKSPACE_PREFIX}{}", hex::encode_upper(suffix)))
    }

    /// Resolve the workspace for a run, once, at startup.
    pub fn resolve(seed_mode: bool) -> Self {
        if seed_mode {
            Self::seed()
        } else {
            Self::ephemeral(&mut rand::rng())
        }
    }

    /// Workspace with an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owns the index and the destruction of a workspace.
pub struct NamespaceManager<S: ?Sized> {
    store: Arc<S>,
    workspace: Workspace,
    torn_down: AtomicBool,
}

impl<S: DocumentStore + ?Sized> NamespaceManager<S> {
    pub fn new(store: Arc<S>, workspace: Workspace) -> Self {
        Self {
            store,
            workspace,
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Create the ascending index on the robots' `name` field.
    ///
    /// Failures are logged and reported back; callers keep going without a
    /// guaranteed index.
    pub async fn provision_index(&self) -> Result<(), WorkloadError> {
        info!(
            "Creating index {{{}: 1}} on {}.{}",
            INDEXED_FIELD, self.workspace, ROBOTS
        );
        let result = self
            .store
            .create_index(self.workspace.name(), ROBOTS, INDEXED_FIELD)
            .await;
        if let Err(e) = &result {
            warn!(
                "Failed to create index on {}.{}: {}. Indexed and unindexed timings are not comparable",
                self.workspace, ROBOTS, e
            );
        }
        result
    }

    /// Drop the whole workspace after waiting `grace` for abandoned writes.
    ///
    /// Runs at most once; later calls return immediately. Failures are logged
    /// and returned so the caller can still exit.
    pub async fn teardown(&self, grace: Duration) -> Result<(), WorkloadError> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !grace.is_zero() {
            tokio::time::sleep(grace).await;
        }
        info!("Dropping database {}", self.workspace);
        let result = self.store.drop_workspace(self.workspace.name()).await;
        if let Err(e) = &result {
            error!("Failed to drop database {}: {}", self.workspace, e);
        }
        result
    }

    /// Whether teardown has already run.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, Operation};
    use bson::doc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_workspace_names() {
        assert_eq!(Workspace::resolve(true).name(), "_LOADCHECK_");

        let mut rng = StdRng::seed_from_u64(1);
        let name = Workspace::ephemeral(&mut rng).to_string();
        let suffix = name.strip_prefix(WORKSPACE_PREFIX).unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));

        let other = Workspace::resolve(false);
        assert!(other.name().starts_with(WORKSPACE_PREFIX));
    }

    #[tokio::test]
    async fn test_provision_index_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let manager = NamespaceManager::new(store.clone(), Workspace::named("ws"));
        manager.provision_index().await.unwrap();
        manager.provision_index().await.unwrap();
        assert_eq!(store.indexes("ws", ROBOTS), vec!["name".to_string()]);
    }

    #[tokio::test]
    async fn test_provision_index_failure_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.fail_on(Operation::CreateIndex);
        let manager = NamespaceManager::new(store.clone(), Workspace::named("ws"));
        assert!(manager.provision_index().await.is_err());
    }

    #[tokio::test]
    async fn test_teardown_empty_workspace() {
        let store = Arc::new(MemoryStore::new());
        let manager = NamespaceManager::new(store.clone(), Workspace::named("never-written"));
        manager.teardown(Duration::ZERO).await.unwrap();
        assert!(manager.is_torn_down());
        manager.teardown(Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_teardown_drops_all_collections() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_one("ws", ROBOTS, doc! { "name": "Robot-1" })
            .await
            .unwrap();
        store
            .insert_one("ws", "brands", doc! { "name": "Robot-1" })
            .await
            .unwrap();
        let manager = NamespaceManager::new(store.clone(), Workspace::named("ws"));
        manager.teardown(Duration::ZERO).await.unwrap();
        assert!(!store.has_workspace("ws"));
    }

    #[tokio::test]
    async fn test_teardown_runs_once() {
        let store = Arc::new(MemoryStore::new());
        let manager = NamespaceManager::new(store.clone(), Workspace::named("ws"));
        manager.teardown(Duration::ZERO).await.unwrap();
        store
            .insert_one("ws", ROBOTS, doc! { "name": "late" })
            .await
            .unwrap();
        manager.teardown(Duration::ZERO).await.unwrap();
        assert!(store.has_workspace("ws"));
    }
}
