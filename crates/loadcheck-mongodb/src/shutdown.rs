//! Interrupt handling and workspace teardown.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::namespace::NamespaceManager;
use crate::store::DocumentStore;

/// Resolves once the process receives Ctrl+C or, on unix, SIGTERM.
pub async fn interrupt_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received interrupt signal (Ctrl+C)"),
        _ = terminate => info!("Received terminate signal"),
    }
}

/// Tears the workspace down once the run is interrupted or a bounded run ends.
pub struct ShutdownCoordinator<S: ?Sized> {
    namespace: Arc<NamespaceManager<S>>,
    grace: Duration,
}

impl<S: DocumentStore + ?Sized> ShutdownCoordinator<S> {
    pub fn new(namespace: Arc<NamespaceManager<S>>, grace: Duration) -> Self {
        Self { namespace, grace }
    }

    /// Drop the workspace. Best effort: failures are logged by the namespace
    /// manager and never stop the caller from exiting.
    pub async fn teardown(&self) {
        info!("Cleaning up database {}", self.namespace.workspace());
        if self.namespace.teardown(self.grace).await.is_err() {
            warn!(
                "Database {} may still exist and must be dropped manually",
                self.namespace.workspace()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Workspace;
    use crate::record::ROBOTS;
    use crate::testing::{MemoryStore, Operation};
    use bson::doc;

    #[tokio::test]
    async fn test_teardown_drops_workspace_once() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_one("ws", ROBOTS, doc! { "name": "Robot-0" })
            .await
            .unwrap();
        let namespace = Arc::new(NamespaceManager::new(store.clone(), Workspace::named("ws")));
        let coordinator = ShutdownCoordinator::new(namespace.clone(), Duration::ZERO);

        coordinator.teardown().await;
        coordinator.teardown().await;

        assert!(!store.has_workspace("ws"));
        assert!(namespace.is_torn_down());
        assert_eq!(store.calls(Operation::DropWorkspace), 1);
    }

    #[tokio::test]
    async fn test_failed_drop_does_not_panic() {
        let store = Arc::new(MemoryStore::new());
        store.fail_on(Operation::DropWorkspace);
        let namespace = Arc::new(NamespaceManager::new(store.clone(), Workspace::named("ws")));
        ShutdownCoordinator::new(namespace, Duration::ZERO)
            .teardown()
            .await;
        assert_eq!(store.calls(Operation::DropWorkspace), 1);
    }
}
