//! Launches the workers and races them against the shutdown signal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::WorkloadError;
use crate::namespace::{NamespaceManager, Workspace};
use crate::shutdown::ShutdownCoordinator;
use crate::store::DocumentStore;
use crate::worker::{Worker, WorkerConfig, WorkerExit};

/// Settings of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadConfig {
    /// Number of concurrent workers.
    pub threads: usize,
    pub worker: WorkerConfig,
    /// Delay between the interrupt and dropping the workspace.
    pub teardown_grace: Duration,
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<(), WorkloadError> {
        if self.threads == 0 {
            return Err(WorkloadError::Config(
                "at least one worker thread is required".to_string(),
            ));
        }
        if self.worker.batch_size == 0 {
            return Err(WorkloadError::Config(
                "batch size must be greater than zero".to_string(),
            ));
        }
        if self.worker.max_cycles == Some(0) {
            return Err(WorkloadError::Config(
                "cycle limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a run ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every worker finished its seed pass.
    Seeded,
    /// Every worker reached its cycle limit.
    Completed,
    /// The shutdown signal fired and the workspace was torn down.
    Interrupted,
}

pub struct Supervisor<S: ?Sized> {
    store: Arc<S>,
    namespace: Arc<NamespaceManager<S>>,
    config: WorkloadConfig,
}

impl<S: DocumentStore + ?Sized + 'static> Supervisor<S> {
    pub fn new(store: Arc<S>, workspace: Workspace, config: WorkloadConfig) -> Self {
        let namespace = Arc::new(NamespaceManager::new(store.clone(), workspace));
        Self {
            store,
            namespace,
            config,
        }
    }

    /// Provision the index, start the workers and wait for them or `shutdown`.
    ///
    /// A worker error aborts the remaining workers and is returned as is. When
    /// `shutdown` resolves first, workers are abandoned mid-operation and the
    /// workspace is dropped before returning. A bounded run drops its workspace
    /// once every worker is done; seed runs keep theirs.
    pub async fn run<F>(self, shutdown: F) -> Result<RunOutcome, WorkloadError>
    where
        F: Future<Output = ()>,
    {
        self.config.validate()?;
        let workspace = self.namespace.workspace().clone();
        info!("Populate data under database {}", workspace);

        let coordinator =
            ShutdownCoordinator::new(self.namespace.clone(), self.config.teardown_grace);
        tokio::pin!(shutdown);

        // Polling once installs the signal handlers before the workspace exists.
        if futures::poll!(&mut shutdown).is_ready() {
            coordinator.teardown().await;
            return Ok(RunOutcome::Interrupted);
        }

        if let Err(e) = self.namespace.provision_index().await {
            debug!("Continuing without index on {}: {}", workspace, e);
        }

        let threads = self.config.threads;
        let mut workers = JoinSet::new();
        for id in 0..threads {
            let worker = Worker::new(
                id,
                threads,
                self.store.clone(),
                workspace.clone(),
                self.config.worker.clone(),
            );
            workers.spawn(worker.run());
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    workers.abort_all();
                    coordinator.teardown().await;
                    return Ok(RunOutcome::Interrupted);
                }
                joined = workers.join_next() => match joined {
                    None if self.config.worker.seed_mode => return Ok(RunOutcome::Seeded),
                    None => {
                        coordinator.teardown().await;
                        return Ok(RunOutcome::Completed);
                    }
                    Some(Ok(Ok(exit))) => match exit {
                        WorkerExit::Seeded => debug!("Worker finished its seed pass"),
                        WorkerExit::Completed { cycles } => {
                            debug!("Worker finished after {} cycles", cycles)
                        }
                    },
                    Some(Ok(Err(e))) => {
                        error!("Workload aborted: {}", e);
                        workers.abort_all();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Worker task failed: {}", e);
                        workers.abort_all();
                        return Err(WorkloadError::WorkerPanicked(e.to_string()));
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BRANDS, ROBOTS};
    use std::sync::OnceLock;
    use std::task::Poll;
    use crate::testing::{MemoryStore, Operation};

    fn config(threads: usize, worker: WorkerConfig) -> WorkloadConfig {
        WorkloadConfig {
            threads,
            worker: WorkerConfig {
                rng_seed: Some(1),
                cycle_pause: Duration::ZERO,
                ..worker
            },
            teardown_grace: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_seed_run_waits_for_every_worker() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = Supervisor::new(
            store.clone(),
            Workspace::seed(),
            config(
                3,
                WorkerConfig {
                    batch_size: 4,
                    document_size: 8,
                    seed_mode: true,
                    ..Default::default()
                },
            ),
        );
        let outcome = supervisor.run(std::future::pending()).await.unwrap();
        assert_eq!(outcome, RunOutcome::Seeded);
        assert_eq!(store.documents("_LOADCHECK_", ROBOTS).len(), 12);
        assert_eq!(store.documents("_LOADCHECK_", BRANDS).len(), 12);
        assert!(store.has_workspace("_LOADCHECK_"));
    }

    #[tokio::test]
    async fn test_bounded_run_completes() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = Supervisor::new(
            store.clone(),
            Workspace::named("ws"),
            config(
                2,
                WorkerConfig {
                    batch_size: 3,
                    document_size: 8,
                    max_cycles: Some(2),
                    ..Default::default()
                },
            ),
        );
        assert_eq!(
            supervisor.run(std::future::pending()).await.unwrap(),
            RunOutcome::Completed
        );
        assert_eq!(store.calls(Operation::Insert), 12);
        assert_eq!(store.calls(Operation::CreateIndex), 1);
    }

    #[tokio::test]
    async fn test_bounded_run_drops_ephemeral_workspace() {
        let store = Arc::new(MemoryStore::new());
        let workspace = Workspace::resolve(false);
        let name = workspace.name().to_string();
        let supervisor = Supervisor::new(
            store.clone(),
            workspace,
            config(
                1,
                WorkerConfig {
                    batch_size: 4,
                    document_size: 8,
                    max_cycles: Some(1),
                    ..Default::default()
                },
            ),
        );
        assert_eq!(
            supervisor.run(std::future::pending()).await.unwrap(),
            RunOutcome::Completed
        );
        assert_eq!(store.calls(Operation::Insert), 4);
        assert_eq!(store.calls(Operation::DropWorkspace), 1);
        assert!(!store.has_workspace(&name));
    }

    #[tokio::test]
    async fn test_shutdown_is_armed_before_index_creation() {
        let store = Arc::new(MemoryStore::new());
        let index_calls_at_first_poll = Arc::new(OnceLock::new());
        let shutdown = {
            let store = store.clone();
            let seen = index_calls_at_first_poll.clone();
            std::future::poll_fn(move |_| {
                seen.get_or_init(|| store.calls(Operation::CreateIndex));
                Poll::<()>::Pending
            })
        };
        let supervisor = Supervisor::new(
            store.clone(),
            Workspace::named("ws"),
            config(
                1,
                WorkerConfig {
                    batch_size: 2,
                    document_size: 8,
                    max_cycles: Some(1),
                    ..Default::default()
                },
            ),
        );
        supervisor.run(shutdown).await.unwrap();
        assert_eq!(index_calls_at_first_poll.get(), Some(&0));
        assert_eq!(store.calls(Operation::CreateIndex), 1);
    }

    #[tokio::test]
    async fn test_immediate_shutdown_skips_workers() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = Supervisor::new(
            store.clone(),
            Workspace::named("ws"),
            config(2, WorkerConfig::default()),
        );
        assert_eq!(
            supervisor.run(std::future::ready(())).await.unwrap(),
            RunOutcome::Interrupted
        );
        assert_eq!(store.calls(Operation::CreateIndex), 0);
        assert_eq!(store.calls(Operation::Insert), 0);
        assert_eq!(store.calls(Operation::DropWorkspace), 1);
    }

    #[tokio::test]
    async fn test_index_failure_is_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.fail_on(Operation::CreateIndex);
        let supervisor = Supervisor::new(
            store.clone(),
            Workspace::named("ws"),
            config(
                1,
                WorkerConfig {
                    batch_size: 2,
                    document_size: 8,
                    max_cycles: Some(1),
                    ..Default::default()
                },
            ),
        );
        assert_eq!(
            supervisor.run(std::future::pending()).await.unwrap(),
            RunOutcome::Completed
        );
    }

    #[tokio::test]
    async fn test_worker_error_aborts_run() {
        let store = Arc::new(MemoryStore::new());
        store.fail_on(Operation::Update);
        let supervisor = Supervisor::new(
            store.clone(),
            Workspace::named("ws"),
            config(2, WorkerConfig::default()),
        );
        let result = supervisor.run(std::future::pending()).await;
        assert!(matches!(result, Err(WorkloadError::Store(_))));
        // a failed run leaves its data behind
        assert!(store.has_workspace("ws"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let supervisor = Supervisor::new(
            store.clone(),
            Workspace::named("ws"),
            config(0, WorkerConfig::default()),
        );
        assert!(matches!(
            supervisor.run(std::future::pending()).await,
            Err(WorkloadError::Config(_))
        ));
        assert_eq!(store.calls(Operation::CreateIndex), 0);
    }
}
