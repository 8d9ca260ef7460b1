//! Concurrent MongoDB workload engine.
//!
//! Drives a MongoDB deployment with batches of inserts, lookups and updates
//! from independent workers, and reports how long every phase takes. Each run
//! writes into its own database, which is dropped when the run is interrupted.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(MongoStore::connect("mongodb://localhost").await?);
//! let config = WorkloadConfig {
//!     threads: 4,
//!     worker: WorkerConfig::default(),
//!     teardown_grace: Duration::from_secs(1),
//! };
//! let outcome = Supervisor::new(store, Workspace::resolve(false), config)
//!     .run(interrupt_signal())
//!     .await?;
//! ```

pub mod args;
pub mod error;
pub mod keyspace;
pub mod metrics;
pub mod namespace;
pub mod probe;
pub mod record;
pub mod shutdown;
pub mod store;
pub mod supervisor;
pub mod testing;
pub mod worker;

pub use args::{MongoDBWorkloadArgs, WorkloadArgs};
pub use error::WorkloadError;
pub use keyspace::{KeyRange, KeySpace};
pub use metrics::{CycleReport, Phase, PhaseTiming};
pub use namespace::{NamespaceManager, Workspace};
pub use probe::run_diagnostics;
pub use shutdown::{interrupt_signal, ShutdownCoordinator};
pub use store::{DocumentStore, MongoStore};
pub use supervisor::{RunOutcome, Supervisor, WorkloadConfig};
pub use worker::{Worker, WorkerConfig, WorkerExit};
