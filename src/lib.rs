//! mongo-loadcheck library
//!
//! A workload generator that drives MongoDB with concurrent batches of
//! inserts, lookups and updates and logs the latency of every phase.
//!
//! # Modes
//!
//! - Benchmark (default): each worker loops over insert, `$match`, indexed
//!   find, unindexed find, `$inc` and `$set` phases in a fresh random database
//!   until Ctrl+C, which drops that database.
//! - Seed (`--seed`): one insert pass plus one brand per robot into the fixed
//!   `_LOADCHECK_` database, which is kept.
//! - Info (`--info`): print the `isMaster` reply and exit.
//!
//! # CLI Usage
//!
//! ```bash
//! mongo-loadcheck --mongodb-connection-string mongodb://localhost -t 4 --batch-size 512
//! mongo-loadcheck --seed --batch-size 1000
//! mongo-loadcheck --info
//! ```

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use loadcheck_mongodb::{
    interrupt_signal, run_diagnostics, DocumentStore, MongoDBWorkloadArgs, MongoStore, RunOutcome,
    Supervisor, WorkloadArgs, Workspace,
};

pub mod logging;

pub use loadcheck_mongodb as workload;

/// How the process finished successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Only diagnostics were requested.
    Diagnostics,
    /// The workload ran and ended this way.
    Workload(RunOutcome),
}

/// Connect to MongoDB and run the workload until it ends or the process is
/// interrupted.
pub async fn run(args: MongoDBWorkloadArgs) -> anyhow::Result<Completion> {
    let store = MongoStore::connect(&args.mongodb_connection_string)
        .await
        .with_context(|| {
            format!(
                "Failed to create MongoDB client for {}",
                logging::mask_connection_password(&args.mongodb_connection_string)
            )
        })?;
    run_with_store(Arc::new(store), &args.workload, interrupt_signal()).await
}

/// Run diagnostics and then the workload on any store, stopping at `shutdown`.
pub async fn run_with_store<S, F>(
    store: Arc<S>,
    args: &WorkloadArgs,
    shutdown: F,
) -> anyhow::Result<Completion>
where
    S: DocumentStore + ?Sized + 'static,
    F: Future<Output = ()>,
{
    let stop = run_diagnostics(&*store, args.info)
        .await
        .context("Failed to query cluster info")?;
    if stop {
        return Ok(Completion::Diagnostics);
    }

    let config = args.to_config().context("Invalid workload configuration")?;

    let workspace = Workspace::resolve(args.seed);
    let outcome = Supervisor::new(store, workspace, config)
        .run(shutdown)
        .await
        .context("Workload aborted")?;
    Ok(Completion::Workload(outcome))
}
