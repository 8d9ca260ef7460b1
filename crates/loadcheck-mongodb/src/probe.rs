//! Cluster diagnostics run before any worker starts.

use bson::{doc, Bson, Document};

use crate::error::WorkloadError;
use crate::store::DocumentStore;

/// Run `isMaster` against the admin database.
///
/// This is the first round-trip of a run, so connection problems surface here.
pub async fn server_status<S: DocumentStore + ?Sized>(
    store: &S,
) -> Result<Document, WorkloadError> {
    store.admin_command(doc! { "isMaster": 1 }).await
}

/// Render an admin reply as indented relaxed extended JSON.
pub fn pretty_print(reply: &Document) -> Result<String, WorkloadError> {
    let json = Bson::Document(reply.clone()).into_relaxed_extjson();
    serde_json::to_string_pretty(&json)
        .map_err(|e| WorkloadError::Store(format!("Failed to render admin reply: {e}")))
}

/// Print the cluster status to stdout.
///
/// Returns `true` when the caller asked for diagnostics only and should stop.
pub async fn run_diagnostics<S: DocumentStore + ?Sized>(
    store: &S,
    info_only: bool,
) -> Result<bool, WorkloadError> {
    let reply = server_status(store).await?;
    println!("{}", pretty_print(&reply)?);
    Ok(info_only)
}
