//! In-memory [`DocumentStore`] for tests.
//!
//! Supports exactly what the workload issues: equality filters, `$match`-only
//! pipelines and `$inc` / `$set` updates. Individual operations can be made to
//! fail and every call is counted.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Bson, Document};

use crate::error::WorkloadError;
use crate::store::DocumentStore;

/// Store operations, for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Find,
    Aggregate,
    Update,
    Count,
    CreateIndex,
    DropWorkspace,
    AdminCommand,
}

type Collections = HashMap<String, Vec<Document>>;

#[derive(Default)]
struct State {
    workspaces: HashMap<String, Collections>,
    indexes: HashMap<(String, String), Vec<String>>,
    failing: HashSet<Operation>,
    calls: HashMap<Operation, u64>,
}

/// Thread-safe in-memory document store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    latency: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency` to simulate network round-trips.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Make every later call of `operation` fail.
    pub fn fail_on(&self, operation: Operation) {
        self.state().failing.insert(operation);
    }

    /// Number of times `operation` was invoked.
    pub fn calls(&self, operation: Operation) -> u64 {
        self.state().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Whether the workspace currently holds any collection.
    pub fn has_workspace(&self, workspace: &str) -> bool {
        self.state().workspaces.contains_key(workspace)
    }

    /// Snapshot of a collection's documents.
    pub fn documents(&self, workspace: &str, collection: &str) -> Vec<Document> {
        self.state()
            .workspaces
            .get(workspace)
            .and_then(|collections| collections.get(collection))
            .cloned()
            .unwrap_or_default()
    }

    /// Indexed fields of a collection.
    pub fn indexes(&self, workspace: &str, collection: &str) -> Vec<String> {
        self.state()
            .indexes
            .get(&(workspace.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn begin(&self, operation: Operation) -> Result<(), WorkloadError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut state = self.state();
        *state.calls.entry(operation).or_default() += 1;
        if state.failing.contains(&operation) {
            return Err(WorkloadError::Store(format!(
                "injected failure for {operation:?}"
            )));
        }
        Ok(())
    }
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}

fn field_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    match path.split_once('.') {
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(inner) => field_mut(inner, rest),
            _ => None,
        },
        None => document.get_mut(path),
    }
}

fn set_field(document: &mut Document, path: &str, value: Bson) -> Result<(), WorkloadError> {
    match path.split_once('.') {
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_field(inner, rest, value),
                _ => Err(WorkloadError::Store(format!("'{head}' is not a document"))),
            }
        }
        None => {
            document.insert(path, value);
            Ok(())
        }
    }
}

fn increment(current: &Bson, by: &Bson) -> Result<Bson, WorkloadError> {
    let value = match (current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => Bson::Int32(a + b),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(*a as i64 + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + *b as i64),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        _ => {
            return Err(WorkloadError::Store(format!(
                "cannot increment {current} by {by}"
            )))
        }
    };
    Ok(value)
}

fn apply_update(document: &mut Document, update: &Document) -> Result<(), WorkloadError> {
    for (operator, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| WorkloadError::Store(format!("{operator} expects a document")))?;
        match operator.as_str() {
            "$inc" => {
                for (path, by) in fields {
                    match field_mut(document, path) {
                        Some(current) => *current = increment(current, by)?,
                        None => set_field(document, path, by.clone())?,
                    }
                }
            }
            "$set" => {
                for (path, value) in fields {
                    set_field(document, path, value.clone())?;
                }
            }
            other => {
                return Err(WorkloadError::Store(format!(
                    "unsupported update operator {other}"
                )))
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(
        &self,
        workspace: &str,
        collection: &str,
        document: Document,
    ) -> Result<(), WorkloadError> {
        self.begin(Operation::Insert).await?;
        self.state()
            .workspaces
            .entry(workspace.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(())
    }

    async fn find_one(
        &self,
        workspace: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, WorkloadError> {
        self.begin(Operation::Find).await?;
        Ok(self
            .documents(workspace, collection)
            .into_iter()
            .find(|document| matches(document, &filter)))
    }

    async fn aggregate(
        &self,
        workspace: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, WorkloadError> {
        self.begin(Operation::Aggregate).await?;
        let mut documents = self.documents(workspace, collection);
        for stage in &pipeline {
            let filter = stage
                .get_document("$match")
                .map_err(|_| WorkloadError::Store(format!("unsupported stage {stage}")))?;
            documents.retain(|document| matches(document, filter));
        }
        Ok(documents)
    }

    async fn update_one(
        &self,
        workspace: &str,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, WorkloadError> {
        self.begin(Operation::Update).await?;
        let mut state = self.state();
        let target = state
            .workspaces
            .get_mut(workspace)
            .and_then(|collections| collections.get_mut(collection))
            .and_then(|documents| documents.iter_mut().find(|d| matches(d, &filter)));
        match target {
            Some(document) => {
                apply_update(document, &update)?;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn count_documents(
        &self,
        workspace: &str,
        collection: &str,
    ) -> Result<u64, WorkloadError> {
        self.begin(Operation::Count).await?;
        Ok(self.documents(workspace, collection).len() as u64)
    }

    async fn create_index(
        &self,
        workspace: &str,
        collection: &str,
        field: &str,
    ) -> Result<(), WorkloadError> {
        self.begin(Operation::CreateIndex).await?;
        let mut state = self.state();
        state
            .workspaces
            .entry(workspace.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        let fields = state
            .indexes
            .entry((workspace.to_string(), collection.to_string()))
            .or_default();
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
        Ok(())
    }

    async fn drop_workspace(&self, workspace: &str) -> Result<(), WorkloadError> {
        self.begin(Operation::DropWorkspace).await?;
        let mut state = self.state();
        state.workspaces.remove(workspace);
        state.indexes.retain(|(ws, _), _| ws != workspace);
        Ok(())
    }

    async fn admin_command(&self, command: Document) -> Result<Document, WorkloadError> {
        self.begin(Operation::AdminCommand).await?;
        Ok(doc! {
            "ismaster": true,
            "maxBsonObjectSize": 16_777_216,
            "command": command,
            "ok": 1.0,
        })
    }
}
