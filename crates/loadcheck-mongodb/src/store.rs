//! Document store access used by the workload.
//!
//! The engine only issues requests and measures responses, so everything it
//! needs from the store is captured by [`DocumentStore`]. [`MongoStore`] is the
//! production implementation on top of the official driver.

use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::{Client, Collection, IndexModel};
use tracing::debug;

use crate::error::WorkloadError;

/// Operations the workload issues against a document store.
///
/// Every call names the workspace (database) and collection explicitly so a
/// single store handle can be shared by all workers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a single document.
    async fn insert_one(
        &self,
        workspace: &str,
        collection: &str,
        document: Document,
    ) -> Result<(), WorkloadError>;

    /// Return the first document matching `filter`, if any.
    async fn find_one(
        &self,
        workspace: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, WorkloadError>;

    /// Run an aggregation pipeline and collect all results.
    async fn aggregate(
        &self,
        workspace: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, WorkloadError>;

    /// Apply `update` to the first document matching `filter`.
    ///
    /// Returns the number of matched documents.
    async fn update_one(
        &self,
        workspace: &str,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, WorkloadError>;

    /// Count all documents in a collection.
    async fn count_documents(&self, workspace: &str, collection: &str)
        -> Result<u64, WorkloadError>;

    /// Create a single-field ascending index. Must be idempotent.
    async fn create_index(
        &self,
        workspace: &str,
        collection: &str,
        field: &str,
    ) -> Result<(), WorkloadError>;

    /// Drop the whole workspace with all of its collections.
    async fn drop_workspace(&self, workspace: &str) -> Result<(), WorkloadError>;

    /// Run an administrative command against the admin database.
    async fn admin_command(&self, command: Document) -> Result<Document, WorkloadError>;
}

/// [`DocumentStore`] backed by a MongoDB deployment.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    /// Create a store from a MongoDB connection string.
    ///
    /// The driver connects lazily; the first command surfaces connection errors.
    pub async fn connect(connection_string: &str) -> Result<Self, WorkloadError> {
        let client = Client::with_uri_str(connection_string).await?;
        Ok(Self { client })
    }

    /// Create a store with an existing client handle.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn collection(&self, workspace: &str, collection: &str) -> Collection<Document> {
        self.client.database(workspace).collection(collection)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_one(
        &self,
        workspace: &str,
        collection: &str,
        document: Document,
    ) -> Result<(), WorkloadError> {
        self.collection(workspace, collection)
            .insert_one(document)
            .await?;
        Ok(())
    }

    async fn find_one(
        &self,
        workspace: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, WorkloadError> {
        let found = self.collection(workspace, collection).find_one(filter).await?;
        Ok(found)
    }

    async fn aggregate(
        &self,
        workspace: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, WorkloadError> {
        let cursor = self
            .collection(workspace, collection)
            .aggregate(pipeline)
            .await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents)
    }

    async fn update_one(
        &self,
        workspace: &str,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, WorkloadError> {
        let result = self
            .collection(workspace, collection)
            .update_one(filter, update)
            .await?;
        Ok(result.matched_count)
    }

    async fn count_documents(
        &self,
        workspace: &str,
        collection: &str,
    ) -> Result<u64, WorkloadError> {
        let count = self
            .collection(workspace, collection)
            .count_documents(doc! {})
            .await?;
        Ok(count)
    }

    async fn create_index(
        &self,
        workspace: &str,
        collection: &str,
        field: &str,
    ) -> Result<(), WorkloadError> {
        let mut keys = Document::new();
        keys.insert(field, 1);
        let model = IndexModel::builder().keys(keys).build();
        let created = self
            .collection(workspace, collection)
            .create_index(model)
            .await?;
        debug!("Index {} ready on {}.{}", created.index_name, workspace, collection);
        Ok(())
    }

    async fn drop_workspace(&self, workspace: &str) -> Result<(), WorkloadError> {
        self.client.database(workspace).drop().await?;
        Ok(())
    }

    async fn admin_command(&self, command: Document) -> Result<Document, WorkloadError> {
        let reply = self.client.database("admin").run_command(command).await?;
        Ok(reply)
    }
}
