//! Error types for the MongoDB workload engine.

use thiserror::Error;

/// Errors that can occur while driving a workload.
#[derive(Error, Debug)]
pub enum WorkloadError {
    /// MongoDB connection or query error.
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    /// A record could not be encoded as BSON.
    #[error("BSON serialization error: {0}")]
    BsonSerialize(#[from] bson::ser::Error),

    /// A stored document could not be decoded.
    #[error("BSON deserialization error: {0}")]
    BsonDeserialize(#[from] bson::de::Error),

    /// A lookup or update addressed a record that is not in the collection.
    #[error("No document named '{name}' in collection '{collection}'")]
    MissingRecord { collection: String, name: String },

    /// Failure reported by a non-driver store backend.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker task panicked or was cancelled unexpectedly.
    #[error("Worker task failed: {0}")]
    WorkerPanicked(String),
}
