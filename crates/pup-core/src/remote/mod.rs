//! Remote document store capability.
//!
//! The remote store is consumed as a trait: collection-scoped CRUD, equality
//! queries, and atomic per-collection batch writes. The HTTP implementation
//! talks to the hosted document API; the in-memory implementation backs tests
//! and the CLI's local-only mode.

mod http;
mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Collection, OpKind, PendingOp, Record};

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

/// Result type alias for remote store operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Retry policy class for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Transient; safe to retry on the next drain trigger.
    Retryable,
    /// Semantic rejection; retrying will never succeed.
    Terminal,
}

/// Errors that can occur talking to the remote document store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the document service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Remote store unreachable
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// Invalid request (missing required data, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify the failure for the drain retry policy.
    pub const fn retry_class(&self) -> RetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                408 | 429 | 500..=599 => RetryClass::Retryable,
                _ => RetryClass::Terminal,
            },
            Self::Http(_) | Self::Unavailable(_) => RetryClass::Retryable,
            Self::Json(_) | Self::InvalidRequest(_) => RetryClass::Terminal,
        }
    }

    /// Whether a retry on the next trigger can succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.retry_class(), RetryClass::Retryable)
    }
}

/// One entry of an atomic per-collection batch write.
///
/// `op_uid` is an idempotency key: a store that already applied it must skip
/// the operation (returning the original receipt for creates), which makes
/// replaying a whole batch after a partial drain failure safe, including
/// for increments and array unions.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOp {
    pub op_uid: String,
    pub kind: BatchOpKind,
}

/// The mutation carried by a [`BatchOp`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOpKind {
    /// Create with a server-assigned id; `local_id` is the placeholder the
    /// client stored the record under while offline.
    Create { local_id: String, record: Record },
    /// Field-merge update (upsert semantics).
    Patch { doc_id: String, patch: Record },
    /// Delete by id; absent documents are a no-op.
    Delete { doc_id: String },
    /// Numeric increment of a single field.
    Increment {
        doc_id: String,
        field: String,
        by: i64,
    },
    /// Array union of values into a single field.
    ArrayUnion {
        doc_id: String,
        field: String,
        values: Vec<Value>,
    },
}

impl TryFrom<&PendingOp> for BatchOp {
    type Error = RemoteError;

    fn try_from(op: &PendingOp) -> RemoteResult<Self> {
        let kind = match op.kind {
            OpKind::Add => BatchOpKind::Create {
                local_id: op.doc_id.clone(),
                record: op
                    .data
                    .clone()
                    .ok_or_else(|| RemoteError::InvalidRequest("add op without data".into()))?,
            },
            OpKind::Update => BatchOpKind::Patch {
                doc_id: op.doc_id.clone(),
                patch: op
                    .data
                    .clone()
                    .ok_or_else(|| RemoteError::InvalidRequest("update op without data".into()))?,
            },
            OpKind::Delete => BatchOpKind::Delete {
                doc_id: op.doc_id.clone(),
            },
            OpKind::Increment => BatchOpKind::Increment {
                doc_id: op.doc_id.clone(),
                field: op
                    .field
                    .clone()
                    .ok_or_else(|| RemoteError::InvalidRequest("increment op without field".into()))?,
                by: op
                    .value
                    .as_ref()
                    .and_then(Value::as_i64)
                    .ok_or_else(|| {
                        RemoteError::InvalidRequest("increment op without integer amount".into())
                    })?,
            },
            OpKind::ArrayUnion => BatchOpKind::ArrayUnion {
                doc_id: op.doc_id.clone(),
                field: op
                    .field
                    .clone()
                    .ok_or_else(|| {
                        RemoteError::InvalidRequest("arrayUnion op without field".into())
                    })?,
                values: match op.value.clone() {
                    Some(Value::Array(values)) => values,
                    _ => {
                        return Err(RemoteError::InvalidRequest(
                            "arrayUnion op without value array".into(),
                        ))
                    }
                },
            },
        };

        Ok(Self {
            op_uid: op.op_uid.clone(),
            kind,
        })
    }
}

/// Receipt for a committed create: maps the client's placeholder id to the
/// server-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReceipt {
    pub op_uid: String,
    pub local_id: String,
    pub server_id: String,
}

/// Capability surface of the remote document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a document; the store assigns and returns its id.
    async fn create(&self, collection: Collection, record: &Record) -> RemoteResult<String>;

    /// Fetch a document by id.
    async fn get(&self, collection: Collection, doc_id: &str) -> RemoteResult<Option<Record>>;

    /// Field-merge a patch into a document (upsert semantics).
    async fn update(&self, collection: Collection, doc_id: &str, patch: &Record)
        -> RemoteResult<()>;

    /// Delete a document by id; absent documents are a no-op.
    async fn delete(&self, collection: Collection, doc_id: &str) -> RemoteResult<()>;

    /// All documents whose field equals `value`.
    async fn query_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
    ) -> RemoteResult<Vec<Record>>;

    /// Atomically apply a batch of operations to one collection. Receipts
    /// are returned for creates. Operations whose `op_uid` was already
    /// applied are skipped (their original receipts re-returned).
    async fn commit_batch(
        &self,
        collection: Collection,
        ops: Vec<BatchOp>,
    ) -> RemoteResult<Vec<BatchReceipt>>;

    /// Liveness probe.
    async fn ping(&self) -> RemoteResult<()>;
}
