//! Queued mutation model for the durable sync queue.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use uuid::Uuid;

use super::record::{Collection, Record};
use crate::util::unix_timestamp_ms;

/// The kind of mutation captured while the remote store was unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Update,
    Delete,
    Increment,
    ArrayUnion,
}

impl OpKind {
    /// Wire name of the operation kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Increment => "increment",
            Self::ArrayUnion => "arrayUnion",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "increment" => Ok(Self::Increment),
            "arrayUnion" => Ok(Self::ArrayUnion),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown operation kind: {other}"
            ))),
        }
    }
}

/// A pending mutation awaiting replay against the remote store.
///
/// `id` is the queue's autoincrement key and only establishes FIFO order;
/// `op_uid` is a globally unique idempotency key the remote store uses to
/// skip operations it has already applied when a drain is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOp {
    pub id: i64,
    pub op_uid: String,
    pub kind: OpKind,
    pub collection: Collection,
    pub doc_id: String,
    pub data: Option<Record>,
    pub field: Option<String>,
    pub value: Option<Value>,
    pub queued_at: i64,
}

impl PendingOp {
    fn blank(kind: OpKind, collection: Collection, doc_id: impl Into<String>) -> Self {
        Self {
            id: 0,
            op_uid: Uuid::now_v7().to_string(),
            kind,
            collection,
            doc_id: doc_id.into(),
            data: None,
            field: None,
            value: None,
            queued_at: unix_timestamp_ms(),
        }
    }

    /// Capture an offline create. The record already carries its placeholder id.
    #[must_use]
    pub fn add(collection: Collection, record: Record) -> Self {
        let doc_id = record.id().unwrap_or_default().to_string();
        let mut op = Self::blank(OpKind::Add, collection, doc_id);
        op.data = Some(record);
        op
    }

    /// Capture an offline field-merge update.
    #[must_use]
    pub fn update(collection: Collection, doc_id: impl Into<String>, patch: Record) -> Self {
        let mut op = Self::blank(OpKind::Update, collection, doc_id);
        op.data = Some(patch);
        op
    }

    /// Capture an offline delete.
    #[must_use]
    pub fn delete(collection: Collection, doc_id: impl Into<String>) -> Self {
        Self::blank(OpKind::Delete, collection, doc_id)
    }

    /// Capture an offline numeric increment.
    #[must_use]
    pub fn increment(
        collection: Collection,
        doc_id: impl Into<String>,
        field: impl Into<String>,
        by: i64,
    ) -> Self {
        let mut op = Self::blank(OpKind::Increment, collection, doc_id);
        op.field = Some(field.into());
        op.value = Some(Value::from(by));
        op
    }

    /// Capture an offline array union.
    #[must_use]
    pub fn array_union(
        collection: Collection,
        doc_id: impl Into<String>,
        field: impl Into<String>,
        values: Vec<Value>,
    ) -> Self {
        let mut op = Self::blank(OpKind::ArrayUnion, collection, doc_id);
        op.field = Some(field.into());
        op.value = Some(Value::Array(values));
        op
    }
}

/// A queued mutation the remote store rejected for a non-transient reason,
/// moved aside so the rest of the queue can keep draining.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub id: i64,
    pub op_uid: String,
    pub kind: OpKind,
    pub collection: Collection,
    pub doc_id: String,
    pub data: Option<Record>,
    pub field: Option<String>,
    pub value: Option<Value>,
    pub queued_at: i64,
    pub failed_at: i64,
    pub reason: String,
}
