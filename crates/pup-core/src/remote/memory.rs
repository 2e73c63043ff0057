//! In-memory remote store used by tests and the CLI's local-only mode.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::{BatchOp, BatchOpKind, BatchReceipt, RemoteError, RemoteResult, RemoteStore};
use crate::models::{Collection, Record};

/// In-memory document tables with the same observable semantics as the
/// hosted API: server-assigned ids, field-merge updates, atomic batches,
/// and op-uid idempotency. Failure injection hooks make drain/retry paths
/// testable.
#[derive(Default)]
pub struct MemoryRemoteStore {
    tables: Mutex<HashMap<Collection, BTreeMap<String, Record>>>,
    /// op_uid -> server id assigned if the op was a create
    applied: Mutex<HashMap<String, Option<BatchReceipt>>>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
    fail_batches: AtomicU32,
    reject_doc: Mutex<Option<(String, u16)>>,
    query_calls: AtomicU64,
}

impl MemoryRemoteStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) reachability; while unavailable every
    /// call fails with a retryable [`RemoteError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` batch commits with a retryable error.
    pub fn fail_next_batches(&self, n: u32) {
        self.fail_batches.store(n, Ordering::SeqCst);
    }

    /// Terminally reject any batch operation targeting `doc_id` with the
    /// given HTTP-like status.
    pub fn reject_doc_with(&self, doc_id: impl Into<String>, status: u16) {
        *self.lock_reject() = Some((doc_id.into(), status));
    }

    /// Number of `query_by_field` invocations, for cache assertions.
    pub fn query_call_count(&self) -> u64 {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Direct read of a stored document, for assertions.
    pub fn document(&self, collection: Collection, doc_id: &str) -> Option<Record> {
        self.lock_tables()
            .get(&collection)
            .and_then(|table| table.get(doc_id))
            .cloned()
    }

    /// Number of documents in a collection, for assertions.
    pub fn document_count(&self, collection: Collection) -> usize {
        self.lock_tables()
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    fn lock_tables(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<Collection, BTreeMap<String, Record>>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_applied(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, Option<BatchReceipt>>> {
        self.applied.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_reject(&self) -> std::sync::MutexGuard<'_, Option<(String, u16)>> {
        self.reject_doc
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> RemoteResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("remote store offline".into()));
        }
        Ok(())
    }

    fn assign_id(&self) -> String {
        format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn apply_to_table(
        table: &mut BTreeMap<String, Record>,
        op: &BatchOpKind,
        server_id: Option<&str>,
    ) {
        match op {
            BatchOpKind::Create { record, .. } => {
                if let Some(id) = server_id {
                    let mut stored = record.clone();
                    stored.set_id(id);
                    table.insert(id.to_string(), stored);
                }
            }
            BatchOpKind::Patch { doc_id, patch } => {
                let entry = table.entry(doc_id.clone()).or_insert_with(|| {
                    let mut record = Record::new();
                    record.set_id(doc_id.clone());
                    record
                });
                entry.merge(patch);
            }
            BatchOpKind::Delete { doc_id } => {
                table.remove(doc_id);
            }
            BatchOpKind::Increment { doc_id, field, by } => {
                let entry = table.entry(doc_id.clone()).or_insert_with(|| {
                    let mut record = Record::new();
                    record.set_id(doc_id.clone());
                    record
                });
                entry.apply_increment(field, *by);
            }
            BatchOpKind::ArrayUnion {
                doc_id,
                field,
                values,
            } => {
                let entry = table.entry(doc_id.clone()).or_insert_with(|| {
                    let mut record = Record::new();
                    record.set_id(doc_id.clone());
                    record
                });
                entry.apply_array_union(field, values);
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn create(&self, collection: Collection, record: &Record) -> RemoteResult<String> {
        self.check_available()?;

        let id = self.assign_id();
        let mut stored = record.clone();
        stored.set_id(id.clone());
        self.lock_tables()
            .entry(collection)
            .or_default()
            .insert(id.clone(), stored);
        Ok(id)
    }

    async fn get(&self, collection: Collection, doc_id: &str) -> RemoteResult<Option<Record>> {
        self.check_available()?;
        Ok(self.document(collection, doc_id))
    }

    async fn update(
        &self,
        collection: Collection,
        doc_id: &str,
        patch: &Record,
    ) -> RemoteResult<()> {
        self.check_available()?;

        let mut tables = self.lock_tables();
        let table = tables.entry(collection).or_default();
        Self::apply_to_table(
            table,
            &BatchOpKind::Patch {
                doc_id: doc_id.to_string(),
                patch: patch.clone(),
            },
            None,
        );
        Ok(())
    }

    async fn delete(&self, collection: Collection, doc_id: &str) -> RemoteResult<()> {
        self.check_available()?;

        self.lock_tables()
            .entry(collection)
            .or_default()
            .remove(doc_id);
        Ok(())
    }

    async fn query_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
    ) -> RemoteResult<Vec<Record>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        Ok(self
            .lock_tables()
            .get(&collection)
            .map(|table| {
                table
                    .values()
                    .filter(|record| record.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn commit_batch(
        &self,
        collection: Collection,
        ops: Vec<BatchOp>,
    ) -> RemoteResult<Vec<BatchReceipt>> {
        self.check_available()?;

        if self
            .fail_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RemoteError::Unavailable("injected batch failure".into()));
        }

        let mut applied = self.lock_applied();
        let mut tables = self.lock_tables();
        // stage on a scratch copy so a rejection leaves the table untouched
        let mut scratch = tables.get(&collection).cloned().unwrap_or_default();

        let reject = self.lock_reject().clone();
        let mut receipts = Vec::new();
        let mut newly_applied = Vec::new();

        for op in &ops {
            if let Some(prior) = applied.get(&op.op_uid) {
                if let Some(receipt) = prior {
                    receipts.push(receipt.clone());
                }
                continue;
            }

            if let Some((doc_id, status)) = &reject {
                let target = match &op.kind {
                    BatchOpKind::Create { local_id, .. } => local_id,
                    BatchOpKind::Patch { doc_id, .. }
                    | BatchOpKind::Delete { doc_id }
                    | BatchOpKind::Increment { doc_id, .. }
                    | BatchOpKind::ArrayUnion { doc_id, .. } => doc_id,
                };
                if target == doc_id {
                    return Err(RemoteError::api(*status, format!("rejected op on {doc_id}")));
                }
            }

            let receipt = if let BatchOpKind::Create { local_id, .. } = &op.kind {
                let server_id = self.assign_id();
                Some(BatchReceipt {
                    op_uid: op.op_uid.clone(),
                    local_id: local_id.clone(),
                    server_id,
                })
            } else {
                None
            };

            Self::apply_to_table(
                &mut scratch,
                &op.kind,
                receipt.as_ref().map(|r| r.server_id.as_str()),
            );
            if let Some(receipt) = &receipt {
                receipts.push(receipt.clone());
            }
            newly_applied.push((op.op_uid.clone(), receipt));
        }

        tables.insert(collection, scratch);
        for (op_uid, receipt) in newly_applied {
            applied.insert(op_uid, receipt);
        }
        Ok(receipts)
    }

    async fn ping(&self) -> RemoteResult<()> {
        self.check_available()
    }
}
