//! Bidirectional reconciliation between the local store and the remote store.
//!
//! Push (drain) replays the durable operation queue as one atomic batch per
//! collection; pull overwrites local records with the remote state for one
//! user. Both run under the same async lock, so a sync requested mid-drain
//! waits instead of racing.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::db::{Database, QueueStore, RecordStore};
use crate::error::{Error, Result};
use crate::models::{Collection, DeadLetter, PendingOp};
use crate::remote::{BatchOp, BatchReceipt, RemoteStore};

/// Outcome of one queue drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations committed to the remote store and removed from the queue.
    pub committed: usize,
    /// Operations moved to the dead-letter table after a terminal rejection.
    pub dead_lettered: usize,
}

/// Outcome of a full push+pull cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub drain: DrainReport,
    /// Records overwritten locally by the pull.
    pub pulled: usize,
}

/// Orchestrates queue drains and full-collection pulls for one database.
pub struct SyncEngine {
    db: Arc<Mutex<Database>>,
    remote: Arc<dyn RemoteStore>,
    // serializes push against pull, and overlapping drains against each other
    lock: Mutex<()>,
}

impl SyncEngine {
    /// Create an engine over the shared database and remote store.
    pub fn new(db: Arc<Mutex<Database>>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            db,
            remote,
            lock: Mutex::new(()),
        }
    }

    /// Full reconciliation for a user: drain the queue, then pull.
    ///
    /// A retryable drain failure aborts the cycle with the queue intact;
    /// the next trigger retries the whole drain.
    pub async fn sync(&self, user_id: &str) -> Result<SyncReport> {
        let _guard = self.lock.lock().await;
        let drain = self.drain_locked().await?;
        let pulled = self.pull_locked(user_id).await?;
        Ok(SyncReport { drain, pulled })
    }

    /// Replay the operation queue against the remote store.
    pub async fn drain(&self) -> Result<DrainReport> {
        let _guard = self.lock.lock().await;
        self.drain_locked().await
    }

    /// Overwrite local records with the remote state for one user.
    pub async fn pull(&self, user_id: &str) -> Result<usize> {
        let _guard = self.lock.lock().await;
        self.pull_locked(user_id).await
    }

    /// Number of operations awaiting replay.
    pub async fn pending_count(&self) -> Result<i64> {
        let db = self.db.lock().await;
        QueueStore::new(db.connection()).count().await
    }

    /// Terminally rejected operations, most recent first.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let db = self.db.lock().await;
        QueueStore::new(db.connection()).dead_letters().await
    }

    /// Periodically log the pending-operation count. The returned handle
    /// must be aborted at teardown.
    pub fn spawn_pending_heartbeat(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // consume the immediate first tick
            loop {
                ticker.tick().await;
                match engine.pending_count().await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!("{count} operations pending sync"),
                    Err(error) => tracing::warn!("Pending-sync check failed: {error}"),
                }
            }
        })
    }

    async fn drain_locked(&self) -> Result<DrainReport> {
        let ops = {
            let db = self.db.lock().await;
            QueueStore::new(db.connection()).all().await?
        };
        if ops.is_empty() {
            return Ok(DrainReport::default());
        }
        tracing::debug!("Draining {} queued operations", ops.len());

        // group by collection, preserving FIFO inside each group and
        // first-appearance order across groups
        let mut groups: Vec<(Collection, Vec<PendingOp>)> = Vec::new();
        for op in ops {
            match groups.iter_mut().find(|(c, _)| *c == op.collection) {
                Some((_, group)) => group.push(op),
                None => groups.push((op.collection, vec![op])),
            }
        }

        let mut receipts: Vec<(Collection, BatchReceipt)> = Vec::new();
        let mut drained: Vec<i64> = Vec::new();
        let mut dead_lettered = 0usize;

        for (collection, group) in &groups {
            dead_lettered += self
                .commit_group(*collection, group, &mut receipts, &mut drained)
                .await?;
        }

        // every batch confirmed: migrate placeholder ids, then dequeue
        let db = self.db.lock().await;
        let store = RecordStore::new(db.connection());
        for (collection, receipt) in &receipts {
            if receipt.local_id == receipt.server_id {
                continue;
            }
            if let Some(mut record) = store.get(*collection, &receipt.local_id).await? {
                store.delete(*collection, &receipt.local_id).await?;
                record.set_id(receipt.server_id.clone());
                store.put(*collection, &record).await?;
                tracing::debug!(
                    "Reassigned {collection} record {} -> {}",
                    receipt.local_id,
                    receipt.server_id
                );
            }
        }
        QueueStore::new(db.connection()).remove(&drained).await?;

        tracing::info!(
            "Drained {} operations ({dead_lettered} dead-lettered)",
            drained.len()
        );
        Ok(DrainReport {
            committed: drained.len(),
            dead_lettered,
        })
    }

    /// Commit one collection's operations as a single atomic batch.
    ///
    /// A retryable failure aborts the whole drain (queue untouched). A
    /// terminal batch rejection falls back to committing operations one at a
    /// time to isolate the offender, which is moved to the dead-letter
    /// table. Returns the number of operations buried.
    async fn commit_group(
        &self,
        collection: Collection,
        group: &[PendingOp],
        receipts: &mut Vec<(Collection, BatchReceipt)>,
        drained: &mut Vec<i64>,
    ) -> Result<usize> {
        let mut buried = 0usize;
        let mut batch = Vec::new();
        let mut convertible = Vec::new();

        for op in group {
            match BatchOp::try_from(op) {
                Ok(batch_op) => {
                    batch.push(batch_op);
                    convertible.push(op);
                }
                Err(error) => {
                    // malformed on disk; retrying can never succeed
                    self.bury(op, &error.to_string()).await?;
                    buried += 1;
                }
            }
        }
        if batch.is_empty() {
            return Ok(buried);
        }

        match self.remote.commit_batch(collection, batch.clone()).await {
            Ok(batch_receipts) => {
                receipts.extend(batch_receipts.into_iter().map(|r| (collection, r)));
                drained.extend(convertible.iter().map(|op| op.id));
                Ok(buried)
            }
            Err(error) if error.is_retryable() => Err(Error::Remote(error)),
            Err(error) => {
                tracing::warn!(
                    "Batch for {collection} rejected ({error}); committing operations individually"
                );
                for (op, batch_op) in convertible.iter().zip(batch) {
                    match self.remote.commit_batch(collection, vec![batch_op]).await {
                        Ok(batch_receipts) => {
                            receipts.extend(batch_receipts.into_iter().map(|r| (collection, r)));
                            drained.push(op.id);
                        }
                        Err(error) if error.is_retryable() => return Err(Error::Remote(error)),
                        Err(error) => {
                            self.bury(op, &error.to_string()).await?;
                            buried += 1;
                        }
                    }
                }
                Ok(buried)
            }
        }
    }

    async fn bury(&self, op: &PendingOp, reason: &str) -> Result<()> {
        let db = self.db.lock().await;
        QueueStore::new(db.connection()).bury(op, reason).await
    }

    async fn pull_locked(&self, user_id: &str) -> Result<usize> {
        let mut pulled = 0usize;

        for collection in Collection::ALL {
            let records = match self
                .remote
                .query_by_field(collection, "userId", &Value::String(user_id.to_string()))
                .await
            {
                Ok(records) => records,
                Err(error) => {
                    // non-fatal: stale local data until the next trigger
                    tracing::warn!("Pull for {collection} failed, keeping local copy: {error}");
                    continue;
                }
            };

            let db = self.db.lock().await;
            let store = RecordStore::new(db.connection());
            for record in records {
                // full replace per record; last pull wins locally
                store.put(collection, &record).await?;
                pulled += 1;
            }
        }

        tracing::debug!("Pulled {pulled} records for user {user_id}");
        Ok(pulled)
    }
}
