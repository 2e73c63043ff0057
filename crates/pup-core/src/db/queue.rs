//! Durable FIFO queue of mutations awaiting remote replay.

use libsql::{params, Connection};
use serde_json::Value;

use crate::error::Result;
use crate::models::{Collection, DeadLetter, OpKind, PendingOp, Record};
use crate::util::unix_timestamp_ms;

/// Repository over the `sync_queue` and `dead_letter` tables.
pub struct QueueStore<'a> {
    conn: &'a Connection,
}

impl<'a> QueueStore<'a> {
    /// Create a new store over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append an operation to the queue, returning its assigned queue id.
    ///
    /// Never deduplicates: two updates to the same document are two entries,
    /// and the second supersedes the first's remote effect when both are
    /// replayed in order.
    pub async fn enqueue(&self, op: &PendingOp) -> Result<i64> {
        let data = op
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let value = op
            .value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO sync_queue (op_uid, kind, collection, doc_id, data, field, value, queued_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    op.op_uid.clone(),
                    op.kind.as_str(),
                    op.collection.as_str(),
                    op.doc_id.clone(),
                    data,
                    op.field.clone(),
                    value,
                    op.queued_at
                ],
            )
            .await?;

        Ok(self.conn.last_insert_rowid())
    }

    /// All queued operations in insertion (FIFO) order.
    pub async fn all(&self) -> Result<Vec<PendingOp>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, op_uid, kind, collection, doc_id, data, field, value, queued_at
                 FROM sync_queue ORDER BY id ASC",
                (),
            )
            .await?;

        let mut ops = Vec::new();
        while let Some(row) = rows.next().await? {
            ops.push(Self::parse_op(&row)?);
        }
        Ok(ops)
    }

    /// Number of queued operations.
    pub async fn count(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sync_queue", ())
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(count)
    }

    /// Remove the given queue entries after a confirmed remote commit.
    pub async fn remove(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        for id in ids {
            if let Err(e) = self
                .conn
                .execute("DELETE FROM sync_queue WHERE id = ?", params![*id])
                .await
            {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
        }
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    /// Move a terminally rejected operation from the queue to the
    /// dead-letter table, recording the failure reason.
    pub async fn bury(&self, op: &PendingOp, reason: &str) -> Result<()> {
        let data = op
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let value = op
            .value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        let insert = self
            .conn
            .execute(
                "INSERT INTO dead_letter (op_uid, kind, collection, doc_id, data, field, value, queued_at, failed_at, reason)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    op.op_uid.clone(),
                    op.kind.as_str(),
                    op.collection.as_str(),
                    op.doc_id.clone(),
                    data,
                    op.field.clone(),
                    value,
                    op.queued_at,
                    unix_timestamp_ms(),
                    reason
                ],
            )
            .await;
        if let Err(e) = insert {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        if let Err(e) = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?", params![op.id])
            .await
        {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        tracing::warn!(
            "Dead-lettered {} op on {}/{}: {reason}",
            op.kind,
            op.collection,
            op.doc_id
        );
        Ok(())
    }

    /// Dead-lettered operations, most recent failure first.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, op_uid, kind, collection, doc_id, data, field, value, queued_at, failed_at, reason
                 FROM dead_letter ORDER BY failed_at DESC, id DESC",
                (),
            )
            .await?;

        let mut letters = Vec::new();
        while let Some(row) = rows.next().await? {
            let op = Self::parse_op(&row)?;
            let failed_at: i64 = row.get(9)?;
            let reason: String = row.get(10)?;
            letters.push(DeadLetter {
                id: op.id,
                op_uid: op.op_uid,
                kind: op.kind,
                collection: op.collection,
                doc_id: op.doc_id,
                data: op.data,
                field: op.field,
                value: op.value,
                queued_at: op.queued_at,
                failed_at,
                reason,
            });
        }
        Ok(letters)
    }

    fn parse_op(row: &libsql::Row) -> Result<PendingOp> {
        let kind: String = row.get(2)?;
        let collection: String = row.get(3)?;
        let data: Option<String> = row.get(5)?;
        let value: Option<String> = row.get(7)?;

        Ok(PendingOp {
            id: row.get(0)?,
            op_uid: row.get(1)?,
            kind: kind.parse::<OpKind>()?,
            collection: collection.parse::<Collection>()?,
            doc_id: row.get(4)?,
            data: data
                .map(|raw| serde_json::from_str::<Record>(&raw))
                .transpose()?,
            field: row.get(6)?,
            value: value
                .map(|raw| serde_json::from_str::<Value>(&raw))
                .transpose()?,
            queued_at: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::db::Database;

    fn dog_record(id: &str) -> Record {
        Record::from_value(json!({"id": id, "userId": "u1", "name": "Rex"})).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_preserves_fifo_order() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = QueueStore::new(db.connection());

        let first = queue
            .enqueue(&PendingOp::add(Collection::Dogs, dog_record("local-1")))
            .await
            .unwrap();
        let second = queue
            .enqueue(&PendingOp::delete(Collection::Dogs, "d9"))
            .await
            .unwrap();
        assert!(second > first);

        let ops = queue.all().await.unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].kind, OpKind::Add);
        assert_eq!(ops[1].kind, OpKind::Delete);
        assert_eq!(queue.count().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_never_deduplicates() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = QueueStore::new(db.connection());

        let patch = Record::from_value(json!({"weight": 12})).unwrap();
        queue
            .enqueue(&PendingOp::update(Collection::Dogs, "d1", patch.clone()))
            .await
            .unwrap();
        queue
            .enqueue(&PendingOp::update(Collection::Dogs, "d1", patch))
            .await
            .unwrap();

        assert_eq!(queue.count().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn round_trips_every_op_shape() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = QueueStore::new(db.connection());

        queue
            .enqueue(&PendingOp::add(Collection::Dogs, dog_record("local-1")))
            .await
            .unwrap();
        queue
            .enqueue(&PendingOp::increment(
                Collection::Activities,
                "a1",
                "walkCount",
                2,
            ))
            .await
            .unwrap();
        queue
            .enqueue(&PendingOp::array_union(
                Collection::Dogs,
                "d1",
                "tags",
                vec![json!("fluffy")],
            ))
            .await
            .unwrap();

        let ops = queue.all().await.unwrap();
        assert_eq!(ops[0].data.as_ref().unwrap().str_field("name"), Some("Rex"));
        assert_eq!(ops[1].field.as_deref(), Some("walkCount"));
        assert_eq!(ops[1].value, Some(json!(2)));
        assert_eq!(ops[2].value, Some(json!(["fluffy"])));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_deletes_only_named_entries() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = QueueStore::new(db.connection());

        let first = queue
            .enqueue(&PendingOp::delete(Collection::Dogs, "d1"))
            .await
            .unwrap();
        queue
            .enqueue(&PendingOp::delete(Collection::Dogs, "d2"))
            .await
            .unwrap();

        queue.remove(&[first]).await.unwrap();

        let remaining = queue.all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].doc_id, "d2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bury_moves_op_to_dead_letter() {
        let db = Database::open_in_memory().await.unwrap();
        let queue = QueueStore::new(db.connection());

        queue
            .enqueue(&PendingOp::delete(Collection::Dogs, "d1"))
            .await
            .unwrap();
        let op = queue.all().await.unwrap().remove(0);

        queue.bury(&op, "permission denied (403)").await.unwrap();

        assert_eq!(queue.count().await.unwrap(), 0);
        let letters = queue.dead_letters().await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].doc_id, "d1");
        assert_eq!(letters[0].reason, "permission denied (403)");
        assert!(letters[0].failed_at >= op.queued_at);
    }
}
