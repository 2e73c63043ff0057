//! Local mirror store for synced collections.

use libsql::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{Collection, Record};

/// Repository over the per-collection mirror tables.
///
/// Every mutating call is durable before it returns; callers may assume the
/// change survives an immediate crash.
pub struct RecordStore<'a> {
    conn: &'a Connection,
}

impl<'a> RecordStore<'a> {
    /// Create a new store over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or fully replace the record at its id.
    ///
    /// The only validation is a non-empty `id`; records are otherwise
    /// schemaless. Idempotent.
    pub async fn put(&self, collection: Collection, record: &Record) -> Result<()> {
        let id = record
            .id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::InvalidInput("record must have a non-empty id".to_string()))?;

        let data = serde_json::to_string(record)?;
        let sql = format!(
            "INSERT OR REPLACE INTO {} (id, user_id, dog_id, date, record_type, data)
             VALUES (?, ?, ?, ?, ?, ?)",
            collection.table()
        );

        self.conn
            .execute(
                &sql,
                params![
                    id,
                    record.user_id().map(ToString::to_string),
                    record.str_field("dogId").map(ToString::to_string),
                    record.str_field("date").map(ToString::to_string),
                    record.str_field("type").map(ToString::to_string),
                    data
                ],
            )
            .await?;

        Ok(())
    }

    /// Fetch a record by id.
    pub async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let sql = format!("SELECT data FROM {} WHERE id = ?", collection.table());
        let mut rows = self.conn.query(&sql, params![id]).await?;

        match rows.next().await? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    /// Remove a record by id; no-op when absent.
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", collection.table());
        self.conn.execute(&sql, params![id]).await?;
        Ok(())
    }

    /// All records whose indexed field equals `value`. Order unspecified;
    /// callers needing order must sort post-hoc.
    pub async fn query_by_index(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>> {
        let column = collection.index_column(field).ok_or_else(|| {
            Error::InvalidInput(format!("{collection} has no index on field {field}"))
        })?;

        let sql = format!(
            "SELECT data FROM {} WHERE {column} = ?",
            collection.table()
        );
        let mut rows = self.conn.query(&sql, params![value]).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            records.push(serde_json::from_str(&data)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::db::Database;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_then_get_round_trips_all_fields() {
        let db = Database::open_in_memory().await.unwrap();
        let store = RecordStore::new(db.connection());

        let dog = record(json!({
            "id": "d1",
            "userId": "u1",
            "name": "Rex",
            "weight": 12.5
        }));
        store.put(Collection::Dogs, &dog).await.unwrap();

        let loaded = store.get(Collection::Dogs, "d1").await.unwrap().unwrap();
        assert_eq!(loaded, dog);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_rejects_missing_or_empty_id() {
        let db = Database::open_in_memory().await.unwrap();
        let store = RecordStore::new(db.connection());

        let no_id = record(json!({"userId": "u1"}));
        assert!(store.put(Collection::Dogs, &no_id).await.is_err());

        let empty_id = record(json!({"id": "", "userId": "u1"}));
        assert!(store.put(Collection::Dogs, &empty_id).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_is_a_full_replace() {
        let db = Database::open_in_memory().await.unwrap();
        let store = RecordStore::new(db.connection());

        store
            .put(
                Collection::Dogs,
                &record(json!({"id": "d1", "userId": "u1", "name": "Rex", "breed": "lab"})),
            )
            .await
            .unwrap();
        store
            .put(
                Collection::Dogs,
                &record(json!({"id": "d1", "userId": "u1", "name": "Rexy"})),
            )
            .await
            .unwrap();

        let loaded = store.get(Collection::Dogs, "d1").await.unwrap().unwrap();
        assert_eq!(loaded.str_field("name"), Some("Rexy"));
        // replaced wholesale, not merged
        assert_eq!(loaded.get("breed"), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_and_delete_missing_record_are_not_errors() {
        let db = Database::open_in_memory().await.unwrap();
        let store = RecordStore::new(db.connection());

        assert!(store.get(Collection::Dogs, "nope").await.unwrap().is_none());
        store.delete(Collection::Dogs, "nope").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn query_by_index_filters_on_denormalized_columns() {
        let db = Database::open_in_memory().await.unwrap();
        let store = RecordStore::new(db.connection());

        for (id, dog) in [("a1", "d1"), ("a2", "d1"), ("a3", "d2")] {
            store
                .put(
                    Collection::Activities,
                    &record(json!({
                        "id": id,
                        "userId": "u1",
                        "dogId": dog,
                        "type": "walk"
                    })),
                )
                .await
                .unwrap();
        }

        let for_dog = store
            .query_by_index(Collection::Activities, "dogId", "d1")
            .await
            .unwrap();
        assert_eq!(for_dog.len(), 2);

        let for_user = store
            .query_by_index(Collection::Activities, "userId", "u1")
            .await
            .unwrap();
        assert_eq!(for_user.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn query_by_index_rejects_unindexed_fields() {
        let db = Database::open_in_memory().await.unwrap();
        let store = RecordStore::new(db.connection());

        let error = store
            .query_by_index(Collection::Dogs, "name", "Rex")
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn health_records_index_type_field() {
        let db = Database::open_in_memory().await.unwrap();
        let store = RecordStore::new(db.connection());

        store
            .put(
                Collection::HealthRecords,
                &record(json!({"id": "h1", "userId": "u1", "dogId": "d1", "type": "checkup"})),
            )
            .await
            .unwrap();
        store
            .put(
                Collection::HealthRecords,
                &record(json!({"id": "h2", "userId": "u1", "dogId": "d1", "type": "injury"})),
            )
            .await
            .unwrap();

        let checkups = store
            .query_by_index(Collection::HealthRecords, "type", "checkup")
            .await
            .unwrap();
        assert_eq!(checkups.len(), 1);
        assert_eq!(checkups[0].id(), Some("h1"));
    }
}
