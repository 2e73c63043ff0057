//! Unified data access facade.
//!
//! Composes the TTL cache over the offline-aware accessors over the remote
//! store. Reads are cache-then-remote-then-local; writes always land in the
//! local store and either reach the remote store directly or are queued for
//! the next drain. Transient connectivity failures never surface to callers
//! as hard errors.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::cache::{CachedValue, TtlCache};
use crate::config::ServiceConfig;
use crate::connectivity::{ConnectivityMonitor, SubscriptionId};
use crate::db::{Database, QueueStore, RecordStore};
use crate::error::{Error, Result};
use crate::models::{Collection, DeadLetter, PendingOp, Record};
use crate::remote::{BatchOp, RemoteStore};
use crate::sync::{SyncEngine, SyncReport};

/// Single entry point for the UI layer: reads, writes, connectivity, and
/// sync, with one coherent offline-first behavior behind every call.
pub struct DataService {
    db: Arc<Mutex<Database>>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<ConnectivityMonitor>,
    cache: Arc<TtlCache>,
    sync: Arc<SyncEngine>,
    config: ServiceConfig,
    heartbeat: StdMutex<Option<JoinHandle<()>>>,
    status_subscription: StdMutex<Option<SubscriptionId>>,
}

impl DataService {
    /// Assemble the service from its injected collaborators.
    pub fn new(
        db: Database,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<ConnectivityMonitor>,
        config: ServiceConfig,
    ) -> Self {
        let db = Arc::new(Mutex::new(db));
        let sync = Arc::new(SyncEngine::new(Arc::clone(&db), Arc::clone(&remote)));
        Self {
            db,
            remote,
            connectivity,
            cache: Arc::new(TtlCache::new()),
            sync,
            config,
            heartbeat: StdMutex::new(None),
            status_subscription: StdMutex::new(None),
        }
    }

    /// Begin background work for a user: a startup sync when online, a sync
    /// on every offline -> online transition, and the pending-count
    /// heartbeat. Call [`Self::shutdown`] at teardown.
    pub async fn start(&self, user_id: &str) {
        let engine = Arc::clone(&self.sync);
        let cache = Arc::clone(&self.cache);
        let user = user_id.to_string();
        let subscription = self.connectivity.subscribe(move |online| {
            if !online {
                return;
            }
            let engine = Arc::clone(&engine);
            let cache = Arc::clone(&cache);
            let user = user.clone();
            tokio::spawn(async move {
                match engine.sync(&user).await {
                    Ok(report) => {
                        tracing::info!(
                            "Reconnect sync: {} pushed, {} pulled",
                            report.drain.committed,
                            report.pulled
                        );
                        cache.clear();
                    }
                    Err(error) => tracing::warn!("Reconnect sync failed: {error}"),
                }
            });
        });
        *self.lock_subscription() = Some(subscription);

        let heartbeat =
            Arc::clone(&self.sync).spawn_pending_heartbeat(self.config.pending_check_interval);
        *self.lock_heartbeat() = Some(heartbeat);

        if self.config.startup_sync && self.connectivity.is_online() {
            match self.sync.sync(user_id).await {
                Ok(report) => {
                    tracing::info!(
                        "Startup sync: {} pushed, {} pulled",
                        report.drain.committed,
                        report.pulled
                    );
                    self.cache.clear();
                }
                Err(error) => tracing::warn!("Startup sync failed: {error}"),
            }
        }
    }

    /// Stop background tasks and release the connectivity subscription.
    pub fn shutdown(&self) {
        if let Some(heartbeat) = self.lock_heartbeat().take() {
            heartbeat.abort();
        }
        if let Some(subscription) = self.lock_subscription().take() {
            self.connectivity.unsubscribe(subscription);
        }
    }

    // ----- reads -------------------------------------------------------

    /// All dogs owned by the user.
    pub async fn fetch_dogs(&self, user_id: &str) -> Result<Vec<Record>> {
        self.fetch_list(
            Collection::Dogs,
            format!("dogs:list:{user_id}"),
            "userId",
            user_id,
        )
        .await
    }

    /// All activities recorded by the user.
    pub async fn fetch_activities(&self, user_id: &str) -> Result<Vec<Record>> {
        self.fetch_list(
            Collection::Activities,
            format!("activities:list:{user_id}"),
            "userId",
            user_id,
        )
        .await
    }

    /// Activities for one dog.
    pub async fn fetch_activities_for_dog(&self, dog_id: &str) -> Result<Vec<Record>> {
        self.fetch_list(
            Collection::Activities,
            format!("activities:dog:{dog_id}"),
            "dogId",
            dog_id,
        )
        .await
    }

    /// All health records recorded by the user.
    pub async fn fetch_health_records(&self, user_id: &str) -> Result<Vec<Record>> {
        self.fetch_list(
            Collection::HealthRecords,
            format!("healthRecords:list:{user_id}"),
            "userId",
            user_id,
        )
        .await
    }

    /// Health records for one dog.
    pub async fn fetch_health_records_for_dog(&self, dog_id: &str) -> Result<Vec<Record>> {
        self.fetch_list(
            Collection::HealthRecords,
            format!("healthRecords:dog:{dog_id}"),
            "dogId",
            dog_id,
        )
        .await
    }

    /// All vaccinations recorded by the user.
    pub async fn fetch_vaccinations(&self, user_id: &str) -> Result<Vec<Record>> {
        self.fetch_list(
            Collection::Vaccinations,
            format!("vaccinations:list:{user_id}"),
            "userId",
            user_id,
        )
        .await
    }

    /// Vaccinations for one dog.
    pub async fn fetch_vaccinations_for_dog(&self, dog_id: &str) -> Result<Vec<Record>> {
        self.fetch_list(
            Collection::Vaccinations,
            format!("vaccinations:dog:{dog_id}"),
            "dogId",
            dog_id,
        )
        .await
    }

    /// Any collection's records for the user.
    pub async fn fetch_collection(
        &self,
        collection: Collection,
        user_id: &str,
    ) -> Result<Vec<Record>> {
        self.fetch_list(
            collection,
            format!("{collection}:list:{user_id}"),
            "userId",
            user_id,
        )
        .await
    }

    /// One record by id, cache-then-remote-then-local.
    pub async fn get_record(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let key = format!("{collection}:{id}");
        if let Some(CachedValue::One(record)) = self.cache.get(&key) {
            return Ok(Some(record));
        }

        let mut found = None;
        let mut hit_remote = false;
        if self.connectivity.is_online() {
            match self.remote.get(collection, id).await {
                Ok(record) => {
                    if let Some(record) = &record {
                        self.put_local(collection, record).await?;
                    }
                    found = record;
                    hit_remote = true;
                }
                Err(error) if error.is_retryable() => {
                    tracing::warn!("Remote get for {collection}/{id} failed, serving local copy: {error}");
                }
                Err(error) => return Err(error.into()),
            }
        }
        if !hit_remote {
            let db = self.db.lock().await;
            found = RecordStore::new(db.connection()).get(collection, id).await?;
        }

        if let Some(record) = &found {
            self.cache
                .insert(key, CachedValue::One(record.clone()), collection.cache_ttl());
        }
        Ok(found)
    }

    /// Dog lookup by id.
    pub async fn get_dog(&self, id: &str) -> Result<Option<Record>> {
        self.get_record(Collection::Dogs, id).await
    }

    async fn fetch_list(
        &self,
        collection: Collection,
        key: String,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>> {
        if let Some(CachedValue::Many(records)) = self.cache.get(&key) {
            return Ok(records);
        }

        let records = self.read_records(collection, field, value).await?;
        self.cache.insert(
            key,
            CachedValue::Many(records.clone()),
            collection.cache_ttl(),
        );
        Ok(records)
    }

    async fn read_records(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>> {
        if self.connectivity.is_online() {
            match self
                .remote
                .query_by_field(collection, field, &Value::String(value.to_string()))
                .await
            {
                Ok(records) => {
                    let db = self.db.lock().await;
                    let store = RecordStore::new(db.connection());
                    for record in &records {
                        store.put(collection, record).await?;
                    }
                    return Ok(records);
                }
                Err(error) if error.is_retryable() => {
                    tracing::warn!("Remote read for {collection} failed, serving local copy: {error}");
                }
                Err(error) => return Err(error.into()),
            }
        }

        let db = self.db.lock().await;
        RecordStore::new(db.connection())
            .query_by_index(collection, field, value)
            .await
    }

    // ----- writes ------------------------------------------------------

    /// Create a record. Online, the remote store assigns the id; offline,
    /// the record gets a placeholder id and the create is queued.
    pub async fn add_record(&self, collection: Collection, data: Record) -> Result<Record> {
        let mut record = data;
        if record.user_id().is_none() {
            return Err(Error::InvalidInput("record must have a userId".to_string()));
        }

        if self.connectivity.is_online() {
            match self.remote.create(collection, &record).await {
                Ok(server_id) => {
                    record.set_id(server_id);
                    self.put_local(collection, &record).await?;
                    self.invalidate(collection);
                    self.drain_if_pending().await;
                    return Ok(record);
                }
                Err(error) if error.is_retryable() => {
                    tracing::warn!("Remote create failed, queueing for sync: {error}");
                }
                Err(error) => return Err(error.into()),
            }
        }

        record.set_id(Record::local_placeholder_id());
        self.put_local(collection, &record).await?;
        self.enqueue(PendingOp::add(collection, record.clone())).await?;
        self.invalidate(collection);
        Ok(record)
    }

    /// Field-merge a patch into a record, locally and remotely.
    pub async fn update_record(
        &self,
        collection: Collection,
        id: &str,
        patch: Record,
    ) -> Result<Record> {
        let merged = {
            let db = self.db.lock().await;
            let store = RecordStore::new(db.connection());
            let mut record = store.get(collection, id).await?.unwrap_or_else(|| {
                let mut record = Record::new();
                record.set_id(id);
                record
            });
            record.merge(&patch);
            store.put(collection, &record).await?;
            record
        };

        if self.connectivity.is_online() {
            match self.remote.update(collection, id, &patch).await {
                Ok(()) => {
                    self.invalidate(collection);
                    self.drain_if_pending().await;
                    return Ok(merged);
                }
                Err(error) if error.is_retryable() => {
                    tracing::warn!("Remote update failed, queueing for sync: {error}");
                }
                Err(error) => return Err(error.into()),
            }
        }

        self.enqueue(PendingOp::update(collection, id, patch)).await?;
        self.invalidate(collection);
        Ok(merged)
    }

    /// Delete a record locally and remotely.
    pub async fn delete_record(&self, collection: Collection, id: &str) -> Result<()> {
        {
            let db = self.db.lock().await;
            RecordStore::new(db.connection())
                .delete(collection, id)
                .await?;
        }

        if self.connectivity.is_online() {
            match self.remote.delete(collection, id).await {
                Ok(()) => {
                    self.invalidate(collection);
                    self.drain_if_pending().await;
                    return Ok(());
                }
                Err(error) if error.is_retryable() => {
                    tracing::warn!("Remote delete failed, queueing for sync: {error}");
                }
                Err(error) => return Err(error.into()),
            }
        }

        self.enqueue(PendingOp::delete(collection, id)).await?;
        self.invalidate(collection);
        Ok(())
    }

    /// Add `by` to a numeric field of a record.
    pub async fn increment_field(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        by: i64,
    ) -> Result<()> {
        {
            let db = self.db.lock().await;
            let store = RecordStore::new(db.connection());
            if let Some(mut record) = store.get(collection, id).await? {
                record.apply_increment(field, by);
                store.put(collection, &record).await?;
            }
        }
        self.apply_or_enqueue(PendingOp::increment(collection, id, field, by))
            .await?;
        self.invalidate(collection);
        Ok(())
    }

    /// Union values into an array field of a record.
    pub async fn append_to_array(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> Result<()> {
        {
            let db = self.db.lock().await;
            let store = RecordStore::new(db.connection());
            if let Some(mut record) = store.get(collection, id).await? {
                record.apply_array_union(field, &values);
                store.put(collection, &record).await?;
            }
        }
        self.apply_or_enqueue(PendingOp::array_union(collection, id, field, values))
            .await?;
        self.invalidate(collection);
        Ok(())
    }

    // Typed write wrappers; the surface the UI calls.

    pub async fn add_dog(&self, data: Record) -> Result<Record> {
        self.add_record(Collection::Dogs, data).await
    }

    pub async fn update_dog(&self, id: &str, patch: Record) -> Result<Record> {
        self.update_record(Collection::Dogs, id, patch).await
    }

    pub async fn delete_dog(&self, id: &str) -> Result<()> {
        self.delete_record(Collection::Dogs, id).await
    }

    pub async fn add_activity(&self, data: Record) -> Result<Record> {
        self.add_record(Collection::Activities, data).await
    }

    pub async fn update_activity(&self, id: &str, patch: Record) -> Result<Record> {
        self.update_record(Collection::Activities, id, patch).await
    }

    pub async fn delete_activity(&self, id: &str) -> Result<()> {
        self.delete_record(Collection::Activities, id).await
    }

    pub async fn add_health_record(&self, data: Record) -> Result<Record> {
        self.add_record(Collection::HealthRecords, data).await
    }

    pub async fn update_health_record(&self, id: &str, patch: Record) -> Result<Record> {
        self.update_record(Collection::HealthRecords, id, patch).await
    }

    pub async fn delete_health_record(&self, id: &str) -> Result<()> {
        self.delete_record(Collection::HealthRecords, id).await
    }

    pub async fn add_vaccination(&self, data: Record) -> Result<Record> {
        self.add_record(Collection::Vaccinations, data).await
    }

    pub async fn update_vaccination(&self, id: &str, patch: Record) -> Result<Record> {
        self.update_record(Collection::Vaccinations, id, patch).await
    }

    pub async fn delete_vaccination(&self, id: &str) -> Result<()> {
        self.delete_record(Collection::Vaccinations, id).await
    }

    // ----- connectivity & sync ----------------------------------------

    /// Current reachability, as the monitor last reported it.
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Register for online/offline transition notifications.
    pub fn subscribe_to_online_status(
        &self,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.connectivity.subscribe(callback)
    }

    /// Remove an online-status subscription.
    pub fn unsubscribe_online_status(&self, id: SubscriptionId) -> bool {
        self.connectivity.unsubscribe(id)
    }

    /// Probe the remote store and feed the result into the monitor.
    pub async fn refresh_connectivity(&self) -> bool {
        let online = self.remote.ping().await.is_ok();
        self.connectivity.set_online(online);
        online
    }

    /// Run a full push+pull cycle now and drop every cached read.
    pub async fn sync_now(&self, user_id: &str) -> Result<SyncReport> {
        let report = self.sync.sync(user_id).await?;
        self.cache.clear();
        Ok(report)
    }

    /// Number of operations queued for the next drain.
    pub async fn pending_op_count(&self) -> Result<i64> {
        self.sync.pending_count().await
    }

    /// Operations the remote store rejected terminally.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.sync.dead_letters().await
    }

    // ----- internals ---------------------------------------------------

    async fn apply_or_enqueue(&self, op: PendingOp) -> Result<()> {
        if self.connectivity.is_online() {
            let collection = op.collection;
            let batch_op = BatchOp::try_from(&op)?;
            match self.remote.commit_batch(collection, vec![batch_op]).await {
                Ok(_) => return Ok(()),
                Err(error) if error.is_retryable() => {
                    tracing::warn!("Remote {} failed, queueing for sync: {error}", op.kind);
                }
                Err(error) => return Err(error.into()),
            }
        }
        self.enqueue(op).await
    }

    async fn put_local(&self, collection: Collection, record: &Record) -> Result<()> {
        let db = self.db.lock().await;
        RecordStore::new(db.connection()).put(collection, record).await
    }

    async fn enqueue(&self, op: PendingOp) -> Result<()> {
        let db = self.db.lock().await;
        QueueStore::new(db.connection()).enqueue(&op).await?;
        tracing::debug!("Queued {} op on {}/{}", op.kind, op.collection, op.doc_id);
        Ok(())
    }

    fn invalidate(&self, collection: Collection) {
        self.cache.invalidate_collection(collection.as_str());
    }

    /// Best-effort drain of anything still queued from an offline stretch.
    async fn drain_if_pending(&self) {
        match self.sync.pending_count().await {
            Ok(0) => {}
            Ok(_) => {
                if let Err(error) = self.sync.drain().await {
                    tracing::warn!("Opportunistic drain failed: {error}");
                }
            }
            Err(error) => tracing::warn!("Pending-count check failed: {error}"),
        }
    }

    fn lock_heartbeat(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscription(&self) -> std::sync::MutexGuard<'_, Option<SubscriptionId>> {
        self.status_subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Retry an operation up to `max_retries` times, waiting `delay x attempt`
/// between attempts, and rethrow the last error once attempts are
/// exhausted.
pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    max_retries: u32,
    delay: Duration,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= max_retries => return Err(error),
            Err(error) => {
                tracing::warn!("Attempt {attempt}/{max_retries} failed, retrying: {error}");
                tokio::time::sleep(delay * attempt).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::remote::MemoryRemoteStore;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    async fn setup(online: bool) -> (Arc<DataService>, Arc<MemoryRemoteStore>, Arc<ConnectivityMonitor>) {
        let db = Database::open_in_memory().await.unwrap();
        let remote = Arc::new(MemoryRemoteStore::new());
        let connectivity = Arc::new(ConnectivityMonitor::new(online));
        let service = Arc::new(DataService::new(
            db,
            Arc::clone(&remote) as Arc<dyn RemoteStore>,
            Arc::clone(&connectivity),
            ServiceConfig::default(),
        ));
        (service, remote, connectivity)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cached_fetch_skips_remote_within_ttl() {
        let (service, remote, _) = setup(true).await;
        remote
            .create(Collection::Dogs, &record(json!({"userId": "u1", "name": "Rex"})))
            .await
            .unwrap();

        let first = service.fetch_dogs("u1").await.unwrap();
        let second = service.fetch_dogs("u1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(remote.query_call_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn write_invalidates_cached_reads() {
        let (service, remote, _) = setup(true).await;

        let before = service.fetch_dogs("u1").await.unwrap();
        assert!(before.is_empty());
        assert_eq!(remote.query_call_count(), 1);

        service
            .add_dog(record(json!({"userId": "u1", "name": "Rex"})))
            .await
            .unwrap();

        // never returns data cached strictly before the write
        let after = service.fetch_dogs("u1").await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].str_field("name"), Some("Rex"));
        assert_eq!(remote.query_call_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_add_stores_server_assigned_id() {
        let (service, remote, _) = setup(true).await;

        let dog = service
            .add_dog(record(json!({"userId": "u1", "name": "Rex"})))
            .await
            .unwrap();

        let id = dog.id().unwrap();
        assert!(id.starts_with("srv-"));
        assert!(remote.document(Collection::Dogs, id).is_some());
        assert_eq!(service.pending_op_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_requires_an_owner() {
        let (service, _, _) = setup(true).await;
        let error = service
            .add_dog(record(json!({"name": "Nobody's dog"})))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_add_queues_and_sync_reconciles_without_duplicates() {
        let (service, remote, connectivity) = setup(false).await;

        let dog = service
            .add_dog(record(json!({"userId": "u1", "name": "Rex"})))
            .await
            .unwrap();

        // placeholder id locally, one queued add, nothing remote yet
        let placeholder = dog.id().unwrap().to_string();
        assert!(Record::is_placeholder_id(&placeholder));
        assert_eq!(service.pending_op_count().await.unwrap(), 1);
        assert_eq!(remote.document_count(Collection::Dogs), 0);

        // connectivity returns; drain fires
        connectivity.set_online(true);
        let report = service.sync_now("u1").await.unwrap();
        assert_eq!(report.drain.committed, 1);
        assert_eq!(service.pending_op_count().await.unwrap(), 0);

        // Rex exists exactly once, under the server-assigned id
        let dogs = service.fetch_dogs("u1").await.unwrap();
        assert_eq!(dogs.len(), 1);
        assert!(dogs[0].id().unwrap().starts_with("srv-"));
        assert_eq!(dogs[0].str_field("name"), Some("Rex"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_remote_failure_serves_local_copy() {
        let (service, remote, connectivity) = setup(false).await;

        // seed local data while offline
        service
            .add_dog(record(json!({"userId": "u1", "name": "Rex"})))
            .await
            .unwrap();

        // monitor reports online but the remote is actually unreachable
        connectivity.set_online(true);
        remote.set_unavailable(true);

        let dogs = service.fetch_dogs("u1").await.unwrap();
        assert_eq!(dogs.len(), 1);
        assert_eq!(dogs[0].str_field("name"), Some("Rex"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_remote_failure_downgrades_write_to_queue() {
        let (service, remote, _) = setup(true).await;
        let created = service
            .add_dog(record(json!({"userId": "u1", "name": "Rex"})))
            .await
            .unwrap();
        let id = created.id().unwrap().to_string();

        remote.set_unavailable(true);
        service
            .update_dog(&id, record(json!({"weight": 14})))
            .await
            .unwrap();

        // not surfaced as a failure; queued instead
        assert_eq!(service.pending_op_count().await.unwrap(), 1);

        // local copy reflects the write immediately
        let local = service.get_dog(&id).await.unwrap().unwrap();
        assert_eq!(local.get("weight"), Some(&json!(14)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_update_merges_locally() {
        let (service, _, _) = setup(false).await;

        let dog = service
            .add_dog(record(json!({"userId": "u1", "name": "Rex", "weight": 12})))
            .await
            .unwrap();
        let id = dog.id().unwrap().to_string();

        let merged = service
            .update_dog(&id, record(json!({"weight": 14})))
            .await
            .unwrap();

        assert_eq!(merged.get("weight"), Some(&json!(14)));
        assert_eq!(merged.str_field("name"), Some("Rex"));
        assert_eq!(service.pending_op_count().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_increment_applies_locally_and_queues() {
        let (service, _, _) = setup(false).await;

        let activity = service
            .add_activity(record(json!({"userId": "u1", "dogId": "d1", "walkCount": 1})))
            .await
            .unwrap();
        let id = activity.id().unwrap().to_string();

        service
            .increment_field(Collection::Activities, &id, "walkCount", 2)
            .await
            .unwrap();

        let local = service
            .get_record(Collection::Activities, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(local.get("walkCount"), Some(&json!(3)));
        assert_eq!(service.pending_op_count().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_runs_startup_sync_and_reconnect_sync() {
        let (service, remote, connectivity) = setup(true).await;
        remote
            .create(Collection::Dogs, &record(json!({"userId": "u1", "name": "Rex"})))
            .await
            .unwrap();

        service.start("u1").await;

        // startup pull landed in the local store
        connectivity.set_online(false);
        let dogs = service.fetch_dogs("u1").await.unwrap();
        assert_eq!(dogs.len(), 1);

        // offline write, then reconnect triggers a background sync
        service
            .add_dog(record(json!({"userId": "u1", "name": "Fido"})))
            .await
            .unwrap();
        connectivity.set_online(true);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(service.pending_op_count().await.unwrap(), 0);
        assert_eq!(remote.document_count(Collection::Dogs), 2);
        service.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn with_retry_backs_off_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result: std::result::Result<u32, String> = with_retry(
            move || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(format!("boom {n}"))
                    } else {
                        Ok(n)
                    }
                }
            },
            5,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn with_retry_rethrows_last_error_when_exhausted() {
        let result: std::result::Result<(), String> = with_retry(
            || async { Err("always".to_string()) },
            3,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Err("always".to_string()));
    }
}
