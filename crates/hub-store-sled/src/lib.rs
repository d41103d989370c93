#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **hub-store-sled** – Sled-backed [`KvStore`](hub_store_core::kv::KvStore)
//! driver and the [`HubEventStore`] facade that wires the core's pieces
//! (id generator, cache, coordinator, oracle, bus) into the upward interface
//! a calling store implementation uses.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tokio::sync::mpsc;
use tracing::info;

use hub_bus::{Listener, SubscriberBus, Subscription};
use hub_store_core::cache::{SetIndex, StorageCache, UsageSnapshot};
use hub_store_core::coordinator::{Clock, CommitCoordinator, CommitCoordinatorConfig};
use hub_store_core::error::HubStoreError;
use hub_store_core::event::{Event, EventArgs};
use hub_store_core::id::EventId;
use hub_store_core::key::{self, ROOT_PREFIX};
use hub_store_core::kv::{KvStore, WriteBatch};
use hub_store_core::log::{self, EventsPage, DEFAULT_PRUNE_TIME_LIMIT_MS};
use hub_store_core::oracle::{self, CandidateMessage, FarcasterClock};
use hub_types::{Account, HubEventKind, StoreKind, FARCASTER_EPOCH_MS};

const DEFAULT_FANOUT_CHANNEL_SIZE: usize = 256;

//─────────────────────────────
//  Sled KV driver
//─────────────────────────────

/// A [`KvStore`] backed by a single `sled::Tree`.
///
/// All of the core's keys live under one prefix byte ([`ROOT_PREFIX`]), and
/// any per-store implementation sharing this driver is expected to use
/// disjoint prefixes in the *same* tree. sled's `Batch`/`apply_batch` is
/// only atomic within a tree, so splitting the core and its callers across
/// trees would break commit-time atomicity.
#[derive(Debug)]
pub struct SledKv {
    _db: Db,
    tree: Tree,
}

impl SledKv {
    /// Open or create a sled database at `path`, using its default tree.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HubStoreError> {
        Self::open_with_config(path, sled::Config::default())
    }

    /// Open a sled database with custom configuration.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: sled::Config) -> Result<Self, HubStoreError> {
        let db = config
            .path(path)
            .open()
            .map_err(|e| HubStoreError::StorageFailure(format!("failed to open sled db: {e}")))?;
        Self::from_db(db)
    }

    /// Wrap an already-open sled database instance.
    pub fn from_db(db: Db) -> Result<Self, HubStoreError> {
        let tree = db
            .open_tree("hub_store_events")
            .map_err(|e| HubStoreError::StorageFailure(format!("failed to open tree: {e}")))?;
        Ok(Self { _db: db, tree })
    }

    /// A temporary, self-cleaning database for tests.
    #[cfg(test)]
    pub fn temporary() -> Result<Self, HubStoreError> {
        let config = sled::Config::new().temporary(true);
        let db = config
            .open()
            .map_err(|e| HubStoreError::StorageFailure(format!("failed to open sled db: {e}")))?;
        Self::from_db(db)
    }

    /// Flush pending writes to disk.
    pub async fn flush(&self) -> Result<(), HubStoreError> {
        self.tree
            .flush_async()
            .await
            .map_err(|e| HubStoreError::StorageFailure(format!("flush failed: {e}")))?;
        Ok(())
    }

    /// The ID of the last event in the log, if any. Used to seed the ID
    /// generator across a restart.
    pub fn recover_last_event_id(&self) -> Result<Option<EventId>, HubStoreError> {
        let upper = key::increment(&[ROOT_PREFIX])?;
        let last = self
            .tree
            .range(vec![ROOT_PREFIX]..upper)
            .next_back()
            .transpose()
            .map_err(|e| HubStoreError::StorageFailure(format!("recovery scan failed: {e}")))?;
        Ok(last.and_then(|(k, _)| key::parse_event_key(&k)))
    }
}

#[async_trait]
impl KvStore for SledKv {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, HubStoreError> {
        self.tree
            .get(key)
            .map(|opt| opt.map(|ivec| ivec.to_vec()))
            .map_err(|e| HubStoreError::StorageFailure(format!("get failed: {e}")))
    }

    async fn scan_range(
        &self,
        lower: &[u8],
        upper: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, HubStoreError> {
        self.tree
            .range(lower.to_vec()..upper.to_vec())
            .take(limit)
            .map(|res| {
                res.map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .map_err(|e| HubStoreError::StorageFailure(format!("scan failed: {e}")))
            })
            .collect()
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), HubStoreError> {
        let mut sled_batch = sled::Batch::default();
        for (k, v) in batch.puts() {
            sled_batch.insert(k.as_slice(), v.as_slice());
        }
        for k in batch.deletes() {
            sled_batch.remove(k.as_slice());
        }
        self.tree
            .apply_batch(sled_batch)
            .map_err(|e| HubStoreError::StorageFailure(format!("commit failed: {e}")))
    }
}

//─────────────────────────────
//  Clocks
//─────────────────────────────

/// Wall-clock [`Clock`] for the commit coordinator: milliseconds since the
/// project epoch.
#[derive(Debug, Default)]
pub struct SystemCoordinatorClock;

impl Clock for SystemCoordinatorClock {
    fn now_ms_since_epoch(&self) -> i64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        now_ms - FARCASTER_EPOCH_MS
    }
}

/// Wall-clock [`FarcasterClock`] for the prunability oracle: seconds since
/// the project epoch.
#[derive(Debug, Default)]
pub struct SystemFarcasterClock;

impl FarcasterClock for SystemFarcasterClock {
    fn now(&self) -> Result<u32, HubStoreError> {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| HubStoreError::StorageFailure(format!("system clock unavailable: {e}")))?
            .as_millis() as i64;
        let seconds = (now_ms - FARCASTER_EPOCH_MS) / 1000;
        Ok(seconds.max(0) as u32)
    }
}

//─────────────────────────────
//  Facade configuration
//─────────────────────────────

/// Ambient tunables for [`HubEventStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEventStoreConfig {
    /// Maximum commits that may queue awaiting the commit slot.
    pub lock_max_pending: usize,
    /// Maximum time a caller waits to acquire the slot before `TooBusy`.
    pub lock_timeout: Duration,
    /// Default prune horizon used by [`HubEventStore::prune_events`] when no
    /// per-call override is given.
    pub prune_time_limit_ms: i64,
    /// Capacity of the internal fan-out channel between the commit worker
    /// and the cache/bus consumer.
    pub fanout_channel_size: usize,
}

impl Default for HubEventStoreConfig {
    fn default() -> Self {
        Self {
            lock_max_pending: CommitCoordinatorConfig::default().lock_max_pending,
            lock_timeout: CommitCoordinatorConfig::default().lock_timeout,
            prune_time_limit_ms: DEFAULT_PRUNE_TIME_LIMIT_MS,
            fanout_channel_size: DEFAULT_FANOUT_CHANNEL_SIZE,
        }
    }
}

//─────────────────────────────
//  Facade
//─────────────────────────────

/// The assembled store event handler: sled-backed log, usage cache, commit
/// coordinator and subscriber bus behind a single upward interface.
pub struct HubEventStore<I: SetIndex + 'static> {
    kv: Arc<SledKv>,
    cache: Arc<StorageCache<I>>,
    bus: Arc<SubscriberBus>,
    coordinator: CommitCoordinator,
    farcaster_clock: Arc<dyn FarcasterClock>,
    prune_time_limit_ms: i64,
}

impl<I: SetIndex + 'static> HubEventStore<I> {
    /// Open a store at `path`, recovering the ID generator from the last
    /// extant log entry and wiring the coordinator, cache and bus together.
    ///
    /// `index` is the caller's [`SetIndex`] implementation over its own,
    /// out-of-scope per-store message indices.
    pub fn open<P: AsRef<Path>>(
        path: P,
        index: I,
        config: HubEventStoreConfig,
    ) -> Result<Self, HubStoreError> {
        let kv = Arc::new(SledKv::open(path)?);
        Self::from_kv(kv, index, config)
    }

    /// Build a store from an already-open [`SledKv`], e.g. a temporary
    /// database in tests.
    pub fn from_kv(kv: Arc<SledKv>, index: I, config: HubEventStoreConfig) -> Result<Self, HubStoreError> {
        let recovered_last_id = kv.recover_last_event_id()?;
        info!(?recovered_last_id, "recovering event log");

        let cache = Arc::new(StorageCache::new(index));
        let bus = Arc::new(SubscriberBus::new());
        let clock = Arc::new(SystemCoordinatorClock);

        let (fanout_tx, fanout_rx) = mpsc::channel(config.fanout_channel_size);
        hub_store_core::coordinator::spawn_fanout_consumer(fanout_rx, cache.clone(), bus.clone());

        let coordinator = CommitCoordinator::spawn(
            kv.clone(),
            clock,
            recovered_last_id,
            CommitCoordinatorConfig {
                lock_max_pending: config.lock_max_pending,
                lock_timeout: config.lock_timeout,
            },
            fanout_tx,
        );

        Ok(Self {
            kv,
            cache,
            bus,
            coordinator,
            farcaster_clock: Arc::new(SystemFarcasterClock),
            prune_time_limit_ms: config.prune_time_limit_ms,
        })
    }

    /// Submit a commit: `txn` already carries the caller's own
    /// store-specific mutations; the coordinator appends the event entry and
    /// commits the combined batch atomically.
    pub async fn commit(&self, txn: WriteBatch, args: EventArgs) -> Result<EventId, HubStoreError> {
        self.coordinator.commit(txn, args).await
    }

    /// Point lookup by ID.
    pub async fn get_event(&self, id: EventId) -> Result<Event, HubStoreError> {
        log::get_event(self.kv.as_ref(), id).await
    }

    /// Full scan from `from_id` (inclusive) to the end of the log.
    pub async fn get_events(&self, from_id: Option<EventId>) -> Result<Vec<Event>, HubStoreError> {
        log::get_events(self.kv.as_ref(), from_id).await
    }

    /// One page of a paginated scan.
    pub async fn get_events_page(
        &self,
        from_id: EventId,
        page_size: usize,
    ) -> Result<EventsPage, HubStoreError> {
        log::get_events_page(self.kv.as_ref(), from_id, page_size).await
    }

    /// Combined usage snapshot for `(account, set)`.
    pub async fn get_usage(&self, account: Account, set: StoreKind) -> Result<UsageSnapshot, HubStoreError> {
        self.cache.get_usage(account, set).await
    }

    /// Current storage-unit balance for `account`.
    pub fn get_storage_units_for_account(&self, account: Account) -> u32 {
        self.cache.get_storage_units(account)
    }

    /// Whether committing `message` into `set` right now would make it
    /// immediately prune-eligible.
    pub async fn is_prunable(
        &self,
        message: &CandidateMessage,
        set: StoreKind,
        size_limit: u32,
        time_limit: Option<u32>,
    ) -> Result<bool, HubStoreError> {
        oracle::is_prunable(
            self.cache.as_ref(),
            self.farcaster_clock.as_ref(),
            message,
            set,
            size_limit,
            time_limit,
        )
        .await
    }

    /// Delete every event older than this store's configured prune horizon.
    /// Returns the number of entries deleted.
    pub async fn prune_events(&self) -> Result<usize, HubStoreError> {
        let now_ms = SystemCoordinatorClock.now_ms_since_epoch();
        log::prune_events(self.kv.as_ref(), now_ms, self.prune_time_limit_ms).await
    }

    /// Rebuild the usage cache for `accounts` from the caller's durable
    /// index. Must not overlap with commits.
    pub async fn sync_cache(&self, accounts: &[Account]) -> Result<(), HubStoreError> {
        self.cache.sync_from_db(accounts).await
    }

    /// Register a listener on the subscriber bus for `kind`. Keep the
    /// returned [`Subscription`] alive for as long as the listener should
    /// run.
    pub fn subscribe(&self, kind: HubEventKind, callback: Arc<Listener>) -> Subscription {
        self.bus.subscribe(kind, callback)
    }

    /// Flush the underlying sled database to disk.
    pub async fn flush(&self) -> Result<(), HubStoreError> {
        self.kv.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hub_store_core::tshash::{make_ts_hash, TsHash};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct EmptyIndex;

    #[async_trait]
    impl SetIndex for EmptyIndex {
        async fn count(&self, _account: Account, _set: StoreKind) -> Result<u32, HubStoreError> {
            Ok(0)
        }
        async fn earliest_ts_hash(
            &self,
            _account: Account,
            _set: StoreKind,
        ) -> Result<Option<TsHash>, HubStoreError> {
            Ok(None)
        }
    }

    fn open_test_store() -> HubEventStore<EmptyIndex> {
        let kv = Arc::new(SledKv::temporary().unwrap());
        HubEventStore::from_kv(kv, EmptyIndex, HubEventStoreConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn sled_kv_commit_then_get_round_trips() {
        let kv = SledKv::temporary().unwrap();
        let mut batch = WriteBatch::new();
        batch.put(vec![1, 2, 3], vec![9, 9]);
        kv.commit_batch(batch).await.unwrap();
        assert_eq!(kv.get(&[1, 2, 3]).await.unwrap(), Some(vec![9, 9]));
    }

    #[tokio::test]
    async fn sled_kv_scan_range_is_ordered_and_bounded() {
        let kv = SledKv::temporary().unwrap();
        let mut batch = WriteBatch::new();
        for i in 0u8..5 {
            batch.put(vec![ROOT_PREFIX, i], vec![i]);
        }
        kv.commit_batch(batch).await.unwrap();

        let (lower, upper) = key::scan_bounds(None, None).unwrap();
        let entries = kv.scan_range(&lower, &upper, 3).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, vec![ROOT_PREFIX, 0]);
    }

    #[tokio::test]
    async fn recover_last_event_id_is_none_for_an_empty_log() {
        let kv = SledKv::temporary().unwrap();
        assert_eq!(kv.recover_last_event_id().unwrap(), None);
    }

    #[tokio::test]
    async fn committed_event_is_readable_through_the_facade() {
        let store = open_test_store();
        let args = EventArgs::MergeMessage {
            account: Account(1),
            set: StoreKind::Casts,
            ts_hash: make_ts_hash(1, &[1]),
            payload: vec![7],
        };
        let id = store.commit(WriteBatch::new(), args).await.unwrap();
        let event = store.get_event(id).await.unwrap();
        assert_eq!(event.id, id);
    }

    #[tokio::test]
    async fn usage_reflects_commit_once_fanout_drains() {
        let store = open_test_store();
        let args = EventArgs::MergeMessage {
            account: Account(5),
            set: StoreKind::Casts,
            ts_hash: make_ts_hash(1, &[1]),
            payload: vec![],
        };
        store.commit(WriteBatch::new(), args).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let usage = store.get_usage(Account(5), StoreKind::Casts).await.unwrap();
        assert_eq!(usage.used, 1);
    }

    #[tokio::test]
    async fn bus_subscriber_is_notified_after_commit() {
        let store = open_test_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let callback: Arc<Listener> = Arc::new(move |_event| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        let _subscription = store.subscribe(HubEventKind::MergeMessage, callback);

        let args = EventArgs::MergeMessage {
            account: Account(1),
            set: StoreKind::Casts,
            ts_hash: make_ts_hash(1, &[1]),
            payload: vec![],
        };
        store.commit(WriteBatch::new(), args).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovery_resumes_ids_after_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let first_id = {
            let kv = Arc::new(SledKv::open(dir.path()).unwrap());
            let store = HubEventStore::from_kv(kv, EmptyIndex, HubEventStoreConfig::default()).unwrap();
            let args = EventArgs::MergeMessage {
                account: Account(1),
                set: StoreKind::Casts,
                ts_hash: make_ts_hash(1, &[1]),
                payload: vec![],
            };
            let id = store.commit(WriteBatch::new(), args).await.unwrap();
            store.flush().await.unwrap();
            id
        };

        let kv = Arc::new(SledKv::open(dir.path()).unwrap());
        let store = HubEventStore::from_kv(kv, EmptyIndex, HubEventStoreConfig::default()).unwrap();
        let args = EventArgs::MergeMessage {
            account: Account(1),
            set: StoreKind::Casts,
            ts_hash: make_ts_hash(2, &[2]),
            payload: vec![],
        };
        let second_id = store.commit(WriteBatch::new(), args).await.unwrap();
        assert!(second_id > first_id);
    }

    #[tokio::test]
    async fn prune_events_removes_entries_older_than_the_default_horizon() {
        let store = open_test_store();
        assert_eq!(store.prune_events().await.unwrap(), 0);
    }
}
