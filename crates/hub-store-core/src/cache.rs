//! Per-account, per-set usage cache.
//!
//! Two in-memory maps plus a storage-units map, kept consistent with durable
//! state by applying every committed event in commit order.
//! Entries are created on first observation and have no independent
//! persistence; after a restart they are rebuilt by [`StorageCache::sync_from_db`].

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use hub_types::{Account, StoreKind};
use tracing::debug;

use crate::error::HubStoreError;
use crate::event::{Event, EventArgs};
use crate::tshash::TsHash;

/// The external contract the cache uses to repair itself from durable
/// state. Per-store message indices are owned by the individual store
/// implementations, which are explicitly out of scope for this crate;
/// this trait is the seam between the two.
#[async_trait]
pub trait SetIndex: Send + Sync + std::fmt::Debug {
    /// Count the live messages in `(account, set)`.
    async fn count(&self, account: Account, set: StoreKind) -> Result<u32, HubStoreError>;

    /// Find the tsHash of the oldest live message in `(account, set)`, if
    /// any.
    async fn earliest_ts_hash(
        &self,
        account: Account,
        set: StoreKind,
    ) -> Result<Option<TsHash>, HubStoreError>;
}

/// The earliest-tsHash slot for one `(account, set)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Earliest {
    /// Known, possibly absent (empty set).
    Known(Option<TsHash>),
    /// Invalidated by removal of the current floor; must be recomputed from
    /// the durable index before it is next read.
    NeedsRefresh,
}

/// A snapshot combining message count and earliest-tsHash split back into
/// its timestamp/hash halves, for the upward `get_usage` interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSnapshot {
    /// Live message count.
    pub used: u32,
    /// Timestamp component of the earliest live message's tsHash, if any.
    pub earliest_timestamp: Option<u32>,
    /// Hash component of the earliest live message's tsHash, if any.
    pub earliest_hash: Option<Vec<u8>>,
}

/// The per-account, per-set usage cache.
#[derive(Debug)]
pub struct StorageCache<I: SetIndex> {
    counts: RwLock<HashMap<(Account, StoreKind), u32>>,
    earliest: RwLock<HashMap<(Account, StoreKind), Earliest>>,
    storage_units: RwLock<HashMap<Account, u32>>,
    index: I,
}

impl<I: SetIndex> StorageCache<I> {
    /// Build a cache backed by `index` for repair/lazy-recompute.
    pub fn new(index: I) -> Self {
        Self {
            counts: RwLock::new(HashMap::new()),
            earliest: RwLock::new(HashMap::new()),
            storage_units: RwLock::new(HashMap::new()),
            index,
        }
    }

    /// Current live message count for `(account, set)`. O(1); defaults to
    /// zero for an unseen pair.
    pub fn get_message_count(&self, account: Account, set: StoreKind) -> u32 {
        *self
            .counts
            .read()
            .unwrap()
            .get(&(account, set))
            .unwrap_or(&0)
    }

    /// Current storage-unit balance for `account`. O(1); defaults to zero,
    /// which is debug-logged (it permanently prunes the account's sets) but
    /// is never an error.
    pub fn get_storage_units(&self, account: Account) -> u32 {
        let units = *self.storage_units.read().unwrap().get(&account).unwrap_or(&0);
        if units == 0 {
            debug!(?account, "account has zero storage units");
        }
        units
    }

    /// The tsHash of the oldest live message in `(account, set)`, lazily
    /// recomputing from the durable index if the cached entry was
    /// invalidated by a prior removal.
    pub async fn get_earliest_ts_hash(
        &self,
        account: Account,
        set: StoreKind,
    ) -> Result<Option<TsHash>, HubStoreError> {
        let cached = self.earliest.read().unwrap().get(&(account, set)).cloned();
        match cached {
            Some(Earliest::Known(value)) => Ok(value),
            None | Some(Earliest::NeedsRefresh) => {
                let recomputed = self.index.earliest_ts_hash(account, set).await?;
                self.earliest
                    .write()
                    .unwrap()
                    .insert((account, set), Earliest::Known(recomputed.clone()));
                Ok(recomputed)
            }
        }
    }

    /// A combined usage snapshot for the upward `get_usage` interface.
    pub async fn get_usage(
        &self,
        account: Account,
        set: StoreKind,
    ) -> Result<UsageSnapshot, HubStoreError> {
        let used = self.get_message_count(account, set);
        let earliest = self.get_earliest_ts_hash(account, set).await?;
        let (earliest_timestamp, earliest_hash) = match &earliest {
            Some(ts_hash) => {
                let (ts, hash) = crate::tshash::split_ts_hash(ts_hash)
                    .ok_or_else(|| HubStoreError::StorageFailure("malformed tsHash in cache".into()))?;
                (Some(ts), Some(hash.to_vec()))
            }
            None => (None, None),
        };
        Ok(UsageSnapshot {
            used,
            earliest_timestamp,
            earliest_hash,
        })
    }

    /// Rebuild every cache dimension for `accounts` from the durable index.
    /// Must not overlap with commits: callers run it at startup, before
    /// serving begins, or otherwise hold the commit slot for its duration.
    pub async fn sync_from_db(&self, accounts: &[Account]) -> Result<(), HubStoreError> {
        for &account in accounts {
            for &set in hub_types::StoreKind::ALL.iter() {
                let count = self.index.count(account, set).await?;
                let earliest = self.index.earliest_ts_hash(account, set).await?;
                self.counts.write().unwrap().insert((account, set), count);
                self.earliest
                    .write()
                    .unwrap()
                    .insert((account, set), Earliest::Known(earliest));
            }
        }
        Ok(())
    }

    /// Apply a successfully-committed event. Must be called in commit order
    /// relative to other events.
    pub fn process_event(&self, event: &Event) {
        match &event.args {
            EventArgs::MergeMessage {
                account, set, ts_hash, ..
            } => self.apply_merge(*account, *set, ts_hash),
            EventArgs::MergeUsernameProof { account, ts_hash, .. } => {
                self.apply_merge(*account, StoreKind::UserData, ts_hash)
            }
            EventArgs::PruneMessage {
                account, set, ts_hash, ..
            }
            | EventArgs::RevokeMessage {
                account, set, ts_hash, ..
            } => self.apply_removal(*account, *set, ts_hash),
            EventArgs::MergeOnChainEvent {
                account,
                storage_units,
                ..
            } => {
                if let Some(units) = storage_units {
                    self.storage_units.write().unwrap().insert(*account, *units);
                }
            }
        }
    }

    fn apply_merge(&self, account: Account, set: StoreKind, ts_hash: &TsHash) {
        *self
            .counts
            .write()
            .unwrap()
            .entry((account, set))
            .or_insert(0) += 1;

        let mut earliest = self.earliest.write().unwrap();
        let slot = earliest.entry((account, set)).or_insert(Earliest::Known(None));
        let should_replace = match slot {
            Earliest::Known(Some(current)) => ts_hash < current,
            Earliest::Known(None) => true,
            Earliest::NeedsRefresh => false,
        };
        if should_replace {
            *slot = Earliest::Known(Some(ts_hash.clone()));
        }
    }

    fn apply_removal(&self, account: Account, set: StoreKind, ts_hash: &TsHash) {
        {
            let mut counts = self.counts.write().unwrap();
            if let Some(count) = counts.get_mut(&(account, set)) {
                *count = count.saturating_sub(1);
            }
        }

        let mut earliest = self.earliest.write().unwrap();
        if let Some(Earliest::Known(Some(current))) = earliest.get(&(account, set)) {
            if current == ts_hash {
                earliest.insert((account, set), Earliest::NeedsRefresh);
            }
        }
    }
}
