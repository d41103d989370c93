//! The KV store contract the core requires: atomic batched
//! writes, point reads, and bounded range scans. Concrete drivers (e.g.
//! `hub-store-sled`) implement [`KvStore`]; this crate also ships
//! [`MemoryKv`], a `BTreeMap`-backed test double, so the coordinator, cache
//! and oracle can be unit-tested without a filesystem.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::HubStoreError;

/// A set of puts and deletes a caller accumulates before handing it to
/// [`KvStore::commit_batch`]. This is the "transaction" callers populate
/// with their own store-specific mutations before the coordinator appends
/// the event entry and commits.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    puts: Vec<(Vec<u8>, Vec<u8>)>,
    deletes: Vec<Vec<u8>>,
}

impl WriteBatch {
    /// A new, empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.puts.push((key.into(), value.into()));
    }

    /// Queue a delete.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.deletes.push(key.into());
    }

    /// The queued puts.
    pub fn puts(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.puts
    }

    /// The queued deletes.
    pub fn deletes(&self) -> &[Vec<u8>] {
        &self.deletes
    }
}

/// Abstraction over an embedded, ordered KV store.
///
/// No concurrent writer may touch the key prefixes the core owns; the core
/// itself serializes all writes through a single commit slot, so
/// implementations need not provide their own write locking beyond what
/// `commit_batch`'s atomicity already requires.
#[async_trait]
pub trait KvStore: Send + Sync + std::fmt::Debug {
    /// Point lookup.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, HubStoreError>;

    /// Scan `[lower, upper)`, yielding at most `limit` entries in key order.
    /// Bounded so large scans (e.g. a pruning sweep) can be chunked and
    /// interrupted between calls rather than materializing an unbounded
    /// range at once.
    async fn scan_range(
        &self,
        lower: &[u8],
        upper: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, HubStoreError>;

    /// Atomically apply every put and delete in `batch`.
    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), HubStoreError>;
}

//─────────────────────────────
//  In-memory test double
//─────────────────────────────

/// A `BTreeMap`-backed [`KvStore`] used by this crate's own unit tests.
/// Not exported as part of a production story, it exists purely so
/// coordinator/cache/oracle tests don't need a filesystem.
#[derive(Debug, Default)]
pub struct MemoryKv {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    /// A fresh, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, HubStoreError> {
        Ok(self.data.read().unwrap().get(key).cloned())
    }

    async fn scan_range(
        &self,
        lower: &[u8],
        upper: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, HubStoreError> {
        let guard = self.data.read().unwrap();
        Ok(guard
            .range(lower.to_vec()..upper.to_vec())
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), HubStoreError> {
        let mut guard = self.data.write().unwrap();
        for (k, v) in batch.puts {
            guard.insert(k, v);
        }
        for k in batch.deletes {
            guard.remove(&k);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_kv_commit_is_atomic_in_effect() {
        let kv = MemoryKv::new();
        let mut batch = WriteBatch::new();
        batch.put(vec![1], vec![1]);
        batch.put(vec![2], vec![2]);
        kv.commit_batch(batch).await.unwrap();

        assert_eq!(kv.get(&[1]).await.unwrap(), Some(vec![1]));
        assert_eq!(kv.get(&[2]).await.unwrap(), Some(vec![2]));
    }

    #[tokio::test]
    async fn memory_kv_scan_range_is_bounded_and_ordered() {
        let kv = MemoryKv::new();
        let mut batch = WriteBatch::new();
        for i in 0u8..5 {
            batch.put(vec![i], vec![i]);
        }
        kv.commit_batch(batch).await.unwrap();

        let entries = kv.scan_range(&[0], &[3], 10).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, vec![0]);
        assert_eq!(entries[2].0, vec![2]);
    }

    #[tokio::test]
    async fn memory_kv_scan_range_respects_limit() {
        let kv = MemoryKv::new();
        let mut batch = WriteBatch::new();
        for i in 0u8..5 {
            batch.put(vec![i], vec![i]);
        }
        kv.commit_batch(batch).await.unwrap();

        let entries = kv.scan_range(&[0], &[255], 2).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn memory_kv_delete_removes_keys() {
        let kv = MemoryKv::new();
        let mut batch = WriteBatch::new();
        batch.put(vec![1], vec![1]);
        kv.commit_batch(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.delete(vec![1]);
        kv.commit_batch(batch).await.unwrap();

        assert_eq!(kv.get(&[1]).await.unwrap(), None);
    }
}
