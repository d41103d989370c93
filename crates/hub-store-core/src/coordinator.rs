//! Commit coordinator: serializes commits through a single logical slot,
//! stamps an ID, folds the event into the caller's transaction, commits
//! atomically, then fans the committed event out to the cache and bus in
//! commit order.
//!
//! Rendered as a bounded `mpsc` channel whose capacity *is* the commit
//! slot's queue depth: a single worker task owns the ID generator and the
//! write path, reads requests off the channel one at a time, and is the
//! only task that ever calls [`KvStore::commit_batch`]. A second bounded
//! channel carries committed events to a dedicated fan-out task so that
//! cache and bus updates run outside the slot without losing commit order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::cache::{SetIndex, StorageCache};
use crate::error::HubStoreError;
use crate::event::{encode_event, Event, EventArgs};
use crate::id::{EventId, IdGenerator};
use crate::key::make_event_key;
use crate::kv::{KvStore, WriteBatch};

/// Tunables governing the commit slot.
#[derive(Debug, Clone, Copy)]
pub struct CommitCoordinatorConfig {
    /// Maximum number of commits that may be queued awaiting the slot.
    pub lock_max_pending: usize,
    /// Maximum time a caller waits to acquire the slot before failing with
    /// `TooBusy`.
    pub lock_timeout: Duration,
}

impl Default for CommitCoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_max_pending: 1000,
            lock_timeout: Duration::from_millis(500),
        }
    }
}

/// Source of the current wall-clock time, offset from the project epoch,
/// in milliseconds (the unit the ID generator consumes). Kept separate
/// from [`crate::oracle::FarcasterClock`], which reports Farcaster-epoch
/// *seconds* for message timestamps; the two clocks serve different
/// purposes and need not share units.
pub trait Clock: Send + Sync {
    /// Milliseconds since the project epoch, right now.
    fn now_ms_since_epoch(&self) -> i64;
}

struct CommitRequest {
    txn: WriteBatch,
    args: EventArgs,
    respond_to: oneshot::Sender<Result<EventId, HubStoreError>>,
}

/// Handle used by callers to submit commits. Cloning is cheap (it's a
/// channel sender); every clone shares the same underlying slot.
#[derive(Clone)]
pub struct CommitCoordinator {
    tx: mpsc::Sender<CommitRequest>,
    lock_timeout: Duration,
}

impl CommitCoordinator {
    /// Spawn the commit worker and the fan-out consumer, returning a handle
    /// for submitting commits.
    ///
    /// `recovered_last_id` seeds the ID generator from the last extant log
    /// key. `fanout_tx` is a bounded channel feeding a consumer that applies
    /// `cache.process_event` then `bus.broadcast` in commit order, see
    /// [`spawn_fanout_consumer`].
    pub fn spawn<K, C>(
        kv: Arc<K>,
        clock: Arc<C>,
        recovered_last_id: Option<EventId>,
        config: CommitCoordinatorConfig,
        fanout_tx: mpsc::Sender<Event>,
    ) -> Self
    where
        K: KvStore + 'static,
        C: Clock + 'static,
    {
        let (tx, rx) = mpsc::channel(config.lock_max_pending);
        let id_gen = IdGenerator::recover(recovered_last_id);
        tokio::spawn(worker_loop(rx, kv, clock, id_gen, fanout_tx));
        Self {
            tx,
            lock_timeout: config.lock_timeout,
        }
    }

    /// Submit a commit. `txn` must already be populated with the caller's
    /// own store-specific mutations; this call appends the encoded event
    /// entry before committing the combined batch atomically.
    pub async fn commit(&self, txn: WriteBatch, args: EventArgs) -> Result<EventId, HubStoreError> {
        let (respond_to, respond_rx) = oneshot::channel();
        let request = CommitRequest {
            txn,
            args,
            respond_to,
        };

        match tokio::time::timeout(self.lock_timeout, self.tx.send(request)).await {
            Err(_elapsed) => return Err(HubStoreError::TooBusy),
            Ok(Err(_closed)) => {
                return Err(HubStoreError::StorageFailure(
                    "commit worker is not running".to_string(),
                ))
            }
            Ok(Ok(())) => {}
        }

        respond_rx
            .await
            .map_err(|_| HubStoreError::StorageFailure("commit worker dropped the response".to_string()))?
    }
}

async fn worker_loop<K, C>(
    mut rx: mpsc::Receiver<CommitRequest>,
    kv: Arc<K>,
    clock: Arc<C>,
    mut id_gen: IdGenerator,
    fanout_tx: mpsc::Sender<Event>,
) where
    K: KvStore,
    C: Clock,
{
    while let Some(request) = rx.recv().await {
        let now = clock.now_ms_since_epoch();
        if id_gen.would_regress(now) {
            warn!(now, "clock appears to have moved backwards; pinning id timestamp to the max observed");
        }

        let id = match id_gen.generate(now) {
            Ok(id) => id,
            Err(e) => {
                let _ = request.respond_to.send(Err(e.into()));
                continue;
            }
        };

        let event = Event {
            id,
            args: request.args,
        };

        let mut txn = request.txn;
        match encode_event(&event) {
            Ok(bytes) => txn.put(make_event_key(id), bytes),
            Err(e) => {
                let _ = request.respond_to.send(Err(e));
                continue;
            }
        }

        match kv.commit_batch(txn).await {
            Ok(()) => {
                info!(id, "committed event");
                let _ = request.respond_to.send(Ok(id));
                // Outside the slot (the next request is already free to be
                // picked up on the next loop iteration), but order-preserving:
                // a bounded send here applies backpressure rather than
                // dropping, since cache consistency must never be skipped.
                if fanout_tx.send(event).await.is_err() {
                    warn!("fan-out consumer is gone; cache and bus updates will stop");
                }
            }
            Err(e) => {
                let _ = request
                    .respond_to
                    .send(Err(HubStoreError::StorageFailure(e.to_string())));
            }
        }
    }
}

/// A subscriber-bus broadcast contract, kept separate from `hub-bus`'s
/// concrete type so this crate doesn't need to depend on it.
pub trait EventSink: Send + Sync {
    /// Dispatch `event` to whichever channel its kind maps to.
    fn broadcast(&self, event: &Event);
}

/// Spawn the single fan-out consumer that drains `fanout_rx` in order,
/// applying `cache.process_event` then `bus.broadcast` for each event.
pub fn spawn_fanout_consumer<I, B>(
    mut fanout_rx: mpsc::Receiver<Event>,
    cache: Arc<StorageCache<I>>,
    bus: Arc<B>,
) where
    I: SetIndex + 'static,
    B: EventSink + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = fanout_rx.recv().await {
            cache.process_event(&event);
            bus.broadcast(&event);
        }
    });
}
