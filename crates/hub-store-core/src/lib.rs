#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **hub-store-core** – Core abstractions for the hub store event handler.
//!
//! This crate owns the hard part: a monotonic event-ID generator, the log's
//! key layout and codec, the transactional commit discipline over an
//! abstract KV store, the per-account usage cache, and the prunability
//! oracle. It depends on no concrete storage engine; `hub-store-sled`
//! plugs a `sled`-backed [`kv::KvStore`] in and wires the pieces together
//! behind the upward interface.

/// Per-account, per-set usage cache.
pub mod cache;
/// Commit coordinator: the single commit slot, ID stamping, and
/// post-commit fan-out.
pub mod coordinator;
/// Error taxonomy.
pub mod error;
/// Event envelope, per-kind arguments, and the storage codec.
pub mod event;
/// Monotonic 53-bit event-ID generator.
pub mod id;
/// Log key layout and range-bound helpers.
pub mod key;
/// The durable event log: point lookup, scans, pagination, pruning.
pub mod log;
/// The KV store contract and an in-memory test double.
pub mod kv;
/// Prunability oracle.
pub mod oracle;
/// Time-hash (tsHash) composite identifier.
pub mod tshash;

/// Convenient prelude for importing the most common types.
pub mod prelude {
    pub use crate::cache::{SetIndex, StorageCache, UsageSnapshot};
    pub use crate::coordinator::{Clock, CommitCoordinator, CommitCoordinatorConfig, EventSink};
    pub use crate::error::{HubStoreError, Result};
    pub use crate::event::{decode_event, encode_event, Event, EventArgs};
    pub use crate::id::{EventId, IdGenerator};
    pub use crate::key::{make_event_key, parse_event_key, ROOT_PREFIX};
    pub use crate::kv::{KvStore, MemoryKv, WriteBatch};
    pub use crate::log::{get_event, get_events, get_events_page, prune_events, EventsPage};
    pub use crate::oracle::{is_prunable, CandidateMessage, FarcasterClock};
    pub use crate::tshash::{make_ts_hash, split_ts_hash, TsHash};
}
