//! Prunability oracle: read-only query answering whether committing a
//! message now would immediately make it prune-eligible.

use hub_types::{Account, StoreKind};

use crate::cache::{SetIndex, StorageCache};
use crate::error::HubStoreError;
use crate::tshash::make_ts_hash;

/// The minimal facts about a candidate message the oracle needs: its
/// account, timestamp (Farcaster-epoch seconds) and hash.
#[derive(Debug, Clone)]
pub struct CandidateMessage {
    /// Owning account.
    pub account: Account,
    /// Farcaster-epoch timestamp, in seconds.
    pub timestamp: u32,
    /// Message hash.
    pub hash: Vec<u8>,
}

/// Source of the current Farcaster-epoch time. A trait so tests can pin a
/// deterministic clock; production wiring reads the wall clock.
pub trait FarcasterClock: Send + Sync {
    /// The current time, or an error if it's unavailable.
    fn now(&self) -> Result<u32, HubStoreError>;
}

/// Answer whether committing `message` into `set` right now would make it
/// immediately prune-eligible, stopping at the first definitive answer.
pub async fn is_prunable<I: SetIndex>(
    cache: &StorageCache<I>,
    clock: &dyn FarcasterClock,
    message: &CandidateMessage,
    set: StoreKind,
    size_limit: u32,
    time_limit: Option<u32>,
) -> Result<bool, HubStoreError> {
    let now = clock.now()?;

    if let Some(time_limit) = time_limit {
        if (message.timestamp as i64) < now as i64 - time_limit as i64 {
            return Ok(true);
        }
    }

    let units = cache.get_storage_units(message.account);
    let count = cache.get_message_count(message.account, set);
    if (count as u64) < size_limit as u64 * units as u64 {
        return Ok(false);
    }

    let ts_hash = make_ts_hash(message.timestamp, &message.hash);
    let earliest = cache
        .get_earliest_ts_hash(message.account, set)
        .await?;
    match earliest {
        None => Ok(false),
        Some(earliest) => Ok(ts_hash < earliest),
    }
}
