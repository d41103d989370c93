//! The durable, totally-ordered event log: point lookup, full/paged scans,
//! and time-bounded pruning.

use std::time::{Duration, Instant};

use crate::error::HubStoreError;
use crate::event::{decode_event, Event};
use crate::id::{compose_unchecked, EventId};
use crate::key::{self, ROOT_PREFIX};
use crate::kv::{KvStore, WriteBatch};

/// Entries fetched per `scan_range` call while walking a full (unpaged)
/// scan internally. Callers asking for a page choose their own size.
const SCAN_CHUNK: usize = 256;

/// Entries deleted per batch while pruning, bounding memory use during a
/// large sweep.
const PRUNE_CHUNK: usize = 256;

/// Default prune horizon: 3 days, in milliseconds.
pub const DEFAULT_PRUNE_TIME_LIMIT_MS: i64 = 3 * 24 * 60 * 60 * 1000;

/// Wall-clock budget for one `prune_events` call.
pub const PRUNE_WALL_CLOCK_BUDGET: Duration = Duration::from_secs(10 * 60);

/// Point lookup by ID.
///
/// `id == 0` is the reserved "no id" sentinel and is rejected rather than
/// silently resolving to the bare-prefix key.
pub async fn get_event(kv: &dyn KvStore, id: EventId) -> Result<Event, HubStoreError> {
    if id == 0 {
        return Err(HubStoreError::InvalidParam(
            "event id 0 is reserved and cannot be looked up".to_string(),
        ));
    }
    let key = key::make_event_key(id);
    let bytes = kv
        .get(&key)
        .await?
        .ok_or(HubStoreError::NotFound)?;
    decode_event(&bytes)
}

/// Full scan from `from_id` (inclusive) to the end of the log.
pub async fn get_events(kv: &dyn KvStore, from_id: Option<EventId>) -> Result<Vec<Event>, HubStoreError> {
    let (mut cursor, upper) = key::scan_bounds(from_id, None)?;
    let mut out = Vec::new();

    loop {
        let batch = kv.scan_range(&cursor, &upper, SCAN_CHUNK).await?;
        if batch.is_empty() {
            break;
        }
        let exhausted = batch.len() < SCAN_CHUNK;
        let last_key = batch.last().expect("checked non-empty above").0.clone();
        for (_, value) in &batch {
            out.push(decode_event(value)?);
        }
        if exhausted {
            break;
        }
        cursor = key::increment(&last_key)?;
    }

    Ok(out)
}

/// One page of a paginated scan.
#[derive(Debug, Clone, PartialEq)]
pub struct EventsPage {
    /// The events in this page, in strictly increasing ID order.
    pub events: Vec<Event>,
    /// The cursor to pass as `from_id` to fetch the next page.
    pub next_page_event_id: EventId,
}

/// Scan up to `page_size` entries `>= from_id`.
pub async fn get_events_page(
    kv: &dyn KvStore,
    from_id: EventId,
    page_size: usize,
) -> Result<EventsPage, HubStoreError> {
    let (lower, upper) = key::scan_bounds(Some(from_id), None)?;
    let batch = kv.scan_range(&lower, &upper, page_size).await?;

    let mut events = Vec::with_capacity(batch.len());
    for (_, value) in &batch {
        events.push(decode_event(value)?);
    }

    let next_page_event_id = match events.last() {
        Some(last) => last.id + 1,
        None => from_id,
    };

    Ok(EventsPage {
        events,
        next_page_event_id,
    })
}

/// Delete every event with `id < makeEventId(now_ms - epoch - time_limit_ms, 0)`.
///
/// `now_ms` is already epoch-relative (the caller subtracts the project
/// epoch before calling, matching how IDs are generated). Bounded by
/// [`PRUNE_WALL_CLOCK_BUDGET`]; exceeding the budget is not an error. The
/// sweep simply stops and the next invocation picks up where this one left
/// off, since everything before the stopping point is already gone.
pub async fn prune_events(
    kv: &dyn KvStore,
    now_ms: i64,
    time_limit_ms: i64,
) -> Result<usize, HubStoreError> {
    let threshold_ts = (now_ms - time_limit_ms).max(0);
    let upper = key::make_event_key(compose_unchecked(threshold_ts, 0));
    let lower = vec![ROOT_PREFIX];

    let start = Instant::now();
    let mut deleted = 0usize;

    loop {
        if start.elapsed() >= PRUNE_WALL_CLOCK_BUDGET {
            break;
        }
        let batch = kv.scan_range(&lower, &upper, PRUNE_CHUNK).await?;
        if batch.is_empty() {
            break;
        }
        let exhausted = batch.len() < PRUNE_CHUNK;
        let mut write = WriteBatch::new();
        for (key, _) in &batch {
            write.delete(key.clone());
        }
        deleted += batch.len();
        kv.commit_batch(write).await?;
        if exhausted {
            break;
        }
    }

    Ok(deleted)
}
