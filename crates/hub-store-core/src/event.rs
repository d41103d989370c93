//! Event envelope, codec, and the structured per-kind arguments callers
//! supply to [`crate::coordinator`].
//!
//! The wire payload each variant carries is opaque to the core. The
//! remaining, structured fields (account, set, tsHash, storage units) are the
//! envelope metadata the storage cache and prunability oracle need and are
//! not part of that opaque blob; see `DESIGN.md` for why this split is the
//! faithful reading of an otherwise self-contradictory requirement.

use hub_types::{Account, HubEventKind, StoreKind};
use serde::{Deserialize, Serialize};

use crate::error::HubStoreError;
use crate::id::EventId;
use crate::tshash::TsHash;

/// Per-kind structured arguments a caller hands to
/// [`CommitCoordinator::commit`](crate::coordinator::CommitCoordinator::commit)
/// alongside a transaction already populated with their own mutations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EventArgs {
    /// A message was merged into `set` for `account`.
    MergeMessage {
        /// Owning account.
        account: Account,
        /// Store the message belongs to.
        set: StoreKind,
        /// The merged message's tsHash.
        ts_hash: TsHash,
        /// Opaque, externally-owned encoding of the merged message.
        payload: Vec<u8>,
    },
    /// A message was pruned out of `set` for `account`.
    PruneMessage {
        /// Owning account.
        account: Account,
        /// Store the message belonged to.
        set: StoreKind,
        /// The pruned message's tsHash.
        ts_hash: TsHash,
        /// Opaque, externally-owned encoding of the pruned message.
        payload: Vec<u8>,
    },
    /// A message was revoked out of `set` for `account`.
    RevokeMessage {
        /// Owning account.
        account: Account,
        /// Store the message belonged to.
        set: StoreKind,
        /// The revoked message's tsHash.
        ts_hash: TsHash,
        /// Opaque, externally-owned encoding of the revoked message.
        payload: Vec<u8>,
    },
    /// A username proof was merged for `account`; touches the `UserData`
    /// cache dimension the same way a merge does.
    MergeUsernameProof {
        /// Owning account.
        account: Account,
        /// The proof's tsHash.
        ts_hash: TsHash,
        /// Opaque, externally-owned encoding of the proof.
        payload: Vec<u8>,
    },
    /// An on-chain event was merged for `account`, optionally updating its
    /// storage-unit balance.
    MergeOnChainEvent {
        /// Owning account.
        account: Account,
        /// New storage-unit balance, if this on-chain event changed it.
        storage_units: Option<u32>,
        /// Opaque, externally-owned encoding of the on-chain event.
        payload: Vec<u8>,
    },
}

impl EventArgs {
    /// The dispatch tag this payload maps to.
    pub fn kind(&self) -> HubEventKind {
        match self {
            EventArgs::MergeMessage { .. } => HubEventKind::MergeMessage,
            EventArgs::PruneMessage { .. } => HubEventKind::PruneMessage,
            EventArgs::RevokeMessage { .. } => HubEventKind::RevokeMessage,
            EventArgs::MergeUsernameProof { .. } => HubEventKind::MergeUsernameProof,
            EventArgs::MergeOnChainEvent { .. } => HubEventKind::MergeOnChainEvent,
        }
    }

    /// The account this event is scoped to, present on every variant.
    pub fn account(&self) -> Account {
        match self {
            EventArgs::MergeMessage { account, .. }
            | EventArgs::PruneMessage { account, .. }
            | EventArgs::RevokeMessage { account, .. }
            | EventArgs::MergeUsernameProof { account, .. }
            | EventArgs::MergeOnChainEvent { account, .. } => *account,
        }
    }

    /// The store dimension this event touches, if any. `MergeOnChainEvent`
    /// has none (it only updates the account's storage-unit balance).
    /// `MergeUsernameProof` always touches `UserData`.
    pub fn set(&self) -> Option<StoreKind> {
        match self {
            EventArgs::MergeMessage { set, .. }
            | EventArgs::PruneMessage { set, .. }
            | EventArgs::RevokeMessage { set, .. } => Some(*set),
            EventArgs::MergeUsernameProof { .. } => Some(StoreKind::UserData),
            EventArgs::MergeOnChainEvent { .. } => None,
        }
    }

    /// The tsHash carried by message- and proof-kind events.
    pub fn ts_hash(&self) -> Option<&TsHash> {
        match self {
            EventArgs::MergeMessage { ts_hash, .. }
            | EventArgs::PruneMessage { ts_hash, .. }
            | EventArgs::RevokeMessage { ts_hash, .. }
            | EventArgs::MergeUsernameProof { ts_hash, .. } => Some(ts_hash),
            EventArgs::MergeOnChainEvent { .. } => None,
        }
    }
}

/// A committed event: an ID stamped onto the caller's [`EventArgs`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// The event's unique, strictly-increasing ID.
    pub id: EventId,
    /// The kind-tagged payload.
    pub args: EventArgs,
}

impl Event {
    /// The dispatch tag this event maps to.
    pub fn kind(&self) -> HubEventKind {
        self.args.kind()
    }
}

/// Encode an event for storage. Uses MessagePack (`rmp-serde`) for a compact
/// binary representation, matching the encoding the rest of the storage
/// stack already standardises on.
pub fn encode_event(event: &Event) -> Result<Vec<u8>, HubStoreError> {
    rmp_serde::to_vec_named(event)
        .map_err(|e| HubStoreError::StorageFailure(format!("event encode failed: {e}")))
}

/// Decode an event previously produced by [`encode_event`].
///
/// Any decode failure is fatal for the entry being read: it indicates
/// corruption or schema drift, and the core makes no attempt at tolerant
/// decoding.
pub fn decode_event(bytes: &[u8]) -> Result<Event, HubStoreError> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| HubStoreError::StorageFailure(format!("event decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Event {
        Event {
            id: 4097,
            args: EventArgs::MergeMessage {
                account: Account(1),
                set: StoreKind::Casts,
                ts_hash: vec![0, 0, 0, 1, 0xAB],
                payload: vec![1, 2, 3],
            },
        }
    }

    #[test]
    fn encode_decode_roundtrips() {
        let event = sample();
        let bytes = encode_event(&event).unwrap();
        let decoded = decode_event(&bytes).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn decode_failure_is_surfaced_not_swallowed() {
        let err = decode_event(&[0xFF, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, HubStoreError::StorageFailure(_)));
    }

    #[test]
    fn merge_username_proof_targets_user_data() {
        let args = EventArgs::MergeUsernameProof {
            account: Account(1),
            ts_hash: vec![0; 4],
            payload: vec![],
        };
        assert_eq!(args.set(), Some(StoreKind::UserData));
        assert_eq!(args.kind(), HubEventKind::MergeUsernameProof);
    }

    #[test]
    fn merge_on_chain_event_has_no_set() {
        let args = EventArgs::MergeOnChainEvent {
            account: Account(1),
            storage_units: Some(5),
            payload: vec![],
        };
        assert_eq!(args.set(), None);
    }
}
