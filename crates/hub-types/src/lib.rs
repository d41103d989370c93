#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **hub-types** – Shared primitive identifiers for the hub store event handler.
//!
//! This crate is dependency-light and sits at the bottom of the crate graph
//! so that the storage core, the bus and any concrete storage driver can all
//! depend on it without introducing cycles. It makes no assumptions about
//! I/O, serialization format, or storage layout beyond the tags needed to
//! partition per-account usage.

use serde::{Deserialize, Serialize};

//─────────────────────────────
//  Account identifier
//─────────────────────────────

/// Numeric identifier for an account (fid) within the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(pub u64);

impl From<u64> for Account {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

//─────────────────────────────
//  Store kind
//─────────────────────────────

/// Logical store a message belongs to; the cache dimension alongside
/// [`Account`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StoreKind {
    /// Cast (post) messages.
    Casts,
    /// Social graph links (follows, etc).
    Links,
    /// Reactions (likes, recasts).
    Reactions,
    /// Profile/user-data messages.
    UserData,
    /// Verified address ownership claims.
    Verifications,
    /// Username proof claims.
    UsernameProofs,
}

impl StoreKind {
    /// All store kinds, in a stable order. Useful for `sync_from_db` sweeps
    /// that must rebuild every cache dimension for an account.
    pub const ALL: [StoreKind; 6] = [
        StoreKind::Casts,
        StoreKind::Links,
        StoreKind::Reactions,
        StoreKind::UserData,
        StoreKind::Verifications,
        StoreKind::UsernameProofs,
    ];
}

//─────────────────────────────
//  Event kind
//─────────────────────────────

/// The five event kinds the store event handler recognises. Used both to
/// tag a committed [`Event`](../hub_store_core/event/struct.Event.html) and
/// to select which subscriber-bus channel dispatches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HubEventKind {
    /// A message was merged into one of the per-account stores.
    MergeMessage,
    /// A message was pruned for being over the size/time limit.
    PruneMessage,
    /// A message was revoked (e.g. by its signer).
    RevokeMessage,
    /// A username proof was merged.
    MergeUsernameProof,
    /// An on-chain event (e.g. a storage-unit purchase) was merged.
    MergeOnChainEvent,
}

impl HubEventKind {
    /// All event kinds, in the order the subscriber bus's channels are
    /// registered.
    pub const ALL: [HubEventKind; 5] = [
        HubEventKind::MergeMessage,
        HubEventKind::PruneMessage,
        HubEventKind::RevokeMessage,
        HubEventKind::MergeUsernameProof,
        HubEventKind::MergeOnChainEvent,
    ];
}

//─────────────────────────────
//  Project epoch
//─────────────────────────────

/// Reference millisecond timestamp the hub's 41-bit event timestamps are
/// offset from. Fixed at the project epoch so IDs issued years into the
/// project's life still fit in 41 bits.
pub const FARCASTER_EPOCH_MS: i64 = 1_609_459_200_000; // 2021-01-01T00:00:00Z

/// Number of bits reserved for the timestamp component of an event ID.
pub const TIMESTAMP_BITS: u32 = 41;

/// Number of bits reserved for the intra-millisecond sequence component.
pub const SEQUENCE_BITS: u32 = 12;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_kind_all_is_exhaustive_and_stable() {
        assert_eq!(StoreKind::ALL.len(), 6);
        assert_eq!(StoreKind::ALL[0], StoreKind::Casts);
        assert_eq!(StoreKind::ALL[5], StoreKind::UsernameProofs);
    }

    #[test]
    fn account_roundtrips_through_json() {
        let acct = Account(42);
        let json = serde_json::to_string(&acct).unwrap();
        assert_eq!(json, "42");
        let back: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(back, acct);
    }
}
