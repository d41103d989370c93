//! Time-hash (tsHash): a composite, lexicographically-ordered identifier
//! combining a Farcaster-epoch timestamp with a message hash.
//!
//! The core only ever compares tsHashes byte-wise; it never interprets the
//! hash portion. The timestamp is stored big-endian so that byte order
//! equals `(timestamp, hash)` tuple order.

/// An opaque, comparable time-hash.
pub type TsHash = Vec<u8>;

/// Build the tsHash for `(timestamp, hash)`.
pub fn make_ts_hash(timestamp: u32, hash: &[u8]) -> TsHash {
    let mut out = Vec::with_capacity(4 + hash.len());
    out.extend_from_slice(&timestamp.to_be_bytes());
    out.extend_from_slice(hash);
    out
}

/// Split a tsHash back into its `(timestamp, hash)` components. Returns
/// `None` if `ts_hash` is shorter than the 4-byte timestamp prefix.
pub fn split_ts_hash(ts_hash: &[u8]) -> Option<(u32, &[u8])> {
    if ts_hash.len() < 4 {
        return None;
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&ts_hash[..4]);
    Some((u32::from_be_bytes(buf), &ts_hash[4..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_timestamp_first() {
        let earlier = make_ts_hash(100, &[0xFF]);
        let later = make_ts_hash(101, &[0x00]);
        assert!(earlier < later);
    }

    #[test]
    fn ordering_falls_back_to_hash_on_tie() {
        let a = make_ts_hash(100, &[0x01]);
        let b = make_ts_hash(100, &[0x02]);
        assert!(a < b);
    }

    #[test]
    fn split_roundtrips() {
        let ts_hash = make_ts_hash(42, b"hash-bytes");
        let (timestamp, hash) = split_ts_hash(&ts_hash).unwrap();
        assert_eq!(timestamp, 42);
        assert_eq!(hash, b"hash-bytes");
    }

    #[test]
    fn split_rejects_too_short() {
        assert_eq!(split_ts_hash(&[1, 2, 3]), None);
    }
}
