//! Log key layout: `[root-prefix:1 | id_be:8]`.
//!
//! The big-endian 8-byte ID encoding makes lexicographic key order equal to
//! numeric ID order, so a plain byte-range scan over the KV store is already
//! an ID-ordered scan.

use crate::error::HubStoreError;
use crate::id::EventId;

/// Single-byte prefix reserved for every key the core owns.
pub const ROOT_PREFIX: u8 = 0x07;

/// Build the 9-byte storage key for `id`.
///
/// `id = 0` is treated as "no id supplied" and produces the bare 1-byte
/// prefix, the lower bound for a full-log scan. This is a reserved-id
/// footgun kept intentionally rather than papered over: callers must never
/// request `get_event(0)`.
pub fn make_event_key(id: EventId) -> Vec<u8> {
    if id == 0 {
        return vec![ROOT_PREFIX];
    }
    let mut key = Vec::with_capacity(9);
    key.push(ROOT_PREFIX);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Parse a 9-byte event key back into its ID. Returns `None` for the bare
/// 1-byte prefix or any key that doesn't belong to the event log.
pub fn parse_event_key(key: &[u8]) -> Option<EventId> {
    if key.len() != 9 || key[0] != ROOT_PREFIX {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[1..9]);
    Some(EventId::from_be_bytes(buf))
}

/// Byte-wise increment of a key, promoting carries cleanly. Used to turn an
/// inclusive bound into the next key strictly after it (e.g. deriving the
/// exclusive upper bound for a full-prefix scan from the bare prefix).
///
/// Fails if the key is already all-`0xFF`: there is no greater key to scan
/// up to, and silently scanning to the end of the keyspace instead of
/// surfacing an error would be worse than failing loudly.
pub fn increment(key: &[u8]) -> Result<Vec<u8>, HubStoreError> {
    let mut out = key.to_vec();
    for byte in out.iter_mut().rev() {
        if *byte != 0xFF {
            *byte += 1;
            return Ok(out);
        }
        *byte = 0x00;
    }
    Err(HubStoreError::InvalidParam(
        "key has no successor; all bytes are 0xFF".to_string(),
    ))
}

/// Compute the `[lower, upper)` byte-range for a log scan.
///
/// `from_id` is the inclusive lower bound (`None` scans the whole log).
/// `to_id` is the exclusive upper bound (`None` scans to the end of the
/// core's key prefix).
pub fn scan_bounds(
    from_id: Option<EventId>,
    to_id: Option<EventId>,
) -> Result<(Vec<u8>, Vec<u8>), HubStoreError> {
    let lower = match from_id {
        Some(id) => make_event_key(id),
        None => vec![ROOT_PREFIX],
    };
    let upper = match to_id {
        Some(id) => make_event_key(id),
        None => increment(&[ROOT_PREFIX])?,
    };
    Ok((lower, upper))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_event_key_is_nine_bytes_for_nonzero_id() {
        let key = make_event_key(4097);
        assert_eq!(key.len(), 9);
        assert_eq!(key[0], ROOT_PREFIX);
    }

    #[test]
    fn make_event_key_zero_is_bare_prefix() {
        let key = make_event_key(0);
        assert_eq!(key, vec![ROOT_PREFIX]);
    }

    #[test]
    fn parse_event_key_roundtrips() {
        let key = make_event_key(123_456_789);
        assert_eq!(parse_event_key(&key), Some(123_456_789));
    }

    #[test]
    fn parse_event_key_rejects_bare_prefix() {
        assert_eq!(parse_event_key(&[ROOT_PREFIX]), None);
    }

    #[test]
    fn key_order_equals_numeric_order() {
        let a = make_event_key(1);
        let b = make_event_key(2);
        let c = make_event_key(1000);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn increment_promotes_carry() {
        assert_eq!(increment(&[0x07, 0x00]).unwrap(), vec![0x07, 0x01]);
        assert_eq!(increment(&[0x07, 0xFF]).unwrap(), vec![0x08, 0x00]);
    }

    #[test]
    fn increment_all_ff_is_an_error() {
        assert!(increment(&[0xFF, 0xFF]).is_err());
    }

    #[test]
    fn scan_bounds_default_covers_whole_prefix() {
        let (lower, upper) = scan_bounds(None, None).unwrap();
        assert_eq!(lower, vec![ROOT_PREFIX]);
        assert_eq!(upper, vec![ROOT_PREFIX + 1]);
    }

    #[test]
    fn scan_bounds_respects_explicit_from_and_to() {
        let (lower, upper) = scan_bounds(Some(10), Some(20)).unwrap();
        assert_eq!(lower, make_event_key(10));
        assert_eq!(upper, make_event_key(20));
    }
}
