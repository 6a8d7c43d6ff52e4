//! Synchronization cursor store
//!
//! A pure recorder for the opaque cursor: the structured key/value list
//! goes back out in delta-fetch bodies, the flattened string in probe
//! query strings. Advanced only after a successful fetch; a failed fetch
//! leaves the prior cursor intact so the next attempt re-requests the
//! same window.

use crate::wire::api::SyncKeyList;

/// The opaque synchronization cursor plus its derived wire string
#[derive(Debug, Clone, Default)]
pub struct SyncCursor {
    structured: SyncKeyList,
    flat: String,
}

impl SyncCursor {
    /// The structured cursor for the next delta-fetch body
    pub fn structured(&self) -> &SyncKeyList {
        &self.structured
    }

    /// The flattened `key_val|key_val` probe token
    pub fn flat(&self) -> &str {
        &self.flat
    }

    /// Record a fresh cursor from a successful fetch.
    ///
    /// `check_key` is the server's separate probe-token list when it sends
    /// one; otherwise the flat form is derived from the structured list.
    /// Pair order is preserved exactly as received: the server treats the
    /// flattened string as its own token.
    pub fn advance(&mut self, structured: SyncKeyList, check_key: Option<&SyncKeyList>) {
        self.flat = flatten(check_key.unwrap_or(&structured));
        self.structured = structured;
    }
}

/// Join cursor pairs as `key_val` items separated by `|`, in list order
fn flatten(keys: &SyncKeyList) -> String {
    keys.list
        .iter()
        .map(|pair| format!("{}_{}", pair.key, pair.val))
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::api::SyncKeyPair;

    fn keys(pairs: &[(i64, i64)]) -> SyncKeyList {
        SyncKeyList {
            count: pairs.len() as i64,
            list: pairs.iter().map(|&(key, val)| SyncKeyPair { key, val }).collect(),
        }
    }

    #[test]
    fn test_flat_join_order() {
        let mut cursor = SyncCursor::default();
        cursor.advance(keys(&[(1, 100), (2, 200), (3, 300)]), None);
        assert_eq!(cursor.flat(), "1_100|2_200|3_300");
    }

    #[test]
    fn test_order_preserved_as_received() {
        // no reordering even when keys arrive out of numeric order
        let mut cursor = SyncCursor::default();
        cursor.advance(keys(&[(3, 300), (1, 100)]), None);
        assert_eq!(cursor.flat(), "3_300|1_100");
    }

    #[test]
    fn test_check_key_drives_flat_form() {
        let mut cursor = SyncCursor::default();
        cursor.advance(keys(&[(1, 100), (2, 200)]), Some(&keys(&[(1, 101)])));
        assert_eq!(cursor.flat(), "1_101");
        assert_eq!(cursor.structured().list.len(), 2);
    }

    #[test]
    fn test_advance_replaces_prior_cursor() {
        let mut cursor = SyncCursor::default();
        cursor.advance(keys(&[(1, 100)]), None);
        cursor.advance(keys(&[(1, 105), (2, 7)]), None);
        assert_eq!(cursor.flat(), "1_105|2_7");
    }

    #[test]
    fn test_empty_cursor() {
        let cursor = SyncCursor::default();
        assert_eq!(cursor.flat(), "");
        assert!(cursor.structured().list.is_empty());
    }
}
