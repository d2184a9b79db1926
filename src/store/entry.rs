//! Stored Entry Module
//!
//! Individual keys held by the in-memory store, with millisecond expiry.

use std::collections::HashMap;

use chrono::Utc;

// == Stored Value ==
/// Payload of a key: a plain string or an ordered set of scored members.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Text(String),
    /// member -> score
    Ordered(HashMap<String, f64>),
}

impl StoredValue {
    /// Redis type name, used in WRONGTYPE messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            StoredValue::Text(_) => "string",
            StoredValue::Ordered(_) => "zset",
        }
    }
}

// == Stored Entry ==
/// A single key with its value and optional expiry.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub value: StoredValue,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl StoredEntry {
    // == Constructor ==
    /// Creates an entry expiring `ttl_ms` from now, or never when `None`.
    pub fn new(value: StoredValue, ttl_ms: Option<u64>) -> Self {
        Self {
            value,
            expires_at: ttl_ms.map(|ttl| current_timestamp_ms().saturating_add(ttl)),
        }
    }

    // == Is Expired ==
    /// An entry is expired once `now >= expires_at`.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    // == Time To Live ==
    /// Remaining lifetime in milliseconds, or None if no expiration is set.
    ///
    /// Returns `Some(0)` once the entry has expired.
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.expires_at.map(|expires| expires.saturating_sub(now_ms))
    }

    /// Sets the expiry to `ttl_ms` after `now_ms`.
    pub fn expire_in(&mut self, now_ms: u64, ttl_ms: u64) {
        self.expires_at = Some(now_ms.saturating_add(ttl_ms));
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn text(value: &str) -> StoredValue {
        StoredValue::Text(value.to_string())
    }

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = StoredEntry::new(text("v"), None);

        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining_ms(current_timestamp_ms()).is_none());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = StoredEntry::new(text("v"), Some(50));

        assert!(!entry.is_expired());

        sleep(Duration::from_millis(80));

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining_ms(current_timestamp_ms()), Some(0));
    }

    #[test]
    fn test_ttl_remaining_ms() {
        let entry = StoredEntry::new(text("v"), Some(10_000));

        let remaining_ms = entry.ttl_remaining_ms(current_timestamp_ms()).unwrap();
        assert!(remaining_ms <= 10_000);
        assert!(remaining_ms >= 9_000);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = current_timestamp_ms();
        let entry = StoredEntry {
            value: text("v"),
            expires_at: Some(now),
        };

        assert!(entry.is_expired_at(now), "Entry should be expired at boundary");
        assert!(!entry.is_expired_at(now - 1));
    }

    #[test]
    fn test_expire_in_replaces_expiry() {
        let mut entry = StoredEntry::new(text("v"), None);
        entry.expire_in(1_000, 500);
        assert_eq!(entry.expires_at, Some(1_500));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(text("v").type_name(), "string");
        assert_eq!(StoredValue::Ordered(HashMap::new()).type_name(), "zset");
    }
}
