use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{CacheError, Result};

/// Characters that may never appear in a cache key
const RESERVED_KEY_CHARS: &[char] = &['{', '}', '(', ')', '/', '\\', '@', ':'];

/// Reject illegal keys before any storage access
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }
    if let Some(c) = key.chars().find(|c| RESERVED_KEY_CHARS.contains(c)) {
        return Err(CacheError::InvalidKey(format!(
            "key {:?} contains reserved character {:?}",
            key, c
        )));
    }
    Ok(())
}

/// Behavior of a single cache item, independent of the pool that minted it
pub trait CacheItem {
    /// The key this item is stored under
    fn key(&self) -> &str;

    /// The cached value, present only while `is_hit` is true
    fn get(&self) -> Option<&Value>;

    /// Whether the item holds a value that has not expired
    fn is_hit(&self) -> bool;

    /// Store a value and mark the item as a hit
    fn set(&mut self, value: Value) -> &mut Self;

    /// Set an absolute expiration instant; `None` means never expire
    fn expires_at(&mut self, at: Option<DateTime<Utc>>) -> &mut Self;

    /// Set expiration relative to now; `None` clears it
    fn expires_after(&mut self, ttl: impl Into<Option<TimeDelta>>) -> &mut Self;
}

/// One cached key/value pair plus its hit flag and optional expiration.
///
/// The serialized form is the entry's full state, so a pool restores
/// key, value, hit flag and expiration exactly as they were saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    key: String,
    value: Option<Value>,
    hit: bool,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Create an empty miss placeholder for `key`
    pub fn new(key: &str) -> Result<Self> {
        validate_key(key)?;
        Ok(Self {
            key: key.to_string(),
            value: None,
            hit: false,
            expires_at: None,
        })
    }

    /// The absolute expiration instant, if one is set
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Serialize the entry's full state for storage
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Reconstitute an entry from its stored form
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl CacheItem for CacheEntry {
    fn key(&self) -> &str {
        &self.key
    }

    fn get(&self) -> Option<&Value> {
        if self.is_hit() {
            self.value.as_ref()
        } else {
            None
        }
    }

    fn is_hit(&self) -> bool {
        // The stored flag is never cleared on expiry; expiration is
        // re-evaluated on every call so `get` and `is_hit` always agree.
        self.hit && self.expires_at.map_or(true, |at| Utc::now() < at)
    }

    fn set(&mut self, value: Value) -> &mut Self {
        self.value = Some(value);
        self.hit = true;
        self
    }

    fn expires_at(&mut self, at: Option<DateTime<Utc>>) -> &mut Self {
        self.expires_at = at;
        self
    }

    fn expires_after(&mut self, ttl: impl Into<Option<TimeDelta>>) -> &mut Self {
        self.expires_at(ttl.into().map(|ttl| Utc::now() + ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn fresh_entry_is_a_miss() {
        let entry = CacheEntry::new("greeting").unwrap();
        assert_eq!(entry.key(), "greeting");
        assert!(!entry.is_hit());
        assert_eq!(entry.get(), None);
    }

    #[test]
    fn invalid_keys_are_rejected() {
        for key in ["", "a/b", "a\\b", "a:b", "{tag}", "user@host", "f(x)"] {
            assert!(
                matches!(CacheEntry::new(key), Err(CacheError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn set_marks_hit_and_chains() {
        let mut entry = CacheEntry::new("answer").unwrap();
        entry.set(json!(42)).expires_after(TimeDelta::hours(1));
        assert!(entry.is_hit());
        assert_eq!(entry.get(), Some(&json!(42)));
        assert!(entry.expiration().is_some());
    }

    #[test]
    fn cached_null_is_still_a_hit() {
        let mut entry = CacheEntry::new("nothing").unwrap();
        entry.set(Value::Null);
        assert!(entry.is_hit());
        assert_eq!(entry.get(), Some(&Value::Null));
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let mut entry = CacheEntry::new("gone").unwrap();
        entry.set(json!("v")).expires_after(TimeDelta::zero());
        assert!(!entry.is_hit());
        assert_eq!(entry.get(), None);
    }

    #[test]
    fn past_absolute_expiration_is_a_miss() {
        let mut entry = CacheEntry::new("stale").unwrap();
        entry
            .set(json!("v"))
            .expires_at(Some(Utc::now() - TimeDelta::seconds(5)));
        assert!(!entry.is_hit());
    }

    #[test]
    fn clearing_expiration_restores_the_hit() {
        // The hit flag is stored, not cleared on expiry, so lifting the
        // expiration makes the value visible again.
        let mut entry = CacheEntry::new("phoenix").unwrap();
        entry.set(json!(1)).expires_after(TimeDelta::zero());
        assert!(!entry.is_hit());

        entry.expires_after(None);
        assert!(entry.is_hit());
        assert_eq!(entry.get(), Some(&json!(1)));
    }

    #[test]
    fn encode_decode_round_trips_full_state() {
        let mut entry = CacheEntry::new("payload").unwrap();
        entry
            .set(json!({"count": 3, "tags": ["a", "b"]}))
            .expires_at(Some(Utc::now() + TimeDelta::days(1)));

        let decoded = CacheEntry::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn encode_decode_round_trips_empty_state() {
        let entry = CacheEntry::new("empty").unwrap();
        let decoded = CacheEntry::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded, entry);
        assert!(!decoded.is_hit());
    }

    #[test]
    fn corrupt_bytes_fail_to_decode() {
        assert!(CacheEntry::decode(b"not json at all").is_err());
    }
}
