//! In-Memory Store Module
//!
//! A process-local [`KeyValueStore`] with the same atomicity guarantees as
//! the Redis adapter. Every operation runs under one mutex, so each contract
//! method is observed as a single step by concurrent callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{CoordError, Result};
use crate::store::{
    current_timestamp_ms, expiry_millis, KeyTtl, KeyValueStore, ScoredMember,
    StoredEntry, StoredValue, WindowAdmission,
};

type Entries = HashMap<String, StoredEntry>;

// == Memory Store ==
/// Shared in-memory store. Clones share the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<Entries>>,
    available: Arc<AtomicBool>,
}

impl MemoryStore {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulates losing (`false`) or regaining (`true`) the connection.
    /// While unavailable every operation fails with `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    // == Purge Expired ==
    /// Removes all expired keys, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    /// Number of keys held, including expired keys not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CoordError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(self.entries.lock().await)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Drops `key` if it has expired, so lookups only ever see live entries.
fn evict_if_expired(entries: &mut Entries, key: &str, now: u64) {
    if entries.get(key).is_some_and(|e| e.is_expired_at(now)) {
        entries.remove(key);
    }
}

fn wrong_type(key: &str, found: &StoredValue) -> CoordError {
    CoordError::StoreRejected(format!(
        "WRONGTYPE key '{}' holds a {}",
        key,
        found.type_name()
    ))
}

/// Ordered set stored under `key`, or None when the key is absent.
fn ordered_set<'a>(
    entries: &'a mut Entries,
    key: &str,
) -> Result<Option<&'a mut HashMap<String, f64>>> {
    match entries.get_mut(key) {
        None => Ok(None),
        Some(entry) => match &mut entry.value {
            StoredValue::Ordered(members) => Ok(Some(members)),
            other => Err(wrong_type(key, other)),
        },
    }
}

/// Resolves Redis-style inclusive ranks against a collection of `len` items.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, current_timestamp_ms());
        match entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                StoredValue::Text(value) => Ok(Some(value.clone())),
                other => Err(wrong_type(key, other)),
            },
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let ttl_ms = ttl.map(expiry_millis).transpose()?;
        let mut entries = self.lock().await?;
        entries.insert(
            key.to_string(),
            StoredEntry::new(StoredValue::Text(value.to_string()), ttl_ms),
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, current_timestamp_ms());
        Ok(entries.remove(key).is_some())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, current_timestamp_ms());
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| StoredEntry::new(StoredValue::Text("0".to_string()), None));
        let raw = match &mut entry.value {
            StoredValue::Text(raw) => raw,
            other => return Err(wrong_type(key, other)),
        };
        let next = raw
            .parse::<i64>()
            .ok()
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| {
                CoordError::StoreRejected(format!(
                    "value of '{}' is not an integer or out of range",
                    key
                ))
            })?;
        *raw = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let ttl_ms = expiry_millis(ttl)?;
        let now = current_timestamp_ms();
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expire_in(now, ttl_ms);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let now = current_timestamp_ms();
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, now);
        Ok(match entries.get(key) {
            None => KeyTtl::Missing,
            Some(entry) => match entry.ttl_remaining_ms(now) {
                None => KeyTtl::Persistent,
                Some(ms) => KeyTtl::Expires(Duration::from_millis(ms)),
            },
        })
    }

    async fn set_if_absent(&self, key: &str, value: &str, lease: Duration) -> Result<bool> {
        let lease_ms = expiry_millis(lease)?;
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, current_timestamp_ms());
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredEntry::new(StoredValue::Text(value.to_string()), Some(lease_ms)),
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, current_timestamp_ms());
        let matches = matches!(
            entries.get(key).map(|e| &e.value),
            Some(StoredValue::Text(current)) if current == expected
        );
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        expected: &str,
        additional: Duration,
    ) -> Result<bool> {
        let additional_ms = expiry_millis(additional)?;
        let now = current_timestamp_ms();
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(entry) if matches!(&entry.value, StoredValue::Text(v) if v == expected) => {
                let remaining = entry.ttl_remaining_ms(now).unwrap_or(0);
                entry.expire_in(now, remaining.saturating_add(additional_ms));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn add_to_ordered_set(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, current_timestamp_ms());
        match ordered_set(&mut entries, key)? {
            Some(members) => {
                members.insert(member.to_string(), score);
            }
            None => {
                let members = HashMap::from([(member.to_string(), score)]);
                entries.insert(
                    key.to_string(),
                    StoredEntry::new(StoredValue::Ordered(members), None),
                );
            }
        }
        Ok(())
    }

    async fn remove_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, current_timestamp_ms());
        let Some(members) = ordered_set(&mut entries, key)? else {
            return Ok(0);
        };
        let before = members.len();
        members.retain(|_, score| *score < min || *score > max);
        let removed = (before - members.len()) as u64;
        if members.is_empty() {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn count_ordered_set(&self, key: &str) -> Result<u64> {
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, current_timestamp_ms());
        Ok(ordered_set(&mut entries, key)?.map_or(0, |m| m.len() as u64))
    }

    async fn range_ordered_set(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<ScoredMember>> {
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, current_timestamp_ms());
        let Some(members) = ordered_set(&mut entries, key)? else {
            return Ok(Vec::new());
        };

        let mut sorted: Vec<ScoredMember> = members
            .iter()
            .map(|(member, score)| ScoredMember {
                member: member.clone(),
                score: *score,
            })
            .collect();
        sorted.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then_with(|| a.member.cmp(&b.member))
        });

        Ok(match resolve_range(sorted.len(), start, stop) {
            Some((from, to)) => sorted.drain(from..=to).collect(),
            None => Vec::new(),
        })
    }

    async fn admit_sliding_window(&self, key: &str, admission: &WindowAdmission) -> Result<bool> {
        let window_ms = expiry_millis(admission.window)?;
        let now = current_timestamp_ms();
        let window_start = admission.window_start_ms();
        let mut entries = self.lock().await?;
        evict_if_expired(&mut entries, key, now);

        let count = match ordered_set(&mut entries, key)? {
            Some(members) => {
                members.retain(|_, score| *score >= window_start);
                members.len() as u64
            }
            None => 0,
        };

        if count >= admission.limit {
            if count == 0 {
                entries.remove(key);
            }
            debug!(key = %key, count, limit = admission.limit, "sliding window full");
            return Ok(false);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| {
            StoredEntry::new(StoredValue::Ordered(HashMap::new()), None)
        });
        if let StoredValue::Ordered(members) = &mut entry.value {
            members.insert(admission.member.clone(), admission.now_ms as f64);
        }
        entry.expire_in(now, window_ms);
        debug!(key = %key, count = count + 1, window_ms, "admission recorded");
        Ok(true)
    }
}
