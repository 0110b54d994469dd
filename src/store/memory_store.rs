//! In-process `Store` double.
//!
//! Gives the same atomicity and ordering guarantees as the Redis
//! implementation without a live server, so the matching pipeline's
//! scenario tests can run standalone. Shaped like `redis_store.rs`;
//! internal storage uses `dashmap` for per-key concurrent access.

use super::{Store, Write};
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Default)]
struct ZsetEntry {
    /// member -> score; order is derived on read, matching a real ZSET's
    /// score-then-member tie-break (ties are NOT insertion order, see
    /// DESIGN.md's price-time tie-break resolution).
    members: HashMap<String, f64>,
}

pub struct MemoryStore {
    hashes: DashMap<String, HashMap<String, String>>,
    zsets: DashMap<String, Mutex<ZsetEntry>>,
    lists: DashMap<String, Mutex<Vec<String>>>,
    sets: DashMap<String, std::collections::HashSet<String>>,
    list_notify: DashMap<String, std::sync::Arc<Notify>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            hashes: DashMap::new(),
            zsets: DashMap::new(),
            lists: DashMap::new(),
            sets: DashMap::new(),
            list_notify: DashMap::new(),
        }
    }

    fn notify_for(&self, key: &str) -> std::sync::Arc<Notify> {
        self.list_notify
            .entry(key.to_string())
            .or_insert_with(|| std::sync::Arc::new(Notify::new()))
            .clone()
    }

    fn apply(&self, write: Write) {
        match write {
            Write::HashSet { key, fields } => {
                self.hashes.entry(key).or_default().extend(fields);
            }
            Write::ZsetAdd { key, score, member } => {
                let entry = self.zsets.entry(key).or_default();
                entry.lock().unwrap().members.insert(member, score);
            }
            Write::ZsetRem { key, member } => {
                if let Some(entry) = self.zsets.get(&key) {
                    entry.lock().unwrap().members.remove(&member);
                }
            }
            Write::ListPushLeft { key, value } => {
                let list = self.lists.entry(key.clone()).or_default();
                list.lock().unwrap().insert(0, value);
                self.notify_for(&key).notify_waiters();
            }
            Write::ListTrim { key, start, stop } => {
                if let Some(list) = self.lists.get(&key) {
                    let mut guard = list.lock().unwrap();
                    *guard = trim(&guard, start, stop);
                }
            }
            Write::SetAdd { key, member } => {
                self.sets.entry(key).or_default().insert(member);
            }
        }
    }
}

fn trim(list: &[String], start: isize, stop: isize) -> Vec<String> {
    let len = list.len() as isize;
    let norm = |i: isize| -> isize {
        if i < 0 {
            (len + i).max(0)
        } else {
            i.min(len)
        }
    };
    let start = norm(start);
    let stop = norm(stop) + 1;
    if start >= stop || start >= len {
        return Vec::new();
    }
    list[start as usize..(stop.min(len)) as usize].to_vec()
}

#[async_trait]
impl Store for MemoryStore {
    async fn txn(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        for write in writes {
            self.apply(write);
        }
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hash_set(&self, key: &str, fields: HashMap<String, String>) -> Result<(), StoreError> {
        self.hashes.entry(key.to_string()).or_default().extend(fields);
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.hashes.get(key).map(|h| h.clone()).unwrap_or_default())
    }

    async fn zset_add(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        self.zsets
            .entry(key.to_string())
            .or_default()
            .lock()
            .unwrap()
            .members
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zset_rem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        if let Some(entry) = self.zsets.get(key) {
            entry.lock().unwrap().members.remove(member);
        }
        Ok(())
    }

    async fn zset_range_by_score(&self, key: &str, lo: f64, hi: f64) -> Result<Vec<String>, StoreError> {
        let Some(entry) = self.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let guard = entry.lock().unwrap();
        let mut members: Vec<(&String, &f64)> = guard
            .members
            .iter()
            .filter(|(_, &score)| score >= lo && score <= hi)
            .collect();
        members.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap().then_with(|| a.0.cmp(b.0)));
        Ok(members.into_iter().map(|(m, _)| m.clone()).collect())
    }

    async fn zset_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let Some(entry) = self.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let guard = entry.lock().unwrap();
        let mut members: Vec<(&String, &f64)> = guard.members.iter().collect();
        members.sort_by(|a, b| a.1.partial_cmp(b.1).unwrap().then_with(|| a.0.cmp(b.0)));
        let names: Vec<String> = members.into_iter().map(|(m, _)| m.clone()).collect();
        Ok(trim(&names, start, stop))
    }

    async fn zset_rev_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let mut ascending = self.zset_range(key, 0, -1).await?;
        ascending.reverse();
        Ok(trim(&ascending, start, stop))
    }

    async fn zset_card(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self
            .zsets
            .get(key)
            .map(|e| e.lock().unwrap().members.len() as u64)
            .unwrap_or(0))
    }

    async fn list_push_left(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lists
            .entry(key.to_string())
            .or_default()
            .lock()
            .unwrap()
            .insert(0, value.to_string());
        self.notify_for(key).notify_waiters();
        Ok(())
    }

    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        if let Some(list) = self.lists.get(key) {
            let mut guard = list.lock().unwrap();
            *guard = trim(&guard, start, stop);
        }
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let Some(list) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        let guard = list.lock().unwrap();
        Ok(trim(&guard, start, stop))
    }

    async fn list_llen(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.lists.get(key).map(|l| l.lock().unwrap().len() as u64).unwrap_or(0))
    }

    async fn list_bpop_right(&self, key: &str, timeout_secs: f64) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + Duration::from_secs_f64(timeout_secs);
        loop {
            if let Some(list) = self.lists.get(key) {
                let mut guard = list.lock().unwrap();
                if let Some(value) = guard.pop() {
                    return Ok(Some(value));
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let notify = self.notify_for(key);
            tokio::select! {
                _ = notify.notified() => continue,
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let prefix = pattern.trim_end_matches('*');
        let mut all: Vec<String> = self
            .hashes
            .iter()
            .map(|e| e.key().clone())
            .chain(self.lists.iter().map(|e| e.key().clone()))
            .chain(self.zsets.iter().map(|e| e.key().clone()))
            .chain(self.sets.iter().map(|e| e.key().clone()))
            .filter(|k| k.starts_with(prefix))
            .collect();
        all.sort();
        all.dedup();
        Ok(all)
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zset_range_by_score_ties_break_lexicographically() {
        let store = MemoryStore::new();
        store.zset_add("k", 1.0, "b").await.unwrap();
        store.zset_add("k", 1.0, "a").await.unwrap();
        let members = store.zset_range_by_score("k", 1.0, 1.0).await.unwrap();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn list_push_and_range() {
        let store = MemoryStore::new();
        store.list_push_left("q", "first").await.unwrap();
        store.list_push_left("q", "second").await.unwrap();
        let all = store.list_range("q", 0, -1).await.unwrap();
        assert_eq!(all, vec!["second".to_string(), "first".to_string()]);
    }

    #[tokio::test]
    async fn bpop_times_out_when_empty() {
        let store = MemoryStore::new();
        let result = store.list_bpop_right("empty", 0.05).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn bpop_wakes_on_push() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let store2 = store.clone();
        let handle = tokio::spawn(async move { store2.list_bpop_right("q", 2.0).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.list_push_left("q", "value").await.unwrap();
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, Some("value".to_string()));
    }
}
