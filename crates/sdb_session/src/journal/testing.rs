//! Testing helpers for the journal module.

use std::{
    collections::BTreeMap,
    time::{
        Duration,
        Instant,
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::JournalStore;

struct LogEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    logs: BTreeMap<String, LogEntry>,
    lists: BTreeMap<String, Vec<String>>,
    unavailable: bool,
}

/// An in-memory [`JournalStore`] with Redis-shaped semantics: value entries
/// expire by TTL, lists do not, and a removed-to-empty list ceases to exist.
///
/// "Random" key sampling returns the first list key in map order, which is
/// as random as a test needs, and deterministic.
#[derive(Default)]
pub struct InMemoryJournalStore {
    inner: Mutex<Inner>,
}

impl InMemoryJournalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every operation fails, like a journal store that went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }
}

impl Inner {
    fn check_available(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.unavailable, "journal store is unavailable");
        Ok(())
    }
}

/// Redis LRANGE-style index: negative counts from the end.
fn resolve_index(index: i64, len: usize) -> i64 {
    if index < 0 {
        len as i64 + index
    } else {
        index
    }
}

#[async_trait]
impl JournalStore for InMemoryJournalStore {
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        inner.logs.insert(
            key.to_owned(),
            LogEntry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        match inner.logs.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                inner.logs.remove(key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn ttl(&self, key: &str) -> anyhow::Result<i64> {
        let inner = self.inner.lock();
        inner.check_available()?;
        match inner.logs.get(key) {
            Some(entry) => {
                let remaining = entry.expires_at.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    Ok(-2)
                } else {
                    Ok(remaining.as_secs() as i64)
                }
            },
            None => Ok(-2),
        }
    }

    async fn list_append(&self, key: &str, element: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        inner
            .lists
            .entry(key.to_owned())
            .or_default()
            .push(element.to_owned());
        Ok(())
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<String>> {
        let inner = self.inner.lock();
        inner.check_available()?;
        let Some(list) = inner.lists.get(key) else {
            return Ok(vec![]);
        };
        let start = resolve_index(start, list.len()).max(0) as usize;
        let stop = resolve_index(stop, list.len());
        if stop < 0 || start >= list.len() {
            return Ok(vec![]);
        }
        let stop = (stop as usize).min(list.len() - 1);
        Ok(list[start..=stop].to_vec())
    }

    async fn list_remove(&self, key: &str, element: &str, count: usize) -> anyhow::Result<usize> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(0);
        };
        let mut removed = 0;
        list.retain(|candidate| {
            if removed < count && candidate == element {
                removed += 1;
                false
            } else {
                true
            }
        });
        if list.is_empty() {
            inner.lists.remove(key);
        }
        Ok(removed)
    }

    async fn list_delete(&self, key: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        inner.lists.remove(key);
        Ok(())
    }

    async fn list_length(&self, key: &str) -> anyhow::Result<usize> {
        let inner = self.inner.lock();
        inner.check_available()?;
        Ok(inner.lists.get(key).map_or(0, Vec::len))
    }

    async fn random_list_key(&self) -> anyhow::Result<Option<String>> {
        let inner = self.inner.lock();
        inner.check_available()?;
        Ok(inner.lists.keys().next().cloned())
    }
}
