use std::sync::atomic::{
    AtomicU64,
    Ordering,
};

/// Process-lifetime operation counters, shared between a client and its
/// journal. Cheap to bump from any thread; read them with
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct SessionStats {
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    selects: AtomicU64,
    replayed_actions: AtomicU64,
    expired_entries_removed: AtomicU64,
}

/// A point-in-time copy of [`SessionStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Item reads issued to the backing store.
    pub gets: u64,
    /// Put requests issued to the backing store (a batch counts once).
    pub puts: u64,
    /// Delete requests issued to the backing store.
    pub deletes: u64,
    /// Select queries run (each counted once, however many pages).
    pub selects: u64,
    /// Journaled actions replayed over stale reads.
    pub replayed_actions: u64,
    /// Expired journal-list entries lazily removed.
    pub expired_entries_removed: u64,
}

impl SessionStats {
    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_select(&self) {
        self.selects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replayed_action(&self) {
        self.replayed_actions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expired_entry_removed(&self) {
        self.expired_entries_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            selects: self.selects.load(Ordering::Relaxed),
            replayed_actions: self.replayed_actions.load(Ordering::Relaxed),
            expired_entries_removed: self.expired_entries_removed.load(Ordering::Relaxed),
        }
    }
}
