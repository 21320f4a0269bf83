//! The per-process action journal.
//!
//! Every mutation this process performs is recorded here for `journal_ttl`
//! seconds: long enough for the backing store's replicas to converge. The
//! read path asks the journal for every action recorded after a read's
//! baseline timestamp and replays them over the (possibly stale) response.
//!
//! Layout in the [`JournalStore`], two disjoint key families:
//!
//! - **log family**: `<domain>:<item>:<timestamp>` → serialized [`Action`],
//!   expiring after the TTL;
//! - **list family**: `<domain>:<item>` → append-ordered list of timestamp
//!   strings. List elements cannot carry a TTL, so expired entries are
//!   removed lazily during replay and by [`Journal::random_cleanup`].

use std::{
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use sdb_item_types::{
    Action,
    Attributes,
    Timestamp,
};

use crate::stats::SessionStats;

#[cfg(feature = "redis-journal")]
pub mod redis;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Durable-enough scratch storage for the journal.
///
/// Implementations hold two *disjoint* key families. The value methods
/// (`set_with_ttl`, `get`, `ttl`) address the log family; the `list_*`
/// methods and [`random_list_key`](Self::random_list_key) address the list
/// family. Disjointness is what makes random sampling for cleanup safe: a
/// sampled key is always a timestamp list, never a log entry. The bundled
/// Redis implementation uses two logical databases, as two key prefixes or
/// two tables would do equally well.
///
/// All failures are ordinary `anyhow` errors; callers in this module treat
/// them as degraded service, never as fatal.
#[async_trait]
pub trait JournalStore: Send + Sync {
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> anyhow::Result<()>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    /// Seconds until `key` expires; negative when absent or persistent.
    async fn ttl(&self, key: &str) -> anyhow::Result<i64>;

    async fn list_append(&self, key: &str, element: &str) -> anyhow::Result<()>;
    /// Inclusive range, `-1` meaning the last element.
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<String>>;
    /// Removes up to `count` occurrences of `element`, returning how many
    /// were removed.
    async fn list_remove(&self, key: &str, element: &str, count: usize) -> anyhow::Result<usize>;
    async fn list_delete(&self, key: &str) -> anyhow::Result<()>;
    async fn list_length(&self, key: &str) -> anyhow::Result<usize>;
    /// A uniformly sampled key of the list family, if any exist.
    async fn random_list_key(&self) -> anyhow::Result<Option<String>>;
}

pub(crate) fn log_key(domain: &str, item: &str, timestamp: Timestamp) -> String {
    format!("{domain}:{item}:{timestamp}")
}

pub(crate) fn list_key(domain: &str, item: &str) -> String {
    format!("{domain}:{item}")
}

/// The journaling protocol over a [`JournalStore`].
#[derive(Clone)]
pub struct Journal {
    store: Arc<dyn JournalStore>,
    ttl: Duration,
    stats: Arc<SessionStats>,
}

impl Journal {
    pub fn new(store: Arc<dyn JournalStore>, ttl: Duration, stats: Arc<SessionStats>) -> Self {
        Self { store, ttl, stats }
    }

    /// Records one performed mutation.
    ///
    /// The log entry and the list append are two separate writes; if the
    /// second is lost the entry simply ages out unreferenced. Callers decide
    /// what a failure means; the client downgrades it to a warning, since
    /// the mutation itself already succeeded remotely.
    pub async fn log_action(
        &self,
        domain: &str,
        item: &str,
        timestamp: Timestamp,
        action: &Action,
    ) -> anyhow::Result<()> {
        let serialized = serde_json::to_vec(action)?;
        self.store
            .set_with_ttl(&log_key(domain, item, timestamp), &serialized, self.ttl)
            .await?;
        self.store
            .list_append(&list_key(domain, item), &timestamp.to_string())
            .await?;
        Ok(())
    }

    /// Replays onto `item_state` every still-live action recorded for the
    /// item strictly after `baseline`, in recorded order, and returns the
    /// result. Expired entries encountered along the way are removed from
    /// the list.
    ///
    /// This never fails: journal trouble at worst means returning
    /// `item_state` as the store reported it.
    pub async fn replay_since(
        &self,
        domain: &str,
        item: &str,
        baseline: Timestamp,
        item_state: Attributes,
    ) -> Attributes {
        let list_key = list_key(domain, item);
        let entries = match self.store.list_range(&list_key, 0, -1).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("journal unavailable, returning store state for {domain}:{item}: {e:#}");
                return item_state;
            },
        };

        let now = Timestamp::now();
        let mut state = item_state;
        for entry in entries {
            let timestamp: Timestamp = match entry.parse() {
                Ok(ts) => ts,
                Err(e) => {
                    // A garbage list element can never match a log entry;
                    // drop it so it stops costing a parse per read.
                    tracing::debug!("removing unparseable journal entry {entry:?}: {e}");
                    self.remove_list_entry(&list_key, &entry).await;
                    continue;
                },
            };

            if timestamp.age_at(now) >= self.ttl {
                self.remove_list_entry(&list_key, &entry).await;
                self.stats.record_expired_entry_removed();
                continue;
            }

            if timestamp > baseline {
                if let Some(action) = self.load_action(domain, item, timestamp).await {
                    state = action.apply(&state);
                    self.stats.record_replayed_action();
                }
            }
        }
        state
    }

    async fn load_action(&self, domain: &str, item: &str, timestamp: Timestamp) -> Option<Action> {
        let key = log_key(domain, item, timestamp);
        let bytes = match self.store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            // Evicted before its list entry was cleaned: a legal race.
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("journal read failed for {key}: {e:#}");
                return None;
            },
        };
        match serde_json::from_slice(&bytes) {
            Ok(action) => Some(action),
            Err(e) => {
                // A stale or corrupt encoding must not poison the read path;
                // the entry falls out by TTL regardless.
                tracing::debug!("dropping undecodable journal entry {key}: {e}");
                None
            },
        }
    }

    async fn remove_list_entry(&self, list_key: &str, entry: &str) {
        if let Err(e) = self.store.list_remove(list_key, entry, 1).await {
            tracing::warn!("failed to remove journal entry {entry:?} from {list_key}: {e:#}");
        }
    }

    /// Samples one random per-item timestamp list and strips its expired
    /// entries, returning how many were removed. Bounds list growth for
    /// items that are never read again. Idempotent and safe to run
    /// concurrently with readers.
    pub async fn random_cleanup(&self) -> anyhow::Result<usize> {
        let Some(list_key) = self.store.random_list_key().await? else {
            return Ok(0);
        };
        let entries = self.store.list_range(&list_key, 0, -1).await?;
        let now = Timestamp::now();
        let mut removed = 0;
        for entry in entries {
            let expired = match entry.parse::<Timestamp>() {
                Ok(timestamp) => timestamp.age_at(now) >= self.ttl,
                Err(_) => true,
            };
            if expired {
                let n = self.store.list_remove(&list_key, &entry, 1).await?;
                removed += n;
                if n > 0 {
                    self.stats.record_expired_entry_removed();
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::Duration,
    };

    use maplit::btreemap;
    use pretty_assertions::assert_eq;
    use sdb_item_types::{
        Action,
        Attributes,
        DeleteAction,
        PutAction,
        PutSpec,
        Timestamp,
        ValueSet,
    };

    use super::{
        list_key,
        log_key,
        testing::InMemoryJournalStore,
        Journal,
        JournalStore,
    };
    use crate::stats::SessionStats;

    const TTL: Duration = Duration::from_secs(60);

    fn journal() -> (Journal, Arc<InMemoryJournalStore>, Arc<SessionStats>) {
        let store = Arc::new(InMemoryJournalStore::new());
        let stats = Arc::new(SessionStats::default());
        (
            Journal::new(store.clone(), TTL, stats.clone()),
            store,
            stats,
        )
    }

    fn put(name: &str, values: impl Into<ValueSet>) -> Action {
        Action::Put(PutAction::from(btreemap! {
            name.to_owned() => PutSpec::append(values),
        }))
    }

    /// A timestamp `age` ago, for fabricating journal entries of known age.
    fn aged(age: Duration) -> Timestamp {
        Timestamp::now() - age
    }

    #[tokio::test]
    async fn test_log_action_writes_both_families() {
        let (journal, store, _) = journal();
        let ts = Timestamp::now();
        let action = put("a", ["0", "1"]);

        journal.log_action("d", "i", ts, &action).await.unwrap();

        assert_eq!(
            store.list_range(&list_key("d", "i"), 0, -1).await.unwrap(),
            vec![ts.to_string()],
        );
        let stored = store.get(&log_key("d", "i", ts)).await.unwrap().unwrap();
        assert_eq!(serde_json::from_slice::<Action>(&stored).unwrap(), action);
        assert!(store.ttl(&log_key("d", "i", ts)).await.unwrap() > 0);

        store.list_delete(&list_key("d", "i")).await.unwrap();
        assert_eq!(store.list_length(&list_key("d", "i")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replay_applies_entries_after_baseline_in_order() {
        let (journal, _, stats) = journal();
        let baseline = aged(Duration::from_secs(10));
        let first = aged(Duration::from_secs(3));
        let second = aged(Duration::from_secs(2));
        let third = aged(Duration::from_secs(1));

        journal
            .log_action("d", "i", first, &put("a", ["1"]))
            .await
            .unwrap();
        journal
            .log_action("d", "i", second, &put("a", ["2"]))
            .await
            .unwrap();
        journal
            .log_action(
                "d",
                "i",
                third,
                &Action::Put(PutAction::from(btreemap! {
                    "a".to_owned() => PutSpec::replace(["3"]),
                })),
            )
            .await
            .unwrap();

        let result = journal
            .replay_since("d", "i", baseline, Attributes::new())
            .await;
        assert_eq!(result, btreemap! { "a".to_owned() => ValueSet::from("3") });
        assert_eq!(stats.snapshot().replayed_actions, 3);
    }

    #[tokio::test]
    async fn test_entry_at_baseline_is_not_replayed() {
        let (journal, _, _) = journal();
        let ts = Timestamp::now();
        journal
            .log_action("d", "i", ts, &put("a", ["1"]))
            .await
            .unwrap();

        // The write that produced the baseline is already in the store state.
        let result = journal.replay_since("d", "i", ts, Attributes::new()).await;
        assert_eq!(result, Attributes::new());
    }

    #[tokio::test]
    async fn test_replay_with_current_baseline_returns_input() {
        let (journal, _, _) = journal();
        journal
            .log_action("d", "i", aged(Duration::from_secs(5)), &put("a", ["1"]))
            .await
            .unwrap();

        let state = btreemap! { "z".to_owned() => ValueSet::from("9") };
        let result = journal
            .replay_since("d", "i", Timestamp::now(), state.clone())
            .await;
        assert_eq!(result, state);
    }

    #[tokio::test]
    async fn test_expired_entries_are_removed_not_applied() {
        let (journal, store, stats) = journal();
        let stale = aged(TTL + Duration::from_secs(1));
        journal
            .log_action("d", "i", stale, &put("a", ["1"]))
            .await
            .unwrap();

        let result = journal
            .replay_since("d", "i", aged(TTL * 2), Attributes::new())
            .await;
        assert_eq!(result, Attributes::new());
        // Opportunistic GC dropped the list entry.
        assert_eq!(store.list_length(&list_key("d", "i")).await.unwrap(), 0);
        assert_eq!(stats.snapshot().expired_entries_removed, 1);
    }

    #[tokio::test]
    async fn test_listed_entry_with_evicted_log_is_skipped() {
        let (journal, store, _) = journal();
        let ts = Timestamp::now();
        // The list references a log entry the store already evicted.
        store
            .list_append(&list_key("d", "i"), &ts.to_string())
            .await
            .unwrap();

        let state = btreemap! { "a".to_owned() => ValueSet::from("1") };
        let result = journal
            .replay_since("d", "i", aged(Duration::from_secs(30)), state.clone())
            .await;
        assert_eq!(result, state);
        // Not expired, so the list entry stays for the log's possible return.
        assert_eq!(store.list_length(&list_key("d", "i")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_log_entry_is_dropped_silently() {
        let (journal, store, _) = journal();
        let ts = Timestamp::now();
        store
            .set_with_ttl(&log_key("d", "i", ts), b"not json", TTL)
            .await
            .unwrap();
        store
            .list_append(&list_key("d", "i"), &ts.to_string())
            .await
            .unwrap();

        let state = btreemap! { "a".to_owned() => ValueSet::from("1") };
        let result = journal
            .replay_since("d", "i", aged(Duration::from_secs(30)), state.clone())
            .await;
        assert_eq!(result, state);
    }

    #[tokio::test]
    async fn test_garbage_list_elements_are_pruned() {
        let (journal, store, _) = journal();
        store
            .list_append(&list_key("d", "i"), "definitely-not-a-timestamp")
            .await
            .unwrap();

        let result = journal
            .replay_since("d", "i", aged(Duration::from_secs(30)), Attributes::new())
            .await;
        assert_eq!(result, Attributes::new());
        assert_eq!(store.list_length(&list_key("d", "i")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_journal_store_outage_returns_store_state() {
        let (journal, store, _) = journal();
        journal
            .log_action("d", "i", aged(Duration::from_secs(5)), &put("a", ["1"]))
            .await
            .unwrap();
        store.set_unavailable(true);

        let state = btreemap! { "z".to_owned() => ValueSet::from("0") };
        let result = journal
            .replay_since("d", "i", aged(Duration::from_secs(30)), state.clone())
            .await;
        assert_eq!(result, state);
    }

    #[tokio::test]
    async fn test_replay_interleaves_puts_and_deletes() {
        let (journal, _, _) = journal();
        let baseline = aged(Duration::from_secs(30));
        let t1 = aged(Duration::from_secs(2));
        let t2 = aged(Duration::from_secs(1));

        journal
            .log_action("d", "i", t1, &put("a", ["4", "5"]))
            .await
            .unwrap();
        journal
            .log_action(
                "d",
                "i",
                t2,
                &Action::Delete(DeleteAction::from(btreemap! {
                    "a".to_owned() => ValueSet::from(["0", "4"]),
                })),
            )
            .await
            .unwrap();

        let state = btreemap! { "a".to_owned() => ValueSet::from(["0", "1"]) };
        let result = journal.replay_since("d", "i", baseline, state).await;
        assert_eq!(
            result,
            btreemap! { "a".to_owned() => ValueSet::from(["1", "5"]) },
        );
    }

    #[tokio::test]
    async fn test_random_cleanup_strips_expired_entries() {
        let (journal, store, _) = journal();
        let live = Timestamp::now();
        journal
            .log_action("d", "i", live, &put("a", ["1"]))
            .await
            .unwrap();
        store
            .list_append(&list_key("d", "i"), &aged(TTL + Duration::from_secs(5)).to_string())
            .await
            .unwrap();
        store
            .list_append(&list_key("d", "i"), &aged(TTL + Duration::from_secs(9)).to_string())
            .await
            .unwrap();

        let removed = journal.random_cleanup().await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            store.list_range(&list_key("d", "i"), 0, -1).await.unwrap(),
            vec![live.to_string()],
        );

        // Nothing left to remove: cleanup is idempotent.
        assert_eq!(journal.random_cleanup().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_random_cleanup_with_empty_store_is_a_noop() {
        let (journal, _, _) = journal();
        assert_eq!(journal.random_cleanup().await.unwrap(), 0);
    }
}
