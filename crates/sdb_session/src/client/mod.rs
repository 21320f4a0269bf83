use std::{
    collections::BTreeMap,
    sync::Arc,
};

use sdb_item_types::{
    Action,
    Attributes,
    DeleteAction,
    PutAction,
    Timestamp,
};
use tokio::sync::Mutex;

use crate::{
    config::SessionConfig,
    journal::{
        Journal,
        JournalStore,
    },
    marker,
    stats::{
        SessionStats,
        StatsSnapshot,
    },
    store::{
        AttributePuts,
        BackingStore,
        StoreError,
    },
};

mod select;

pub use select::{
    SelectExpr,
    SelectResults,
};

/// A batch of puts: domain → item → what to write.
pub type PutRecords = BTreeMap<String, BTreeMap<String, PutAction>>;

/// A batch of deletes: domain → item → what to remove.
pub type DeleteRecords = BTreeMap<String, BTreeMap<String, DeleteAction>>;

/// A batch of reads: domain → item → attribute projection (empty = all).
pub type GetRecords = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Read results: domain → item → attributes.
pub type ItemsByDomain = BTreeMap<String, BTreeMap<String, Attributes>>;

/// Errors surfaced by [`SessionClient`] operations.
///
/// Journal trouble is deliberately absent: a mutation whose remote write
/// succeeded reports success even if journaling it failed (reads are then
/// merely eventually consistent until the freshness window passes), and the
/// read path treats a sick journal as "nothing to replay".
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The request shape is invalid. Raised before anything is sent to the
    /// store.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The backing store was unreachable or rejected the request.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A session-consistent client over an eventually-consistent attribute
/// store.
///
/// The store propagates writes to its replicas asynchronously, so a plain
/// read issued shortly after a write can come back stale. This client makes
/// that invisible *within one process*: every mutation is stamped with a
/// timestamp marker on the item and recorded in a local journal, and every
/// read replays the journaled actions newer than the marker it got back on
/// top of the store's response. The result is read-your-writes and
/// monotonic reads per item for the lifetime of the journal entries
/// ([`SessionConfig::journal_ttl`]).
///
/// Consistency is *per process and per `server_id`*. Two processes with
/// distinct server ids coexist without interfering, each seeing its own
/// writes; a shared `server_id` between two live processes is forbidden.
///
/// The client holds the store's single connection behind a lock (one
/// in-flight request at a time) and may be shared across tasks.
pub struct SessionClient<S: BackingStore> {
    store: Mutex<S>,
    journal: Journal,
    /// This process's marker attribute name, `last_changed::<server_id>`.
    marker: String,
    stats: Arc<SessionStats>,
}

impl<S: BackingStore> SessionClient<S> {
    /// Constructs a client and runs the configured number of random journal
    /// cleanup passes.
    pub async fn new(
        store: S,
        journal_store: Arc<dyn JournalStore>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        if config.server_id.is_empty() {
            return Err(SessionError::MalformedRequest(
                "server_id must be non-empty".to_owned(),
            ));
        }
        let stats = Arc::new(SessionStats::default());
        let journal = Journal::new(journal_store, config.journal_ttl, stats.clone());
        let client = Self {
            store: Mutex::new(store),
            journal,
            marker: marker::marker_attribute(&config.server_id),
            stats,
        };

        let mut removed = 0;
        for _ in 0..config.random_journal_cleans {
            match client.journal.random_cleanup().await {
                Ok(n) => removed += n,
                Err(e) => {
                    tracing::warn!("startup journal cleaning failed: {e:#}");
                    break;
                },
            }
        }
        if removed > 0 {
            tracing::debug!("startup journal cleaning removed {removed} expired entries");
        }
        Ok(client)
    }

    /// Writes attributes, batching per domain.
    ///
    /// The whole batch shares one timestamp. Each touched item additionally
    /// gets this process's marker attribute replaced with that timestamp,
    /// and each item's put is journaled for the read path to replay.
    ///
    /// Store failures surface unchanged and nothing is journaled for the
    /// failed domain; the store converges on whatever it actually committed.
    pub async fn put(&self, records: PutRecords) -> Result<(), SessionError> {
        for items in records.values() {
            for (item, action) in items {
                if action.attributes.is_empty() {
                    return Err(SessionError::MalformedRequest(format!(
                        "cannot put item {item:?} without attributes"
                    )));
                }
                for (name, spec) in &action.attributes {
                    self.ensure_attribute_allowed(name)?;
                    if spec.values.is_empty() {
                        return Err(SessionError::MalformedRequest(format!(
                            "attribute {name:?} of item {item:?} has no values"
                        )));
                    }
                }
            }
        }

        let timestamp = Timestamp::now();
        for (domain, items) in &records {
            if items.is_empty() {
                continue;
            }
            let outgoing: BTreeMap<String, AttributePuts> = items
                .iter()
                .map(|(item, action)| {
                    let mut attributes = action.attributes.clone();
                    attributes.insert(self.marker.clone(), marker::marker_put(timestamp));
                    (item.clone(), attributes)
                })
                .collect();
            {
                let mut store = self.store.lock().await;
                if outgoing.len() == 1 {
                    let (item, attributes) = outgoing.iter().next().expect("length checked");
                    store.put_attributes(domain, item, attributes).await?;
                } else {
                    store.batch_put_attributes(domain, &outgoing).await?;
                }
            }
            self.stats.record_put();

            for (item, action) in items {
                self.journal_action(domain, item, timestamp, &Action::Put(action.clone()))
                    .await;
            }
        }
        Ok(())
    }

    /// Deletes values, attributes, or whole items.
    ///
    /// After each delete the item's marker is re-written as a fresh put.
    /// Writing it *after* means a whole-item delete, which removes every
    /// attribute including stale markers, still leaves the item stamped.
    /// Deletes are journaled like puts.
    ///
    /// Domains cannot be deleted through this shape; see
    /// [`delete_domain`](Self::delete_domain).
    pub async fn delete(&self, records: DeleteRecords) -> Result<(), SessionError> {
        for items in records.values() {
            for action in items.values() {
                if let DeleteAction::Attributes(scopes) = action {
                    for name in scopes.keys() {
                        self.ensure_attribute_allowed(name)?;
                    }
                }
            }
        }

        for (domain, items) in &records {
            for (item, action) in items {
                {
                    let mut store = self.store.lock().await;
                    store.delete_attributes(domain, item, action).await?;
                }
                self.stats.record_delete();

                let timestamp = Timestamp::now();
                let marker_only: AttributePuts =
                    [(self.marker.clone(), marker::marker_put(timestamp))]
                        .into_iter()
                        .collect();
                {
                    let mut store = self.store.lock().await;
                    store.put_attributes(domain, item, &marker_only).await?;
                }
                self.journal_action(domain, item, timestamp, &Action::Delete(action.clone()))
                    .await;
            }
        }
        Ok(())
    }

    /// Reads items, masking the store's staleness with the journal.
    ///
    /// For each item the marker attribute is fetched alongside the requested
    /// projection, consumed as the replay baseline, and stripped from the
    /// returned attributes. An item the store has never seen this process
    /// touch (no marker) is returned as-is. Requested attributes the item
    /// does not have come back as explicit empty sets.
    pub async fn get(&self, records: GetRecords) -> Result<ItemsByDomain, SessionError> {
        for items in records.values() {
            for projection in items.values() {
                for name in projection {
                    self.ensure_attribute_allowed(name)?;
                }
            }
        }

        let mut results = ItemsByDomain::new();
        for (domain, items) in &records {
            let domain_results: &mut BTreeMap<String, Attributes> =
                results.entry(domain.clone()).or_default();
            for (item, projection) in items {
                let effective: Vec<String> = if projection.is_empty() {
                    vec![]
                } else {
                    projection
                        .iter()
                        .cloned()
                        .chain([self.marker.clone()])
                        .collect()
                };
                let raw = {
                    let mut store = self.store.lock().await;
                    store.get_attributes(domain, item, &effective).await?
                };
                self.stats.record_get();

                let mut state = self.replay_with_baseline(domain, item, raw).await;
                for name in projection {
                    state.entry(name.clone()).or_default();
                }
                domain_results.insert(item.clone(), state);
            }
        }
        Ok(results)
    }

    /// Strips marker attributes from a fetched item and, when our own marker
    /// was present, replays journal entries newer than it.
    async fn replay_with_baseline(
        &self,
        domain: &str,
        item: &str,
        mut raw: Attributes,
    ) -> Attributes {
        match marker::take_baseline(&mut raw, &self.marker) {
            Some(baseline) => self.journal.replay_since(domain, item, baseline, raw).await,
            // No marker: nothing from this process within the freshness
            // window (or the replica predates it); the response is as fresh
            // as it gets.
            None => raw,
        }
    }

    async fn journal_action(&self, domain: &str, item: &str, timestamp: Timestamp, action: &Action) {
        if let Err(e) = self.journal.log_action(domain, item, timestamp, action).await {
            tracing::warn!(
                "mutation on {domain}:{item} succeeded but journaling it failed: {e:#}; reads \
                 may see stale state until the store converges"
            );
        }
    }

    fn ensure_attribute_allowed(&self, name: &str) -> Result<(), SessionError> {
        if marker::is_marker_attribute(name) {
            return Err(SessionError::MalformedRequest(format!(
                "attribute name {name:?} is reserved ({:?}-prefixed names belong to the session \
                 layer)",
                marker::MARKER_PREFIX,
            )));
        }
        Ok(())
    }

    pub async fn create_domain(&self, domain: &str) -> Result<(), SessionError> {
        Ok(self.store.lock().await.create_domain(domain).await?)
    }

    /// Deletes a domain and everything in it. Deliberately a separate,
    /// explicit call: a record-shaped delete cannot reach it by accident.
    pub async fn delete_domain(&self, domain: &str) -> Result<(), SessionError> {
        Ok(self.store.lock().await.delete_domain(domain).await?)
    }

    pub async fn list_domains(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.store.lock().await.list_domains().await?)
    }

    pub async fn has_domain(&self, domain: &str) -> Result<bool, SessionError> {
        Ok(self.list_domains().await?.iter().any(|d| d == domain))
    }

    pub async fn domain_metadata(
        &self,
        domain: &str,
    ) -> Result<BTreeMap<String, String>, SessionError> {
        Ok(self.store.lock().await.domain_metadata(domain).await?)
    }

    /// Operation counters since construction.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
