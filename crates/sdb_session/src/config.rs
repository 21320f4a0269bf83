use std::time::Duration;

use crate::store::retry::RetryPolicy;

/// Construction options for a [`SessionClient`](crate::SessionClient).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Identifies this process's marker namespace. Must be globally unique
    /// among *running* processes: two live processes sharing a `server_id`
    /// would overwrite each other's baselines and corrupt both sessions.
    pub server_id: String,

    /// The freshness window: how long journal entries live, and therefore
    /// how long reads keep masking backing-store staleness. Must
    /// comfortably exceed the store's observed replica-propagation delay.
    pub journal_ttl: Duration,

    /// How many random journal-cleanup samples to run at construction,
    /// bounding list growth for items that are never read again.
    pub random_journal_cleans: usize,

    /// Transport resilience for [`RetryingStore`](crate::store::retry::RetryingStore)
    /// wrappers. The session client itself never retries.
    pub retry: RetryPolicy,
}

impl SessionConfig {
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            journal_ttl: Duration::from_secs(60),
            random_journal_cleans: 10,
            retry: RetryPolicy::default(),
        }
    }
}
