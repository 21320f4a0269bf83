//! Transport-level resilience for [`BackingStore`] implementations.
//!
//! The session client itself never retries: a mutation that failed remotely
//! must fail loudly. Retrying belongs below the trait boundary, and
//! [`RetryingStore`] is that layer: wrap a raw transport in it and hand the
//! result to the client.

use std::{
    collections::BTreeMap,
    time::Duration,
};

use async_trait::async_trait;
use sdb_item_types::DeleteAction;

use crate::store::{
    AttributePuts,
    BackingStore,
    SelectPage,
    StoreError,
};

/// When to give up on a single logical request.
///
/// Each attempt is bounded by `request_timeout`. After the first (immediate)
/// attempt, one more attempt is made per entry of `retry_delays`, sleeping
/// that entry's duration first. Only transport failures are retried; a
/// store-side rejection is final.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub request_timeout: Duration,
    pub retry_delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }
}

impl RetryPolicy {
    /// Delay before each attempt; the leading zero is the initial attempt.
    fn attempt_delays(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::once(Duration::ZERO).chain(self.retry_delays.iter().copied())
    }
}

/// A [`BackingStore`] wrapper applying a [`RetryPolicy`] to every request of
/// an inner store.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

macro_rules! with_retries {
    ($self:ident . $method:ident ( $($arg:expr),* $(,)? )) => {{
        let mut attempts = 0usize;
        let mut reason = String::new();
        let mut outcome = None;
        for delay in $self.policy.attempt_delays() {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempts += 1;
            match tokio::time::timeout(
                $self.policy.request_timeout,
                $self.inner.$method($($arg),*),
            )
            .await
            {
                Ok(Ok(value)) => {
                    outcome = Some(Ok(value));
                    break;
                },
                Ok(Err(StoreError::Transport { reason: r, .. })) => {
                    tracing::debug!("backing store attempt {attempts} failed: {r}");
                    reason = r;
                },
                // The store answered; retrying would re-run a rejected
                // request.
                Ok(Err(other)) => {
                    outcome = Some(Err(other));
                    break;
                },
                Err(_elapsed) => {
                    tracing::debug!("backing store attempt {attempts} timed out");
                    reason = "request timed out".to_owned();
                },
            }
        }
        match outcome {
            Some(result) => result,
            None => Err(StoreError::Transport { attempts, reason }),
        }
    }};
}

#[async_trait]
impl<S: BackingStore> BackingStore for RetryingStore<S> {
    async fn put_attributes(
        &mut self,
        domain: &str,
        item: &str,
        attributes: &AttributePuts,
    ) -> Result<(), StoreError> {
        with_retries!(self.put_attributes(domain, item, attributes))
    }

    async fn batch_put_attributes(
        &mut self,
        domain: &str,
        items: &BTreeMap<String, AttributePuts>,
    ) -> Result<(), StoreError> {
        with_retries!(self.batch_put_attributes(domain, items))
    }

    async fn delete_attributes(
        &mut self,
        domain: &str,
        item: &str,
        delete: &DeleteAction,
    ) -> Result<(), StoreError> {
        with_retries!(self.delete_attributes(domain, item, delete))
    }

    async fn get_attributes(
        &mut self,
        domain: &str,
        item: &str,
        projection: &[String],
    ) -> Result<sdb_item_types::Attributes, StoreError> {
        with_retries!(self.get_attributes(domain, item, projection))
    }

    async fn select_page(
        &mut self,
        query: &str,
        next_token: Option<&str>,
    ) -> Result<SelectPage, StoreError> {
        with_retries!(self.select_page(query, next_token))
    }

    async fn create_domain(&mut self, domain: &str) -> Result<(), StoreError> {
        with_retries!(self.create_domain(domain))
    }

    async fn delete_domain(&mut self, domain: &str) -> Result<(), StoreError> {
        with_retries!(self.delete_domain(domain))
    }

    async fn list_domains(&mut self) -> Result<Vec<String>, StoreError> {
        with_retries!(self.list_domains())
    }

    async fn domain_metadata(
        &mut self,
        domain: &str,
    ) -> Result<BTreeMap<String, String>, StoreError> {
        with_retries!(self.domain_metadata(domain))
    }
}
