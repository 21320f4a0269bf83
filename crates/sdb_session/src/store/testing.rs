//! Testing helpers for the store module.

use std::{
    collections::{
        BTreeMap,
        VecDeque,
    },
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use sdb_item_types::{
    Attributes,
    DeleteAction,
    PutAction,
};

use crate::store::{
    AttributePuts,
    BackingStore,
    SelectPage,
    StoreError,
};

/// Every request a [`FakeBackingStore`] has served, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreRequest {
    Put {
        domain: String,
        item: String,
        attributes: AttributePuts,
    },
    BatchPut {
        domain: String,
        items: BTreeMap<String, AttributePuts>,
    },
    Delete {
        domain: String,
        item: String,
        delete: DeleteAction,
    },
    Get {
        domain: String,
        item: String,
        projection: Vec<String>,
    },
    Select {
        query: String,
        next_token: Option<String>,
    },
    CreateDomain(String),
    DeleteDomain(String),
    ListDomains,
    DomainMetadata(String),
}

#[derive(Default)]
struct Inner {
    /// The authoritative state: what the store has committed.
    domains: BTreeMap<String, BTreeMap<String, Attributes>>,
    /// When set, reads are served from this snapshot instead: a replica
    /// that stopped receiving writes.
    stale_replica: Option<BTreeMap<String, BTreeMap<String, Attributes>>>,
    requests: Vec<StoreRequest>,
    select_pages: VecDeque<SelectPage>,
    pending_errors: VecDeque<StoreError>,
}

/// An in-memory [`BackingStore`] for tests.
///
/// Writes apply to an authoritative state immediately. To reproduce the
/// store's eventual consistency, [`freeze_replica`](Self::freeze_replica)
/// snapshots the current state and serves all subsequent reads from it until
/// [`thaw_replica`](Self::thaw_replica); writes keep applying to the
/// authoritative state underneath. Every request is recorded and can be
/// drained with [`take_requests`](Self::take_requests).
#[derive(Clone, Default)]
pub struct FakeBackingStore {
    inner: Arc<Mutex<Inner>>,
}

impl FakeBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve reads from a snapshot of the current state until thawed.
    pub fn freeze_replica(&self) {
        let mut inner = self.inner.lock();
        inner.stale_replica = Some(inner.domains.clone());
    }

    /// Reads observe the authoritative state again.
    pub fn thaw_replica(&self) {
        self.inner.lock().stale_replica = None;
    }

    /// The committed attributes of `item`, markers included.
    pub fn authoritative(&self, domain: &str, item: &str) -> Option<Attributes> {
        self.inner
            .lock()
            .domains
            .get(domain)
            .and_then(|items| items.get(item))
            .cloned()
    }

    pub fn take_requests(&self) -> Vec<StoreRequest> {
        std::mem::take(&mut self.inner.lock().requests)
    }

    /// Scripted responses for `select_page`, served in order.
    pub fn enqueue_select_pages(&self, pages: Vec<SelectPage>) {
        self.inner.lock().select_pages.extend(pages);
    }

    /// The next request fails with `error` (after being recorded).
    pub fn fail_next_request(&self, error: StoreError) {
        self.inner.lock().pending_errors.push_back(error);
    }
}

impl Inner {
    fn record(&mut self, request: StoreRequest) -> Result<(), StoreError> {
        self.requests.push(request);
        match self.pending_errors.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn domain_mut(
        &mut self,
        domain: &str,
    ) -> Result<&mut BTreeMap<String, Attributes>, StoreError> {
        self.domains.get_mut(domain).ok_or_else(|| StoreError::Remote {
            message: format!("NoSuchDomain: {domain}"),
        })
    }

    fn read_state(&self) -> &BTreeMap<String, BTreeMap<String, Attributes>> {
        self.stale_replica.as_ref().unwrap_or(&self.domains)
    }

    fn apply_put(&mut self, domain: &str, item: &str, attributes: &AttributePuts) -> Result<(), StoreError> {
        let items = self.domain_mut(domain)?;
        let current = items.entry(item.to_owned()).or_default();
        *current = PutAction::from(attributes.clone()).apply(current);
        Ok(())
    }
}

#[async_trait]
impl BackingStore for FakeBackingStore {
    async fn put_attributes(
        &mut self,
        domain: &str,
        item: &str,
        attributes: &AttributePuts,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.record(StoreRequest::Put {
            domain: domain.to_owned(),
            item: item.to_owned(),
            attributes: attributes.clone(),
        })?;
        inner.apply_put(domain, item, attributes)
    }

    async fn batch_put_attributes(
        &mut self,
        domain: &str,
        items: &BTreeMap<String, AttributePuts>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.record(StoreRequest::BatchPut {
            domain: domain.to_owned(),
            items: items.clone(),
        })?;
        for (item, attributes) in items {
            inner.apply_put(domain, item, attributes)?;
        }
        Ok(())
    }

    async fn delete_attributes(
        &mut self,
        domain: &str,
        item: &str,
        delete: &DeleteAction,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.record(StoreRequest::Delete {
            domain: domain.to_owned(),
            item: item.to_owned(),
            delete: delete.clone(),
        })?;
        let items = inner.domain_mut(domain)?;
        if let Some(current) = items.get(item) {
            let updated = delete.apply(current);
            if updated.is_empty() {
                items.remove(item);
            } else {
                items.insert(item.to_owned(), updated);
            }
        }
        Ok(())
    }

    async fn get_attributes(
        &mut self,
        domain: &str,
        item: &str,
        projection: &[String],
    ) -> Result<Attributes, StoreError> {
        let mut inner = self.inner.lock();
        inner.record(StoreRequest::Get {
            domain: domain.to_owned(),
            item: item.to_owned(),
            projection: projection.to_vec(),
        })?;
        let attrs = inner
            .read_state()
            .get(domain)
            .and_then(|items| items.get(item))
            .cloned()
            .unwrap_or_default();
        if projection.is_empty() {
            return Ok(attrs);
        }
        Ok(attrs
            .into_iter()
            .filter(|(name, _)| projection.contains(name))
            .collect())
    }

    async fn select_page(
        &mut self,
        query: &str,
        next_token: Option<&str>,
    ) -> Result<SelectPage, StoreError> {
        let mut inner = self.inner.lock();
        inner.record(StoreRequest::Select {
            query: query.to_owned(),
            next_token: next_token.map(str::to_owned),
        })?;
        Ok(inner.select_pages.pop_front().unwrap_or_default())
    }

    async fn create_domain(&mut self, domain: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.record(StoreRequest::CreateDomain(domain.to_owned()))?;
        inner.domains.entry(domain.to_owned()).or_default();
        Ok(())
    }

    async fn delete_domain(&mut self, domain: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.record(StoreRequest::DeleteDomain(domain.to_owned()))?;
        inner.domains.remove(domain);
        Ok(())
    }

    async fn list_domains(&mut self) -> Result<Vec<String>, StoreError> {
        let mut inner = self.inner.lock();
        inner.record(StoreRequest::ListDomains)?;
        Ok(inner.domains.keys().cloned().collect())
    }

    async fn domain_metadata(
        &mut self,
        domain: &str,
    ) -> Result<BTreeMap<String, String>, StoreError> {
        let mut inner = self.inner.lock();
        inner.record(StoreRequest::DomainMetadata(domain.to_owned()))?;
        let items = inner.domain_mut(domain)?;
        let item_count = items.len();
        let attr_count: usize = items.values().map(|attrs| attrs.len()).sum();
        Ok([
            ("ItemCount".to_owned(), item_count.to_string()),
            ("AttributeNameCount".to_owned(), attr_count.to_string()),
        ]
        .into_iter()
        .collect())
    }
}
