//! The boundary to the remote attribute store.
//!
//! Everything below [`BackingStore`] (request signing, HTTPS, transport
//! retries, response parsing) belongs to the implementation behind the
//! trait. [`retry::RetryingStore`] is the reusable resilience layer a
//! transport is expected to sit behind, and [`testing::FakeBackingStore`]
//! is an in-memory implementation with staleness injection for tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sdb_item_types::{
    Attributes,
    DeleteAction,
    PutSpec,
};

pub mod retry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// The per-attribute payload of a put against one item.
pub type AttributePuts = BTreeMap<String, PutSpec>;

/// Errors surfaced by a [`BackingStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store was unreachable: every transport attempt timed out or
    /// failed before a response arrived. Nothing is known about whether the
    /// request took effect.
    #[error("backing store unreachable after {attempts} attempt(s): {reason}")]
    Transport { attempts: usize, reason: String },

    /// The store processed the request and rejected it (invalid argument,
    /// missing domain, quota, auth).
    #[error("backing store rejected request: {message}")]
    Remote { message: String },
}

/// One page of select results: rows in store order, plus the continuation
/// token to pass back for the next page when the result set was truncated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectPage {
    pub rows: Vec<(String, Attributes)>,
    pub next_token: Option<String>,
}

/// A connection to the remote eventually-consistent attribute store.
///
/// Methods take `&mut self`: one connection carries one in-flight request at
/// a time. The session client serializes access accordingly.
///
/// Reads are *eventually consistent*: a `get_attributes` or `select_page`
/// issued shortly after a write may be served by a replica that has not seen
/// it yet. The session layer above compensates; implementations must not.
#[async_trait]
pub trait BackingStore: Send {
    /// Creates or updates attributes on one item.
    async fn put_attributes(
        &mut self,
        domain: &str,
        item: &str,
        attributes: &AttributePuts,
    ) -> Result<(), StoreError>;

    /// Puts attributes on several items of one domain in a single request.
    async fn batch_put_attributes(
        &mut self,
        domain: &str,
        items: &BTreeMap<String, AttributePuts>,
    ) -> Result<(), StoreError>;

    /// Deletes values, attributes, or (with [`DeleteAction::Item`]) the
    /// whole item. An item whose last attribute is deleted ceases to exist.
    async fn delete_attributes(
        &mut self,
        domain: &str,
        item: &str,
        delete: &DeleteAction,
    ) -> Result<(), StoreError>;

    /// Fetches an item's attributes, restricted to `projection` when it is
    /// non-empty. A missing item is an empty map, not an error: the store
    /// cannot distinguish "does not exist" from "not on this replica yet".
    async fn get_attributes(
        &mut self,
        domain: &str,
        item: &str,
        projection: &[String],
    ) -> Result<Attributes, StoreError>;

    /// Runs one page of an already-assembled select query. Pass the
    /// previous page's `next_token` to continue; `None` starts from the top.
    async fn select_page(
        &mut self,
        query: &str,
        next_token: Option<&str>,
    ) -> Result<SelectPage, StoreError>;

    async fn create_domain(&mut self, domain: &str) -> Result<(), StoreError>;

    /// Deletes a domain and everything in it.
    async fn delete_domain(&mut self, domain: &str) -> Result<(), StoreError>;

    /// All domain names for this account. Implementations page through the
    /// store's truncated listings internally.
    async fn list_domains(&mut self) -> Result<Vec<String>, StoreError>;

    async fn domain_metadata(
        &mut self,
        domain: &str,
    ) -> Result<BTreeMap<String, String>, StoreError>;
}
