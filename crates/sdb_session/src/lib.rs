//! Session consistency over SimpleDB-style eventually-consistent attribute
//! stores.
//!
//! The backing store models an *item* (named, within a *domain*) as a map
//! from attribute name to a set of string values, and propagates writes to
//! its replicas asynchronously: a read issued right after a write may be
//! served by a replica that has not caught up. [`SessionClient`] hides that
//! from the process doing the writing:
//!
//! - every mutation also writes a reserved **marker attribute**
//!   (`last_changed::<server_id>`) holding the mutation's timestamp, and is
//!   recorded in a local **journal** with a bounded TTL;
//! - every read fetches the marker with the data, treats it as the
//!   response's *baseline*, replays the journaled actions newer than the
//!   baseline on top of the response, and strips the marker back out.
//!
//! Within one process this yields read-your-writes and monotonic reads per
//! item for the duration of the freshness window
//! ([`SessionConfig::journal_ttl`]); across processes the store's usual
//! eventual consistency applies.
//!
//! Two collaborators are pluggable:
//!
//! - [`store::BackingStore`] is the connection to the remote store. The
//!   wire protocol (signing, HTTPS, XML) lives behind it;
//!   [`store::retry::RetryingStore`] adds the timeout-and-retry layer any
//!   real transport should sit under.
//! - [`journal::JournalStore`] is the journal's storage.
//!   [`journal::redis::RedisJournalStore`] (default `redis-journal`
//!   feature) keeps it in two Redis databases, the usual deployment.
//!
//! The `testing` feature (always on for this crate's own tests) exposes
//! in-memory implementations of both, including a backing store that can
//! freeze a stale replica.

pub mod client;
pub mod config;
pub mod journal;
pub mod marker;
pub mod stats;
pub mod store;

pub use client::{
    DeleteRecords,
    GetRecords,
    ItemsByDomain,
    PutRecords,
    SelectExpr,
    SelectResults,
    SessionClient,
    SessionError,
};
pub use config::SessionConfig;
pub use sdb_item_types::{
    Action,
    AttributeDelete,
    Attributes,
    DeleteAction,
    PutAction,
    PutSpec,
    Timestamp,
    ValueSet,
};
pub use stats::StatsSnapshot;
