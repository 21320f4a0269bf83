//! Pure data model for SimpleDB-style items and the mutations applied to them.
//!
//! The backing store's item model is a mapping from attribute name to a *set*
//! of string values. This crate defines that model ([`Attributes`],
//! [`ValueSet`]), the mutations the session layer journals ([`Action`] and
//! its [`Put`](PutAction)/[`Delete`](DeleteAction) halves), and the pure
//! application of a mutation to an in-memory item ([`Action::apply`]), which
//! the read path uses to replay journaled writes over stale store responses.
//!
//! Nothing in this crate performs I/O.

pub mod action;
pub mod timestamp;
mod value_set;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use action::{
    Action,
    AttributeDelete,
    DeleteAction,
    PutAction,
    PutSpec,
};
pub use timestamp::{
    Timestamp,
    TimestampParseError,
};
pub use value_set::ValueSet;

/// An item's contents: attribute name to set of values.
///
/// An attribute bound to an empty set is equivalent to the attribute being
/// absent; code that compares [`Attributes`] for item equality should
/// normalize one way or the other first (the delete path in
/// [`DeleteAction::apply`] drops emptied attributes for exactly this reason).
pub type Attributes = std::collections::BTreeMap<String, ValueSet>;
