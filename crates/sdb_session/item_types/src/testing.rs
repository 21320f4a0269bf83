//! Proptest strategies for the item model.

use std::ops::Range;

use proptest::prelude::*;

use crate::{
    Action,
    AttributeDelete,
    Attributes,
    DeleteAction,
    PutAction,
    PutSpec,
    ValueSet,
};

/// A value set drawn from `pattern`, with between `count` raw values before
/// dedup (so `count` starting at 1 guarantees a non-empty set).
pub fn arb_value_set(pattern: &'static str, count: Range<usize>) -> impl Strategy<Value = ValueSet> {
    prop::collection::vec(pattern, count).prop_map(ValueSet::from)
}

/// Items whose attribute names and values come from a small alphabet, so
/// generated actions actually collide with them. Every generated attribute
/// has at least one value (an empty set is the same as no attribute).
pub fn arb_attributes() -> impl Strategy<Value = Attributes> {
    prop::collection::btree_map("[a-e]{1,2}", arb_value_set("[a-f]{1,3}", 1..4), 0..4)
}

pub fn arb_put_spec() -> impl Strategy<Value = PutSpec> {
    (arb_value_set("[a-f]{1,3}", 1..4), any::<bool>()).prop_map(|(values, replace)| PutSpec {
        values,
        replace,
    })
}

pub fn arb_put_action() -> impl Strategy<Value = PutAction> {
    prop::collection::btree_map("[a-e]{1,2}", arb_put_spec(), 0..4).prop_map(PutAction::from)
}

pub fn arb_attribute_delete() -> impl Strategy<Value = AttributeDelete> {
    prop_oneof![
        Just(AttributeDelete::All),
        arb_value_set("[a-f]{1,3}", 1..4).prop_map(AttributeDelete::Values),
    ]
}

pub fn arb_delete_action() -> impl Strategy<Value = DeleteAction> {
    prop_oneof![
        Just(DeleteAction::Item),
        prop::collection::btree_map("[a-e]{1,2}", arb_attribute_delete(), 1..4)
            .prop_map(DeleteAction::Attributes),
    ]
}

pub fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        arb_put_action().prop_map(Action::Put),
        arb_delete_action().prop_map(Action::Delete),
    ]
}
