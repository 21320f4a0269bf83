use std::collections::BTreeMap;

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    Attributes,
    ValueSet,
};

/// One attribute's worth of a put: the values to write and whether they
/// replace the attribute's current set or are unioned into it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutSpec {
    pub values: ValueSet,
    pub replace: bool,
}

impl PutSpec {
    /// Replace the attribute's entire set with `values`.
    pub fn replace(values: impl Into<ValueSet>) -> Self {
        Self {
            values: values.into(),
            replace: true,
        }
    }

    /// Union `values` into the attribute's existing set.
    pub fn append(values: impl Into<ValueSet>) -> Self {
        Self {
            values: values.into(),
            replace: false,
        }
    }
}

/// A put over one item: per-attribute [`PutSpec`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PutAction {
    pub attributes: BTreeMap<String, PutSpec>,
}

impl From<BTreeMap<String, PutSpec>> for PutAction {
    fn from(attributes: BTreeMap<String, PutSpec>) -> Self {
        Self { attributes }
    }
}

impl PutAction {
    /// Applies the put to an in-memory item, returning the updated item.
    /// Neither input is mutated.
    pub fn apply(&self, item: &Attributes) -> Attributes {
        let mut result = item.clone();
        for (name, spec) in &self.attributes {
            if spec.replace {
                result.insert(name.clone(), spec.values.clone());
            } else {
                let existing = result.entry(name.clone()).or_default();
                *existing = existing.union(&spec.values);
            }
        }
        result
    }
}

/// What a delete removes from one attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeDelete {
    /// Remove the attribute entirely.
    All,
    /// Remove these specific values from the attribute's set.
    Values(ValueSet),
}

/// The loose map shape uses an empty set to mean "the whole attribute".
impl From<ValueSet> for AttributeDelete {
    fn from(values: ValueSet) -> Self {
        if values.is_empty() {
            Self::All
        } else {
            Self::Values(values)
        }
    }
}

/// A delete over one item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteAction {
    /// Delete every attribute; the item no longer exists.
    Item,
    /// Delete within the named attributes only.
    Attributes(BTreeMap<String, AttributeDelete>),
}

/// The loose map shape uses an empty map to mean "the whole item".
impl From<BTreeMap<String, ValueSet>> for DeleteAction {
    fn from(attributes: BTreeMap<String, ValueSet>) -> Self {
        if attributes.is_empty() {
            Self::Item
        } else {
            Self::Attributes(
                attributes
                    .into_iter()
                    .map(|(name, values)| (name, values.into()))
                    .collect(),
            )
        }
    }
}

impl DeleteAction {
    /// Applies the delete to an in-memory item, returning the updated item.
    /// Attributes whose sets end up empty are dropped, matching the store's
    /// "empty set is absent" semantics. Neither input is mutated.
    pub fn apply(&self, item: &Attributes) -> Attributes {
        let scopes = match self {
            Self::Item => return Attributes::new(),
            Self::Attributes(scopes) => scopes,
        };
        let mut result = item.clone();
        for (name, scope) in scopes {
            match scope {
                AttributeDelete::All => {
                    result.remove(name);
                },
                AttributeDelete::Values(values) => {
                    if let Some(existing) = result.get_mut(name) {
                        *existing = existing.difference(values);
                    }
                },
            }
        }
        result.retain(|_, values| !values.is_empty());
        result
    }
}

/// The unit of the journal: one mutation as performed against the backing
/// store, replayable against an in-memory item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "attributes", rename_all = "snake_case")]
pub enum Action {
    Put(PutAction),
    Delete(DeleteAction),
}

impl Action {
    pub fn apply(&self, item: &Attributes) -> Attributes {
        match self {
            Self::Put(put) => put.apply(item),
            Self::Delete(delete) => delete.apply(item),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use maplit::btreemap;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::{
        Action,
        AttributeDelete,
        DeleteAction,
        PutAction,
        PutSpec,
    };
    use crate::{
        testing::{
            arb_attributes,
            arb_value_set,
        },
        Attributes,
        ValueSet,
    };

    fn item(entries: Vec<(&str, Vec<&str>)>) -> Attributes {
        entries
            .into_iter()
            .map(|(name, values)| (name.to_owned(), ValueSet::from(values)))
            .collect()
    }

    #[test]
    fn test_put_append_creates_and_unions() {
        let base = item(vec![("a", vec!["0", "1"])]);
        let put = PutAction::from(btreemap! {
            "a".to_owned() => PutSpec::append(["1", "2"]),
            "b".to_owned() => PutSpec::append(["9"]),
        });
        assert_eq!(
            put.apply(&base),
            item(vec![("a", vec!["0", "1", "2"]), ("b", vec!["9"])]),
        );
    }

    #[test]
    fn test_put_replace_overwrites() {
        let base = item(vec![("a", vec!["0", "1"])]);
        let put = PutAction::from(btreemap! {
            "a".to_owned() => PutSpec::replace(["7"]),
        });
        assert_eq!(put.apply(&base), item(vec![("a", vec!["7"])]));
    }

    #[test]
    fn test_empty_put_is_identity() {
        let base = item(vec![("a", vec!["0"]), ("b", vec!["1", "2"])]);
        assert_eq!(PutAction::default().apply(&base), base);
        assert_eq!(PutAction::default().apply(&Attributes::new()), Attributes::new());
    }

    #[test]
    fn test_item_delete_empties_everything() {
        let base = item(vec![("a", vec!["0"]), ("b", vec!["1", "2"])]);
        assert_eq!(DeleteAction::Item.apply(&base), Attributes::new());
        assert_eq!(DeleteAction::Item.apply(&Attributes::new()), Attributes::new());
    }

    #[test]
    fn test_whole_attribute_delete() {
        let base = item(vec![("a", vec!["0"]), ("b", vec!["1", "2"])]);
        let delete = DeleteAction::Attributes(btreemap! {
            "b".to_owned() => AttributeDelete::All,
        });
        assert_eq!(delete.apply(&base), item(vec![("a", vec!["0"])]));
    }

    #[test]
    fn test_partial_delete_drops_emptied_attributes() {
        let base = item(vec![("a", vec!["0", "1", "2", "3"]), ("b", vec!["5"])]);
        let delete = DeleteAction::Attributes(btreemap! {
            "a".to_owned() => AttributeDelete::Values(ValueSet::from(["0", "3"])),
            "b".to_owned() => AttributeDelete::Values(ValueSet::from(["5"])),
        });
        assert_eq!(delete.apply(&base), item(vec![("a", vec!["1", "2"])]));
    }

    #[test]
    fn test_delete_of_absent_attribute_is_noop() {
        let base = item(vec![("a", vec!["0"])]);
        let delete = DeleteAction::Attributes(btreemap! {
            "missing".to_owned() => AttributeDelete::Values(ValueSet::from(["x"])),
            "also_missing".to_owned() => AttributeDelete::All,
        });
        assert_eq!(delete.apply(&base), base);
    }

    #[test]
    fn test_loose_delete_shapes_normalize() {
        assert_eq!(DeleteAction::from(BTreeMap::new()), DeleteAction::Item);
        assert_eq!(
            DeleteAction::from(btreemap! { "a".to_owned() => ValueSet::new() }),
            DeleteAction::Attributes(btreemap! { "a".to_owned() => AttributeDelete::All }),
        );
        assert_eq!(
            DeleteAction::from(btreemap! { "a".to_owned() => ValueSet::from(["1"]) }),
            DeleteAction::Attributes(btreemap! {
                "a".to_owned() => AttributeDelete::Values(ValueSet::from(["1"])),
            }),
        );
    }

    #[test]
    fn test_action_serde_is_self_describing() {
        let action = Action::Put(PutAction::from(btreemap! {
            "a".to_owned() => PutSpec::replace(["1", "2"]),
        }));
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "put");
        assert_eq!(serde_json::from_value::<Action>(json).unwrap(), action);

        let delete = Action::Delete(DeleteAction::Item);
        let json = serde_json::to_value(&delete).unwrap();
        assert_eq!(json["action"], "delete");
        assert_eq!(serde_json::from_value::<Action>(json).unwrap(), delete);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn proptest_empty_put_is_identity(item in arb_attributes()) {
            prop_assert_eq!(PutAction::default().apply(&item), item);
        }

        #[test]
        fn proptest_item_delete_always_empties(item in arb_attributes()) {
            prop_assert_eq!(DeleteAction::Item.apply(&item), Attributes::new());
        }

        #[test]
        fn proptest_apply_does_not_mutate_input(
            item in arb_attributes(),
            action in crate::testing::arb_action(),
        ) {
            let before = item.clone();
            let _ = action.apply(&item);
            prop_assert_eq!(item, before);
        }

        #[test]
        fn proptest_put_then_delete_of_disjoint_values_restores(
            item in arb_attributes(),
            // Drawn from an alphabet disjoint from arb_attributes' values.
            added in arb_value_set("[x-z]{3,6}", 1..4),
        ) {
            for name in item.keys() {
                let put = PutAction::from(btreemap! {
                    name.clone() => PutSpec::append(added.clone()),
                });
                let delete = DeleteAction::Attributes(btreemap! {
                    name.clone() => AttributeDelete::Values(added.clone()),
                });
                prop_assert_eq!(delete.apply(&put.apply(&item)), item.clone());
            }
        }

        #[test]
        fn proptest_replace_then_whole_delete_removes_attribute(
            item in arb_attributes(),
            values in arb_value_set("[a-z]{1,4}", 1..4),
        ) {
            let put = PutAction::from(btreemap! {
                "attr".to_owned() => PutSpec::replace(values),
            });
            let delete = DeleteAction::Attributes(btreemap! {
                "attr".to_owned() => AttributeDelete::All,
            });
            let result = delete.apply(&put.apply(&item));
            prop_assert!(!result.contains_key("attr"));
        }
    }
}
