use std::fmt;

use indexmap::IndexSet;
use serde::{
    Deserialize,
    Serialize,
};

/// A duplicate-free set of attribute values.
///
/// The backing store treats an attribute's values as an unordered set. We
/// keep the order in which values were first inserted (on the read path, the
/// order the store returned them in) purely as a presentation nicety:
/// equality and the set operations below ignore it.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueSet(IndexSet<String>);

impl ValueSet {
    pub fn new() -> Self {
        Self(IndexSet::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.contains(value)
    }

    /// Inserts a value, returning whether it was newly added.
    pub fn insert(&mut self, value: impl Into<String>) -> bool {
        self.0.insert(value.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Set union, keeping `self`'s values (and their order) first.
    pub fn union(&self, other: &ValueSet) -> ValueSet {
        let mut result = self.clone();
        for value in &other.0 {
            result.0.insert(value.clone());
        }
        result
    }

    /// Values of `self` that are not in `other`.
    pub fn difference(&self, other: &ValueSet) -> ValueSet {
        Self(
            self.0
                .iter()
                .filter(|v| !other.0.contains(*v))
                .cloned()
                .collect(),
        )
    }
}

impl fmt::Debug for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl<S: Into<String>> FromIterator<S> for ValueSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> Extend<S> for ValueSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into))
    }
}

/// A bare scalar is the one-element set.
impl From<&str> for ValueSet {
    fn from(value: &str) -> Self {
        [value].into_iter().collect()
    }
}

impl From<String> for ValueSet {
    fn from(value: String) -> Self {
        [value].into_iter().collect()
    }
}

impl<S: Into<String>> From<Vec<S>> for ValueSet {
    fn from(values: Vec<S>) -> Self {
        values.into_iter().collect()
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for ValueSet {
    fn from(values: [S; N]) -> Self {
        values.into_iter().collect()
    }
}

impl IntoIterator for ValueSet {
    type IntoIter = indexmap::set::IntoIter<String>;
    type Item = String;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValueSet {
    type IntoIter = indexmap::set::Iter<'a, String>;
    type Item = &'a String;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::ValueSet;

    #[test]
    fn test_scalars_and_sequences_normalize_to_sets() {
        assert_eq!(ValueSet::from("a"), ValueSet::from(vec!["a"]));
        assert_eq!(
            ValueSet::from(vec!["a", "b", "a"]),
            ValueSet::from(["b", "a"]),
        );
        assert_eq!(ValueSet::from("a").len(), 1);
        assert_eq!(ValueSet::from(vec!["a", "a", "a"]).len(), 1);
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        assert_eq!(ValueSet::from(["x", "y", "z"]), ValueSet::from(["z", "y", "x"]));
        assert_ne!(ValueSet::from(["x"]), ValueSet::from(["x", "y"]));
    }

    #[test]
    fn test_union_and_difference() {
        let a = ValueSet::from(["0", "1"]);
        let b = ValueSet::from(["1", "2"]);
        assert_eq!(a.union(&b), ValueSet::from(["0", "1", "2"]));
        assert_eq!(a.difference(&b), ValueSet::from(["0"]));
        assert_eq!(b.difference(&a), ValueSet::from(["2"]));
        assert_eq!(a.difference(&a), ValueSet::new());
    }

    #[test]
    fn test_union_keeps_left_order_first() {
        let a = ValueSet::from(["b", "a"]);
        let b = ValueSet::from(["c", "a"]);
        let union: Vec<_> = a.union(&b).into_iter().collect();
        assert_eq!(union, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let set = ValueSet::from(["1", "2", "3"]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["1","2","3"]"#);
        assert_eq!(serde_json::from_str::<ValueSet>(&json).unwrap(), set);
    }
}
