//! The `select` operation: query assembly, pagination, and replay.

use std::collections::BTreeMap;

use sdb_item_types::Attributes;

use crate::{
    client::{
        SessionClient,
        SessionError,
    },
    store::BackingStore,
};

/// What a select projects.
///
/// A bare attribute name converts into a one-element attribute list;
/// `"*"`, `"itemName()"` and `"count(*)"` convert into their dedicated
/// variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectExpr {
    /// `*`: every attribute.
    All,
    /// `itemName()`: item names only.
    ItemName,
    /// `count(*)`: the match count.
    Count,
    /// An explicit list of attribute names.
    Attributes(Vec<String>),
}

impl From<&str> for SelectExpr {
    fn from(projection: &str) -> Self {
        match projection {
            "*" => Self::All,
            "itemName()" => Self::ItemName,
            "count(*)" => Self::Count,
            name => Self::Attributes(vec![name.to_owned()]),
        }
    }
}

impl From<Vec<String>> for SelectExpr {
    fn from(names: Vec<String>) -> Self {
        Self::Attributes(names)
    }
}

impl From<Vec<&str>> for SelectExpr {
    fn from(names: Vec<&str>) -> Self {
        Self::Attributes(names.into_iter().map(str::to_owned).collect())
    }
}

/// Results of a [`SessionClient::select`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectResults {
    /// Attribute projections: journal-replayed, marker-stripped items keyed
    /// by item name.
    Items(BTreeMap<String, Attributes>),
    /// `itemName()` / `count(*)` projections: the store's rows as returned.
    /// No replay happens for these; they reflect whatever replica answered.
    Rows(Vec<(String, Attributes)>),
}

/// Backtick-quotes an identifier for a select expression, doubling any
/// backticks it contains.
fn quote(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

pub(crate) fn build_query(
    output: &SelectExpr,
    domain: &str,
    where_clause: Option<&str>,
    order_by: Option<&str>,
    limit: Option<u64>,
) -> String {
    let output = match output {
        SelectExpr::All => "*".to_owned(),
        SelectExpr::ItemName => "itemName()".to_owned(),
        SelectExpr::Count => "count(*)".to_owned(),
        SelectExpr::Attributes(names) => names
            .iter()
            .map(|name| quote(name))
            .collect::<Vec<_>>()
            .join(","),
    };

    let mut query = format!("select {output} from {}", quote(domain));
    if let Some(expression) = where_clause {
        query.push_str(" where ");
        query.push_str(expression);
        // The store only accepts a sort over an attribute constrained by the
        // where expression, so order-by without a where is meaningless.
        if let Some(ordering) = order_by {
            query.push_str(" order by ");
            query.push_str(ordering);
        }
    }
    if let Some(limit) = limit {
        query.push_str(&format!(" limit {limit}"));
    }
    query
}

impl<S: BackingStore> SessionClient<S> {
    /// Queries a domain, masking store staleness exactly as [`get`] does:
    /// for attribute projections every returned item is replayed against its
    /// own marker baseline, and markers are stripped from the results.
    ///
    /// `itemName()` and `count(*)` projections come back raw: with no
    /// attributes in the response there is no baseline to replay against, so
    /// they reflect only the replica that answered.
    ///
    /// The store pages large result sets; all pages are fetched and
    /// concatenated before replay.
    ///
    /// [`get`]: SessionClient::get
    pub async fn select(
        &self,
        projection: impl Into<SelectExpr>,
        domain: &str,
        where_clause: Option<&str>,
        order_by: Option<&str>,
        limit: Option<u64>,
    ) -> Result<SelectResults, SessionError> {
        let projection = projection.into();
        let effective = match &projection {
            SelectExpr::Attributes(names) => {
                for name in names {
                    self.ensure_attribute_allowed(name)?;
                }
                let mut names = names.clone();
                names.push(self.marker.clone());
                SelectExpr::Attributes(names)
            },
            other => other.clone(),
        };
        let query = build_query(&effective, domain, where_clause, order_by, limit);

        let mut rows = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = {
                let mut store = self.store.lock().await;
                store.select_page(&query, next_token.as_deref()).await?
            };
            rows.extend(page.rows);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        self.stats.record_select();

        if matches!(projection, SelectExpr::ItemName | SelectExpr::Count) {
            return Ok(SelectResults::Rows(rows));
        }

        let mut items: BTreeMap<String, Attributes> = rows.into_iter().collect();
        for (item_name, attributes) in &mut items {
            let state = std::mem::take(attributes);
            *attributes = self.replay_with_baseline(domain, item_name, state).await;
        }
        Ok(SelectResults::Items(items))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{
        build_query,
        SelectExpr,
    };

    #[test]
    fn test_projection_normalization() {
        assert_eq!(SelectExpr::from("*"), SelectExpr::All);
        assert_eq!(SelectExpr::from("itemName()"), SelectExpr::ItemName);
        assert_eq!(SelectExpr::from("count(*)"), SelectExpr::Count);
        assert_eq!(
            SelectExpr::from("a"),
            SelectExpr::Attributes(vec!["a".to_owned()]),
        );
        assert_eq!(
            SelectExpr::from(vec!["a", "b"]),
            SelectExpr::Attributes(vec!["a".to_owned(), "b".to_owned()]),
        );
    }

    #[test]
    fn test_build_query_minimal() {
        assert_eq!(
            build_query(&SelectExpr::All, "my_domain", None, None, None),
            "select * from `my_domain`",
        );
        assert_eq!(
            build_query(&SelectExpr::Count, "d", None, None, None),
            "select count(*) from `d`",
        );
    }

    #[test]
    fn test_build_query_quotes_attributes() {
        assert_eq!(
            build_query(
                &SelectExpr::Attributes(vec!["a".to_owned(), "weird`name".to_owned()]),
                "d",
                None,
                None,
                None,
            ),
            "select `a`,`weird``name` from `d`",
        );
    }

    #[test]
    fn test_build_query_clauses() {
        assert_eq!(
            build_query(
                &SelectExpr::Attributes(vec!["a".to_owned()]),
                "d",
                Some("a > '1'"),
                Some("a desc"),
                Some(25),
            ),
            "select `a` from `d` where a > '1' order by a desc limit 25",
        );
    }

    #[test]
    fn test_order_by_requires_where() {
        assert_eq!(
            build_query(&SelectExpr::All, "d", None, Some("a desc"), Some(5)),
            "select * from `d` limit 5",
        );
    }
}
