use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// An immutable snapshot of an entity's labels.
#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

/// A single set-based label requirement.
///
/// Built through [`Expression::new`] so that malformed requirements are
/// rejected when a selector is constructed; evaluation is total.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Expression {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Selects a set of entities by their labels.
///
/// Equality pairs and expressions are conjoined; an empty selector matches
/// every label set.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    match_labels: Option<Map>,
    match_expressions: Option<Expressions>,
}

// === Selector ===

impl Selector {
    pub fn new(match_labels: Option<Map>, match_expressions: Option<Expressions>) -> Self {
        Self {
            match_labels,
            match_expressions,
        }
    }

    pub fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        for expr in self.match_expressions.iter().flatten() {
            if !expr.matches(labels.as_ref()) {
                return false;
            }
        }

        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels.iter() {
                if labels.0.get(k) != Some(v) {
                    return false;
                }
            }
        }

        true
    }

    /// Renders the selector as a deterministic string, independent of the
    /// order in which expressions were supplied.
    ///
    /// The stored expression order is left untouched; normalization sorts a
    /// rendered copy only.
    pub fn canonical_key(&self) -> String {
        let labels = match self.match_labels.as_ref() {
            None => "null".to_string(),
            Some(map) => {
                let pairs = map
                    .iter()
                    .map(|(k, v)| format!(r#""{k}":"{v}""#))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{{{pairs}}}")
            }
        };

        let exprs = match self.match_expressions.as_ref() {
            None => "null".to_string(),
            Some(exprs) => {
                let mut rendered = exprs
                    .iter()
                    .map(Expression::canonical_key)
                    .collect::<Vec<_>>();
                rendered.sort();
                format!("[{}]", rendered.join(","))
            }
        };

        format!(r#"{{"matchLabels":{labels},"matchExpressions":{exprs}}}"#)
    }
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

// === Labels ===

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// === Expression ===

impl Expression {
    /// Validates the operator/values combination; `In` and `NotIn` require
    /// at least one value, `Exists` and `DoesNotExist` take none.
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        values: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        let key = key.into();
        let values = values.into_iter().collect::<BTreeSet<String>>();

        match operator {
            Operator::In | Operator::NotIn if values.is_empty() => {
                bail!("operator {operator} on key {key} requires at least one value");
            }
            Operator::Exists | Operator::DoesNotExist if !values.is_empty() => {
                bail!("operator {operator} on key {key} must not have values");
            }
            _ => {}
        }

        Ok(Self {
            key,
            operator,
            values,
        })
    }

    fn matches(&self, labels: &Map) -> bool {
        match self.operator {
            Operator::In => labels
                .get(&self.key)
                .is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => !labels
                .get(&self.key)
                .is_some_and(|v| self.values.contains(v)),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }

    fn canonical_key(&self) -> String {
        let values = self
            .values
            .iter()
            .map(|v| format!(r#""{v}""#))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            r#"{{"key":"{}","operator":"{}","values":[{values}]}}"#,
            self.key, self.operator
        )
    }
}

// === Operator ===

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::In => "In",
            Self::NotIn => "NotIn",
            Self::Exists => "Exists",
            Self::DoesNotExist => "DoesNotExist",
        })
    }
}

impl std::str::FromStr for Operator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "In" => Ok(Self::In),
            "NotIn" => Ok(Self::NotIn),
            "Exists" => Ok(Self::Exists),
            "DoesNotExist" => Ok(Self::DoesNotExist),
            op => bail!("unknown label selector operator {op}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::FromIterator;

    fn expr(key: &str, operator: Operator, values: &[&str]) -> Expression {
        Expression::new(key, operator, values.iter().map(|v| v.to_string())).unwrap()
    }

    #[test]
    fn test_matches() {
        for (selector, labels, matches, msg) in &[
            (Selector::default(), Labels::default(), true, "empty match"),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("foo", "bar"))),
                true,
                "exact label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "sufficient label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("foo", "baz"))),
                false,
                "value mismatch",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::default(),
                false,
                "missing key",
            ),
            (
                Selector::from_iter(Some(expr("foo", Operator::In, &["bar"]))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "in expression match",
            ),
            (
                Selector::from_iter(Some(expr("foo", Operator::In, &["bar"]))),
                Labels::from_iter(Some(("foo", "baz"))),
                false,
                "in expression mismatch",
            ),
            (
                Selector::from_iter(Some(expr("foo", Operator::In, &["bar"]))),
                Labels::default(),
                false,
                "in expression missing key",
            ),
            (
                Selector::from_iter(Some(expr("tier", Operator::NotIn, &["frontend", "backend"]))),
                Labels::from_iter(Some(("tier", "backend"))),
                false,
                "not-in expression mismatch",
            ),
            (
                Selector::from_iter(Some(expr("tier", Operator::NotIn, &["frontend", "backend"]))),
                Labels::default(),
                true,
                "not-in expression missing key",
            ),
            (
                Selector::from_iter(Some(expr("foo", Operator::Exists, &[]))),
                Labels::from_iter(Some(("foo", "anything"))),
                true,
                "exists expression match",
            ),
            (
                Selector::from_iter(Some(expr("foo", Operator::Exists, &[]))),
                Labels::from_iter(Some(("bar", "anything"))),
                false,
                "exists expression missing key",
            ),
            (
                Selector::from_iter(Some(expr("foo", Operator::DoesNotExist, &[]))),
                Labels::default(),
                true,
                "does-not-exist expression match",
            ),
            (
                Selector::from_iter(Some(expr("foo", Operator::DoesNotExist, &[]))),
                Labels::from_iter(Some(("foo", "anything"))),
                false,
                "does-not-exist expression present key",
            ),
        ] {
            assert_eq!(selector.matches(labels), *matches, "{}", msg);
        }
    }

    #[test]
    fn conjunction_across_labels_and_expressions() {
        let selector = Selector::new(
            Some(Map::from_iter(Some(("app".to_string(), "web".to_string())))),
            Some(vec![
                expr("tier", Operator::In, &["edge", "cache"]),
                expr("deprecated", Operator::DoesNotExist, &[]),
            ]),
        );

        let matching = Labels::from_iter(vec![("app", "web"), ("tier", "edge")]);
        assert!(selector.matches(&matching));

        // Flipping any single requirement fails the whole evaluation.
        assert!(!selector.matches(&Labels::from_iter(vec![("app", "db"), ("tier", "edge")])));
        assert!(!selector.matches(&Labels::from_iter(vec![("app", "web"), ("tier", "db")])));
        assert!(!selector.matches(&Labels::from_iter(vec![
            ("app", "web"),
            ("tier", "edge"),
            ("deprecated", "true"),
        ])));
    }

    #[test]
    fn in_and_not_in_are_complements_when_key_present() {
        let key_in = Selector::from_iter(Some(expr("tier", Operator::In, &["a", "b"])));
        let key_not_in = Selector::from_iter(Some(expr("tier", Operator::NotIn, &["a", "b"])));

        for labels in &[
            Labels::from_iter(Some(("tier", "a"))),
            Labels::from_iter(Some(("tier", "c"))),
        ] {
            assert_ne!(key_in.matches(labels), key_not_in.matches(labels));
        }

        // Absent key: In fails, NotIn holds.
        let absent = Labels::default();
        assert!(!key_in.matches(&absent));
        assert!(key_not_in.matches(&absent));
    }

    #[test]
    fn matches_is_deterministic() {
        let selector = Selector::from_iter(Some(expr("foo", Operator::In, &["bar"])));
        let labels = Labels::from_iter(Some(("foo", "bar")));
        for _ in 0..3 {
            assert!(selector.matches(&labels));
        }
    }

    #[test]
    fn malformed_expressions_fail_construction() {
        assert!(Expression::new("k", Operator::In, None).is_err());
        assert!(Expression::new("k", Operator::NotIn, None).is_err());
        assert!(Expression::new("k", Operator::Exists, Some("v".to_string())).is_err());
        assert!(Expression::new("k", Operator::DoesNotExist, Some("v".to_string())).is_err());
        assert!("Unknown".parse::<Operator>().is_err());
    }

    #[test]
    fn canonical_key_is_order_independent() {
        let forward = Selector::from_expressions(vec![
            expr("a", Operator::In, &["y", "x"]),
            expr("b", Operator::Exists, &[]),
        ]);
        let reversed = Selector::from_expressions(vec![
            expr("b", Operator::Exists, &[]),
            expr("a", Operator::In, &["x", "y"]),
        ]);

        assert_eq!(forward.canonical_key(), reversed.canonical_key());
        assert_ne!(forward, reversed, "stored order is preserved");
    }

    #[test]
    fn canonical_key_distinguishes_absent_from_empty() {
        let absent = Selector::default();
        let empty = Selector::from_map(Map::default());
        assert_ne!(absent.canonical_key(), empty.canonical_key());

        // Both are select-all regardless.
        let labels = Labels::from_iter(Some(("any", "thing")));
        assert!(absent.matches(&labels));
        assert!(empty.matches(&labels));
    }
}
