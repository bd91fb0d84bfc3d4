//! Filter predicates over endpoint configs.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::types::EndpointConfig;

/// How a single field of a record is matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMatch {
    /// The field must equal one of the given values.
    ///
    /// On a list-valued field (such as `tags`) the record matches when any of
    /// its entries is one of the values.
    ExactMatch(Vec<String>),
    /// The record's set must share at least one value with the given set.
    TagOverlap(Vec<String>),
    /// The record must not carry the field at all.
    Missing,
}

/// A conjunction of per-field match rules.
///
/// ```rust
/// use llmconf::config::FilterPredicate;
///
/// let filter = FilterPredicate::new()
///     .exact("model", ["gpt-4", "gpt-4o"])
///     .tags(["fast"]);
/// assert_eq!(filter.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPredicate {
    fields: BTreeMap<String, FieldMatch>,
    exclude: bool,
}

impl FilterPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal one of `values`.
    pub fn exact<I, S>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(field, FieldMatch::ExactMatch(collect(values)))
    }

    /// Require the record's tags to overlap `values`.
    pub fn tags<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with("tags", FieldMatch::TagOverlap(collect(values)))
    }

    /// Require `field` to be absent from the record.
    pub fn missing(self, field: impl Into<String>) -> Self {
        self.with(field, FieldMatch::Missing)
    }

    /// Set the rule for `field`, replacing any previous rule for it.
    pub fn with(mut self, field: impl Into<String>, rule: FieldMatch) -> Self {
        self.fields.insert(field.into(), rule);
        self
    }

    /// Drop matching records instead of keeping them.
    pub fn exclude(mut self, exclude: bool) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn is_exclude(&self) -> bool {
        self.exclude
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether `config` is kept by this predicate.
    pub fn keeps(&self, config: &EndpointConfig) -> bool {
        let matched = self
            .fields
            .iter()
            .all(|(field, rule)| rule_matches(rule, &field_value(config, field)));
        matched != self.exclude
    }

    /// Apply the predicate to a list, preserving order.
    pub fn apply(&self, configs: Vec<EndpointConfig>) -> Vec<EndpointConfig> {
        configs.into_iter().filter(|c| self.keeps(c)).collect()
    }
}

fn collect<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

/// The value of one record field as seen by the filter.
enum FieldValue<'a> {
    Absent,
    Scalar(Cow<'a, str>),
    Set(Vec<Cow<'a, str>>),
}

fn field_value<'a>(config: &'a EndpointConfig, field: &str) -> FieldValue<'a> {
    let scalar = |v: Option<&'a str>| match v {
        Some(s) => FieldValue::Scalar(Cow::Borrowed(s)),
        None => FieldValue::Absent,
    };

    match field {
        "model" => scalar(Some(config.model())),
        "api_key" => scalar(config.api_key()),
        "base_url" => scalar(config.base_url()),
        "api_version" => scalar(config.api_version()),
        "api_type" => scalar(Some(config.api_type().as_str())),
        "tags" => {
            if config.tags().is_empty() {
                FieldValue::Absent
            } else {
                let tags = config.tags().iter().map(|t| Cow::Borrowed(t.as_str()));
                FieldValue::Set(tags.collect())
            }
        }
        other => match config.extra().get(other) {
            None | Some(Value::Null) => FieldValue::Absent,
            Some(Value::Array(items)) => FieldValue::Set(items.iter().map(json_text).collect()),
            Some(value) => FieldValue::Scalar(json_text(value)),
        },
    }
}

fn json_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

fn rule_matches(rule: &FieldMatch, value: &FieldValue<'_>) -> bool {
    match (rule, value) {
        (FieldMatch::Missing, FieldValue::Absent) => true,
        (FieldMatch::Missing, _) => false,
        (_, FieldValue::Absent) => false,
        (
            FieldMatch::ExactMatch(accepted) | FieldMatch::TagOverlap(accepted),
            FieldValue::Scalar(s),
        ) => accepted.iter().any(|a| a == s),
        (
            FieldMatch::ExactMatch(accepted) | FieldMatch::TagOverlap(accepted),
            FieldValue::Set(items),
        ) => items.iter().any(|item| accepted.iter().any(|a| a == item)),
    }
}
