//! Records shared between retrieval and coverage analysis.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::error::QueryError;

/// Label text used for subjects the endpoint returned no label for
pub const NO_LABEL: &str = "No label";

/// Language of a label.
///
/// `Unknown` is the sentinel for "the endpoint gave no language at all" and is
/// distinct from `Known("")`, which is what a plain literal carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LanguageTag {
    Known(String),
    Unknown,
}

impl LanguageTag {
    /// Exact, case-sensitive match against a language code
    pub fn is(&self, code: &str) -> bool {
        matches!(self, LanguageTag::Known(tag) if tag == code)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, LanguageTag::Unknown)
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageTag::Known(tag) => f.write_str(tag),
            LanguageTag::Unknown => f.write_str("Unknown language"),
        }
    }
}

impl From<&str> for LanguageTag {
    fn from(code: &str) -> Self {
        LanguageTag::Known(code.to_string())
    }
}

impl From<String> for LanguageTag {
    fn from(code: String) -> Self {
        LanguageTag::Known(code)
    }
}

impl From<Option<String>> for LanguageTag {
    fn from(code: Option<String>) -> Self {
        code.map_or(LanguageTag::Unknown, LanguageTag::Known)
    }
}

/// A label attached to a property or value URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelRecord {
    pub subject: String,
    pub label: String,
    pub language: LanguageTag,
}

impl LabelRecord {
    pub fn new(
        subject: impl Into<String>,
        label: impl Into<String>,
        language: impl Into<LanguageTag>,
    ) -> Self {
        Self {
            subject: subject.into(),
            label: label.into(),
            language: language.into(),
        }
    }

    /// Placeholder for a subject with no label in any language
    pub fn unlabelled(subject: impl Into<String>) -> Self {
        Self::new(subject, NO_LABEL, LanguageTag::Unknown)
    }
}

/// One (property, value) assertion on an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyValuePair {
    pub property: String,
    pub value: String,
}

impl PropertyValuePair {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }

    /// Whether the value is an IRI rather than a literal
    pub fn has_uri_value(&self) -> bool {
        self.value.starts_with("http")
    }
}

/// Distinct property URIs of a set of assertions
pub fn property_uris(pairs: &[PropertyValuePair]) -> BTreeSet<String> {
    pairs.iter().map(|pair| pair.property.clone()).collect()
}

/// Distinct IRI values of a set of assertions; literals are dropped
pub fn value_uris(pairs: &[PropertyValuePair]) -> BTreeSet<String> {
    pairs
        .iter()
        .filter(|pair| pair.has_uri_value())
        .map(|pair| pair.value.clone())
        .collect()
}

/// Outcome of a remote fetch.
///
/// `NoData` and `Failed` both mean "nothing to analyse"; neither may be
/// reported as 0% coverage.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Data(T),
    NoData,
    Failed(QueryError),
}

impl<T> Fetched<T> {
    pub fn is_data(&self) -> bool {
        matches!(self, Fetched::Data(_))
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Fetched::Data(data) => Some(data),
            Fetched::NoData | Fetched::Failed(_) => None,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Fetched::Data(data) => Some(data),
            Fetched::NoData | Fetched::Failed(_) => None,
        }
    }

    pub fn as_ref(&self) -> Fetched<&T> {
        match self {
            Fetched::Data(data) => Fetched::Data(data),
            Fetched::NoData => Fetched::NoData,
            Fetched::Failed(e) => Fetched::Failed(e.clone()),
        }
    }

    /// Transform the data, keeping `NoData` and `Failed` as they are
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Fetched::Data(data) => Fetched::Data(f(data)),
            Fetched::NoData => Fetched::NoData,
            Fetched::Failed(e) => Fetched::Failed(e),
        }
    }
}

impl<T> Fetched<Vec<T>> {
    /// An empty successful result is `NoData`
    pub fn from_rows(rows: Vec<T>) -> Self {
        if rows.is_empty() {
            Fetched::NoData
        } else {
            Fetched::Data(rows)
        }
    }
}

impl<T> From<Result<Vec<T>, QueryError>> for Fetched<Vec<T>> {
    fn from(result: Result<Vec<T>, QueryError>) -> Self {
        match result {
            Ok(rows) => Fetched::from_rows(rows),
            Err(e) => Fetched::Failed(e),
        }
    }
}

/// Language → percentage of distinct subjects labelled in it
pub type CoverageMap = BTreeMap<LanguageTag, f64>;

/// Subject → languages it has no label in
pub type MissingBySubject = BTreeMap<String, BTreeSet<LanguageTag>>;

/// Language → subjects with no label in it
pub type LackingByLanguage = BTreeMap<LanguageTag, BTreeSet<String>>;
