//! Batched, retried queries for item assertions and URI labels.

use std::collections::BTreeSet;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::QueryError;
use crate::model::{Fetched, LabelRecord, LanguageTag, PropertyValuePair};
use crate::retry::{with_retry_if, RetryConfig};
use crate::sparql::{value_of, Binding, QueryChannel};

const WIKIBASE_PREFIXES: &str = "\
PREFIX wikibase: <http://wikiba.se/ontology#>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX prov: <http://www.w3.org/ns/prov#>
";

/// Which kind of URI a label query resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Property,
    Value,
}

impl LabelKind {
    fn name(self) -> &'static str {
        match self {
            LabelKind::Property => "property labels",
            LabelKind::Value => "value labels",
        }
    }

    /// (subject, label, language) variable names in the result rows
    fn variables(self) -> (&'static str, &'static str, &'static str) {
        match self {
            LabelKind::Property => ("p", "propertyLabel", "propertyLabelLang"),
            LabelKind::Value => ("v", "valueLabel", "valueLabelLang"),
        }
    }

    fn query(self, batch: &[&str]) -> String {
        let values_clause = batch
            .iter()
            .map(|uri| format!("(<{}>)", uri))
            .collect::<Vec<_>>()
            .join(" ");

        match self {
            LabelKind::Property => format!(
                r#"{WIKIBASE_PREFIXES}
SELECT ?p ?propertyLabel ?propertyLabelLang WHERE {{
  VALUES (?p) {{ {values_clause} }}
  OPTIONAL {{
    ?property wikibase:directClaim ?p ;
              rdfs:label ?propertyLabel .
    BIND(LANG(?propertyLabel) AS ?propertyLabelLang)
  }}
}}"#
            ),
            LabelKind::Value => format!(
                r#"{WIKIBASE_PREFIXES}
SELECT ?v ?valueLabel ?valueLabelLang WHERE {{
  VALUES (?v) {{ {values_clause} }}
  OPTIONAL {{
    FILTER(isIRI(?v))
    ?v rdfs:label ?valueLabel .
    BIND(LANG(?valueLabel) AS ?valueLabelLang)
  }}
}}"#
            ),
        }
    }

    fn record(self, binding: &Binding) -> Option<LabelRecord> {
        let (subject_var, label_var, language_var) = self.variables();
        let subject = value_of(binding, subject_var)?;

        match value_of(binding, label_var) {
            Some(label) => Some(LabelRecord::new(
                subject,
                label,
                LanguageTag::from(value_of(binding, language_var).map(str::to_string)),
            )),
            None => Some(LabelRecord::unlabelled(subject)),
        }
    }
}

/// Which statement level an assertion query reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssertionLevel {
    Direct,
    Qualifier,
    Reference,
}

impl AssertionLevel {
    fn name(self) -> &'static str {
        match self {
            AssertionLevel::Direct => "assertions",
            AssertionLevel::Qualifier => "qualifier assertions",
            AssertionLevel::Reference => "reference assertions",
        }
    }

    /// Qualifier and reference predicates are mapped back to the property's
    /// direct-claim URI so they share one namespace with direct assertions.
    fn pattern(self, identifier: &str) -> String {
        match self {
            AssertionLevel::Direct => format!("  wd:{identifier} ?property ?value ."),
            AssertionLevel::Qualifier => format!(
                "  wd:{identifier} ?claim ?statement .
  ?statement a wikibase:Statement ;
             ?qualifier ?value .
  ?qualifierProperty wikibase:qualifier ?qualifier ;
                     wikibase:directClaim ?property ."
            ),
            AssertionLevel::Reference => format!(
                "  wd:{identifier} ?claim ?statement .
  ?statement prov:wasDerivedFrom ?reference .
  ?reference ?referencePredicate ?value .
  ?referenceProperty wikibase:reference ?referencePredicate ;
                     wikibase:directClaim ?property ."
            ),
        }
    }
}

/// Identifiers are spliced into queries as `wd:<identifier>`
pub fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Fetches assertions and labels over a [`QueryChannel`].
///
/// Holds configuration only; calls for different identifiers may run
/// concurrently against the same client.
pub struct RetrievalClient<C> {
    channel: C,
    retry: RetryConfig,
    batch_size: usize,
    entity_namespace: String,
    property_namespace: String,
    cancel: CancellationToken,
}

impl<C: QueryChannel> RetrievalClient<C> {
    pub fn new(channel: C, config: &Config) -> Self {
        Self {
            channel,
            retry: config.retry_config(),
            batch_size: config.batch_size.clamp(1, crate::config::MAX_BATCH_SIZE),
            entity_namespace: config.entity_namespace.clone(),
            property_namespace: config.property_namespace.clone(),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort pending and future retries when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// (property, value) pairs directly asserted on the item
    pub async fn fetch_assertions(&self, identifier: &str) -> Fetched<Vec<PropertyValuePair>> {
        self.fetch_pairs(AssertionLevel::Direct, identifier).await
    }

    /// (property, value) pairs asserted as qualifiers on the item's statements
    pub async fn fetch_qualifier_assertions(
        &self,
        identifier: &str,
    ) -> Fetched<Vec<PropertyValuePair>> {
        self.fetch_pairs(AssertionLevel::Qualifier, identifier).await
    }

    /// (property, value) pairs asserted in references of the item's statements
    pub async fn fetch_reference_assertions(
        &self,
        identifier: &str,
    ) -> Fetched<Vec<PropertyValuePair>> {
        self.fetch_pairs(AssertionLevel::Reference, identifier).await
    }

    /// Labels of the direct-property URIs in `uris`, one query per batch.
    ///
    /// `NoData` when no URI qualifies. A batch that fails after its retries
    /// fails the whole lookup so a partial list is never mistaken for
    /// complete coverage.
    pub async fn fetch_property_labels(
        &self,
        uris: &BTreeSet<String>,
    ) -> Fetched<Vec<LabelRecord>> {
        let properties: Vec<&str> = uris
            .iter()
            .map(String::as_str)
            .filter(|uri| uri.starts_with(self.property_namespace.as_str()))
            .collect();
        self.fetch_labels(LabelKind::Property, &properties).await
    }

    /// Labels of the item URIs in `uris`; literals and other URIs are skipped
    pub async fn fetch_value_labels(&self, uris: &BTreeSet<String>) -> Fetched<Vec<LabelRecord>> {
        let items: Vec<&str> = uris
            .iter()
            .map(String::as_str)
            .filter(|uri| self.is_item_uri(uri))
            .collect();
        self.fetch_labels(LabelKind::Value, &items).await
    }

    fn is_item_uri(&self, uri: &str) -> bool {
        uri.strip_prefix(self.entity_namespace.as_str())
            .is_some_and(|local| local.starts_with('Q'))
    }

    fn assertion_query(&self, level: AssertionLevel, identifier: &str) -> String {
        format!(
            "PREFIX wd: <{}>\n{}\nSELECT ?property ?value WHERE {{\n{}\n}}",
            self.entity_namespace,
            WIKIBASE_PREFIXES,
            level.pattern(identifier)
        )
    }

    async fn fetch_pairs(
        &self,
        level: AssertionLevel,
        identifier: &str,
    ) -> Fetched<Vec<PropertyValuePair>> {
        if !is_valid_identifier(identifier) {
            warn!("Skipping {} for malformed identifier {:?}", level.name(), identifier);
            return Fetched::Failed(QueryError::MalformedRequest(format!(
                "invalid identifier {:?}",
                identifier
            )));
        }

        let query = self.assertion_query(level, identifier);
        let operation_name = format!("{} of {}", level.name(), identifier);

        let fetched: Fetched<Vec<PropertyValuePair>> = self
            .run_query(&operation_name, &query)
            .await
            .map(|bindings| {
                bindings
                    .iter()
                    .filter_map(|binding| {
                        Some(PropertyValuePair::new(
                            value_of(binding, "property")?,
                            value_of(binding, "value")?,
                        ))
                    })
                    .collect::<Vec<_>>()
            })
            .into();

        match &fetched {
            Fetched::Data(pairs) => info!("{}: {} pairs", operation_name, pairs.len()),
            Fetched::NoData => info!("{}: no data", operation_name),
            Fetched::Failed(e) => warn!("{}: failed ({})", operation_name, e),
        }
        fetched
    }

    async fn fetch_labels(&self, kind: LabelKind, uris: &[&str]) -> Fetched<Vec<LabelRecord>> {
        let batches: Vec<&[&str]> = uris.chunks(self.batch_size).collect();
        let total = batches.len();
        let mut records = Vec::new();

        for (index, batch) in batches.into_iter().enumerate() {
            let operation_name = format!("{} batch {}/{}", kind.name(), index + 1, total);
            match self.run_query(&operation_name, &kind.query(batch)).await {
                Ok(bindings) => {
                    records.extend(bindings.iter().filter_map(|binding| kind.record(binding)));
                }
                Err(e) => {
                    warn!(
                        "{}: failed for {} URIs, abandoning {} ({})",
                        operation_name,
                        batch.len(),
                        kind.name(),
                        e
                    );
                    return Fetched::Failed(e);
                }
            }
        }

        info!(
            "Fetched {} {} records for {} URIs",
            records.len(),
            kind.name(),
            uris.len()
        );
        Fetched::from_rows(records)
    }

    async fn run_query(
        &self,
        operation_name: &str,
        query: &str,
    ) -> Result<Vec<Binding>, QueryError> {
        let started = Instant::now();
        let result = with_retry_if(
            &self.retry,
            operation_name,
            Some(&self.cancel),
            || self.channel.select(query),
            QueryError::is_retryable,
        )
        .await;

        // Advisory only
        debug!(
            "{}: finished in {:?} ({})",
            operation_name,
            started.elapsed(),
            match &result {
                Ok(bindings) => format!("{} bindings", bindings.len()),
                Err(e) => e.to_string(),
            }
        );
        result
    }
}
