//! Per-item audit: fetch everything an item asserts, look up labels and
//! compute coverage.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::coverage;
use crate::error::QueryError;
use crate::model::{
    property_uris, value_uris, CoverageMap, Fetched, LabelRecord, LackingByLanguage,
    PropertyValuePair,
};
use crate::retrieval::RetrievalClient;
use crate::sparql::QueryChannel;

/// Coverage figures for one item.
///
/// Each section is `NoData` when there was nothing to label and `Failed`
/// when its label lookup failed; only `Data` holds percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemReport {
    pub identifier: String,
    pub assertion_count: usize,
    pub property_coverage: Fetched<CoverageMap>,
    pub value_coverage: Fetched<CoverageMap>,
    pub combined_coverage: Fetched<CoverageMap>,
    pub properties_missing: Fetched<LackingByLanguage>,
    pub values_missing: Fetched<LackingByLanguage>,
}

/// Result of auditing one item
#[derive(Debug, Clone, PartialEq)]
pub enum ItemAudit {
    /// The item asserts nothing; this is not 0% coverage
    NoData,
    /// Assertions could not be fetched
    Failed(QueryError),
    Report(ItemReport),
}

fn coverage_of(records: &[LabelRecord], languages: Option<&[String]>) -> CoverageMap {
    match languages {
        Some(languages) => coverage::percentages_for_languages(records, languages),
        None => coverage::percentages_all_languages(records),
    }
}

fn gaps_of(records: &[LabelRecord], languages: Option<&[String]>) -> LackingByLanguage {
    match languages {
        Some(languages) => coverage::properties_lacking_languages(records, languages),
        None => coverage::properties_lacking_language(records),
    }
}

fn extend_with(
    pairs: &mut Vec<PropertyValuePair>,
    fetched: Fetched<Vec<PropertyValuePair>>,
) -> Result<(), QueryError> {
    match fetched {
        Fetched::Data(more) => pairs.extend(more),
        Fetched::NoData => {}
        Fetched::Failed(e) => return Err(e),
    }
    Ok(())
}

/// Property and value labels together; failed if either lookup failed
fn combine(
    properties: &Fetched<Vec<LabelRecord>>,
    values: &Fetched<Vec<LabelRecord>>,
) -> Fetched<Vec<LabelRecord>> {
    match (properties, values) {
        (Fetched::Failed(e), _) | (_, Fetched::Failed(e)) => Fetched::Failed(e.clone()),
        _ => Fetched::from_rows(
            properties
                .data()
                .into_iter()
                .chain(values.data())
                .flatten()
                .cloned()
                .collect(),
        ),
    }
}

/// Audit one item.
///
/// Queries run in order (assertions, qualifiers, references, property
/// labels, value labels) with `phase_delay` between the assertion, property
/// label and value label phases. With `languages` set, coverage is reported
/// for exactly those languages; otherwise for every language found.
pub async fn audit_item<C: QueryChannel>(
    client: &RetrievalClient<C>,
    identifier: &str,
    languages: Option<&[String]>,
    phase_delay: Duration,
) -> ItemAudit {
    info!("Auditing {}", identifier);

    let mut pairs = match client.fetch_assertions(identifier).await {
        Fetched::Data(pairs) => pairs,
        Fetched::NoData => return ItemAudit::NoData,
        Fetched::Failed(e) => return ItemAudit::Failed(e),
    };
    let extended = match extend_with(
        &mut pairs,
        client.fetch_qualifier_assertions(identifier).await,
    ) {
        Ok(()) => extend_with(&mut pairs, client.fetch_reference_assertions(identifier).await),
        Err(e) => Err(e),
    };
    if let Err(e) = extended {
        warn!("{}: assertions incomplete, not scoring ({})", identifier, e);
        return ItemAudit::Failed(e);
    }
    debug!("{}: {} assertions in total", identifier, pairs.len());

    tokio::time::sleep(phase_delay).await;
    let property_labels = client.fetch_property_labels(&property_uris(&pairs)).await;

    tokio::time::sleep(phase_delay).await;
    let value_labels = client.fetch_value_labels(&value_uris(&pairs)).await;

    let combined = combine(&property_labels, &value_labels);

    ItemAudit::Report(ItemReport {
        identifier: identifier.to_string(),
        assertion_count: pairs.len(),
        property_coverage: property_labels.as_ref().map(|r| coverage_of(r, languages)),
        value_coverage: value_labels.as_ref().map(|r| coverage_of(r, languages)),
        combined_coverage: combined.map(|r| coverage_of(&r, languages)),
        properties_missing: property_labels.map(|r| gaps_of(&r, languages)),
        values_missing: value_labels.map(|r| gaps_of(&r, languages)),
    })
}

/// Audit several items, up to `concurrency` at a time, results in input order
pub async fn audit_all<C: QueryChannel>(
    client: &RetrievalClient<C>,
    identifiers: &[String],
    languages: Option<&[String]>,
    phase_delay: Duration,
    concurrency: usize,
) -> Vec<(String, ItemAudit)> {
    stream::iter(identifiers)
        .map(|identifier| async move {
            let audit = audit_item(client, identifier, languages, phase_delay).await;
            (identifier.clone(), audit)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::LanguageTag;
    use crate::sparql::{Binding, Term};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    const PROP: &str = "http://www.wikidata.org/prop/direct/";
    const ENTITY: &str = "http://www.wikidata.org/entity/";

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Phase {
        Assertions,
        Qualifiers,
        References,
        PropertyLabels,
        ValueLabels,
    }

    fn phase_of(query: &str) -> Phase {
        if query.contains("wikibase:qualifier ?qualifier") {
            Phase::Qualifiers
        } else if query.contains("prov:wasDerivedFrom ?reference") {
            Phase::References
        } else if query.contains("?propertyLabelLang") {
            Phase::PropertyLabels
        } else if query.contains("?valueLabelLang") {
            Phase::ValueLabels
        } else {
            Phase::Assertions
        }
    }

    fn binding(pairs: &[(&str, &str)]) -> Binding {
        pairs
            .iter()
            .map(|(var, value)| (var.to_string(), Term::new(*value)))
            .collect()
    }

    /// Answers each phase with a fixed row set and records when it was asked
    #[derive(Default)]
    struct PhaseChannel {
        calls: Mutex<Vec<(Phase, Instant)>>,
        failing: Option<Phase>,
    }

    impl PhaseChannel {
        fn calls(&self) -> Vec<(Phase, Instant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryChannel for PhaseChannel {
        async fn select(&self, query: &str) -> Result<Vec<Binding>, QueryError> {
            let phase = phase_of(query);
            self.calls.lock().unwrap().push((phase, Instant::now()));
            if self.failing == Some(phase) {
                return Err(QueryError::Transport("HTTP 503".to_string()));
            }

            let p31 = format!("{}P31", PROP);
            let p27 = format!("{}P27", PROP);
            let q5 = format!("{}Q5", ENTITY);
            let rows = match phase {
                Phase::Assertions => vec![
                    binding(&[("property", p31.as_str()), ("value", q5.as_str())]),
                    binding(&[("property", p27.as_str()), ("value", "UK")]),
                ],
                Phase::Qualifiers | Phase::References => Vec::new(),
                Phase::PropertyLabels => [&p31, &p27]
                    .into_iter()
                    .filter(|uri| query.contains(uri.as_str()))
                    .map(|uri| {
                        binding(&[
                            ("p", uri.as_str()),
                            ("propertyLabel", "label"),
                            ("propertyLabelLang", "en"),
                        ])
                    })
                    .collect(),
                Phase::ValueLabels => vec![binding(&[
                    ("v", q5.as_str()),
                    ("valueLabel", "human"),
                    ("valueLabelLang", "fr"),
                ])],
            };
            Ok(rows)
        }
    }

    fn client_with(channel: PhaseChannel) -> RetrievalClient<PhaseChannel> {
        let config = Config {
            batch_size: 1,
            time_unit: Duration::from_secs(1),
            ..Config::default()
        };
        RetrievalClient::new(channel, &config)
    }

    fn expect_report(audit: ItemAudit) -> ItemReport {
        match audit {
            ItemAudit::Report(report) => report,
            other => panic!("Expected a report, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_delay_between_retrieval_phases() {
        let phase_delay = Duration::from_secs(1);
        let client = client_with(PhaseChannel::default());

        expect_report(audit_item(&client, "Q42", None, phase_delay).await);

        let calls = client.channel().calls();
        let phases: Vec<Phase> = calls.iter().map(|(phase, _)| *phase).collect();
        assert_eq!(
            phases,
            vec![
                Phase::Assertions,
                Phase::Qualifiers,
                Phase::References,
                Phase::PropertyLabels,
                Phase::PropertyLabels,
                Phase::ValueLabels,
            ]
        );

        let at = |index: usize| calls[index].1;
        // Assertion phase runs back to back
        assert_eq!(at(2), at(0));
        assert!(at(3) - at(2) >= phase_delay);
        // Property label batches follow each other without a throttle
        assert_eq!(at(4), at(3));
        assert!(at(5) - at(4) >= phase_delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_phase_delay_does_not_wait() {
        let client = client_with(PhaseChannel::default());

        let start = Instant::now();
        expect_report(audit_item(&client, "Q42", None, Duration::ZERO).await);

        assert_eq!(Instant::now(), start);
    }

    #[tokio::test]
    async fn test_report_sections() {
        let client = client_with(PhaseChannel::default());

        let report = expect_report(audit_item(&client, "Q42", None, Duration::ZERO).await);

        assert_eq!(report.assertion_count, 2);
        let en = LanguageTag::from("en");
        let fr = LanguageTag::from("fr");
        assert_eq!(report.property_coverage.data().unwrap()[&en], 100.0);
        assert_eq!(report.value_coverage.data().unwrap()[&fr], 100.0);
        // 2 properties in English, 1 value in French
        let combined = report.combined_coverage.data().unwrap();
        assert!((combined[&en] - 200.0 / 3.0).abs() < 1e-9);
        assert!((combined[&fr] - 100.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_value_lookup_is_not_zero_coverage() {
        let client = client_with(PhaseChannel {
            failing: Some(Phase::ValueLabels),
            ..PhaseChannel::default()
        });
        let languages = vec!["en".to_string(), "fr".to_string()];

        let report =
            expect_report(audit_item(&client, "Q42", Some(languages.as_slice()), Duration::ZERO).await);

        fn failed<T>() -> Fetched<T> {
            Fetched::Failed(QueryError::Transport("HTTP 503".to_string()))
        }
        assert_eq!(report.value_coverage, failed());
        assert_eq!(report.values_missing, failed());
        assert_eq!(report.combined_coverage, failed());
        assert!(report.property_coverage.is_data());
    }

    #[tokio::test]
    async fn test_failed_qualifier_fetch_fails_the_item() {
        let client = client_with(PhaseChannel {
            failing: Some(Phase::Qualifiers),
            ..PhaseChannel::default()
        });

        let audit = audit_item(&client, "Q42", None, Duration::ZERO).await;

        assert_eq!(
            audit,
            ItemAudit::Failed(QueryError::Transport("HTTP 503".to_string()))
        );
        // No labels are looked up for an incomplete assertion set
        assert!(client
            .channel()
            .calls()
            .iter()
            .all(|(phase, _)| !matches!(phase, Phase::PropertyLabels | Phase::ValueLabels)));
    }

    #[test]
    fn test_combine_concatenates_or_fails() {
        let properties = Fetched::Data(vec![LabelRecord::new("P31", "instance of", "en")]);
        let values = Fetched::Data(vec![LabelRecord::new("Q5", "human", "en")]);

        assert_eq!(combine(&properties, &values).into_data().unwrap().len(), 2);
        assert_eq!(
            combine(&properties, &Fetched::NoData).into_data().unwrap().len(),
            1
        );
        assert_eq!(combine(&Fetched::NoData, &Fetched::NoData), Fetched::NoData);
        assert_eq!(
            combine(&properties, &Fetched::Failed(QueryError::RateLimited)),
            Fetched::Failed(QueryError::RateLimited)
        );
    }
}
