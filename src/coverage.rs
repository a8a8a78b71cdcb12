//! Per-language coverage and missing-translation analysis.
//!
//! Every function here is pure. Denominators are always the number of
//! *distinct* subjects, so duplicate records never move a percentage, and a
//! subject counts toward a language once no matter how many labels it has
//! in it. Language tags are compared exactly (`"en"` and `"EN"` differ).

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{CoverageMap, LabelRecord, LackingByLanguage, LanguageTag, MissingBySubject};

fn distinct_subjects(records: &[LabelRecord]) -> BTreeSet<&str> {
    records.iter().map(|r| r.subject.as_str()).collect()
}

fn subjects_by_language(records: &[LabelRecord]) -> BTreeMap<&LanguageTag, BTreeSet<&str>> {
    let mut by_language: BTreeMap<&LanguageTag, BTreeSet<&str>> = BTreeMap::new();
    for record in records {
        by_language
            .entry(&record.language)
            .or_default()
            .insert(record.subject.as_str());
    }
    by_language
}

fn languages_by_subject(records: &[LabelRecord]) -> BTreeMap<&str, BTreeSet<&LanguageTag>> {
    let mut by_subject: BTreeMap<&str, BTreeSet<&LanguageTag>> = BTreeMap::new();
    for record in records {
        by_subject
            .entry(record.subject.as_str())
            .or_default()
            .insert(&record.language);
    }
    by_subject
}

/// Real languages seen in the records; the unknown sentinel is not one
fn observed_languages(records: &[LabelRecord]) -> BTreeSet<LanguageTag> {
    records
        .iter()
        .map(|r| &r.language)
        .filter(|language| !language.is_unknown())
        .cloned()
        .collect()
}

fn requested_languages<S: AsRef<str>>(languages: &[S]) -> BTreeSet<LanguageTag> {
    languages
        .iter()
        .map(|code| LanguageTag::from(code.as_ref()))
        .collect()
}

fn ratio(covered: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    covered as f64 / total as f64 * 100.0
}

/// Percentage of distinct subjects with at least one label in `language`
pub fn percentage_for_language(records: &[LabelRecord], language: &str) -> f64 {
    let covered: BTreeSet<&str> = records
        .iter()
        .filter(|r| r.language.is(language))
        .map(|r| r.subject.as_str())
        .collect();

    ratio(covered.len(), distinct_subjects(records).len())
}

/// Coverage for each requested language; languages nobody is labelled in get 0
pub fn percentages_for_languages<S: AsRef<str>>(
    records: &[LabelRecord],
    languages: &[S],
) -> CoverageMap {
    let total = distinct_subjects(records).len();
    let by_language = subjects_by_language(records);

    requested_languages(languages)
        .into_iter()
        .map(|language| {
            let covered = by_language.get(&language).map_or(0, BTreeSet::len);
            (language, ratio(covered, total))
        })
        .collect()
}

/// Coverage for every language tag present in the records, the unknown
/// sentinel included
pub fn percentages_all_languages(records: &[LabelRecord]) -> CoverageMap {
    let total = distinct_subjects(records).len();

    subjects_by_language(records)
        .into_iter()
        .map(|(language, subjects)| (language.clone(), ratio(subjects.len(), total)))
        .collect()
}

fn missing_by_subject(
    records: &[LabelRecord],
    universe: &BTreeSet<LanguageTag>,
) -> MissingBySubject {
    languages_by_subject(records)
        .into_iter()
        .filter_map(|(subject, present)| {
            let missing: BTreeSet<LanguageTag> = universe
                .iter()
                .filter(|language| !present.contains(language))
                .cloned()
                .collect();
            (!missing.is_empty()).then(|| (subject.to_string(), missing))
        })
        .collect()
}

fn invert(missing: MissingBySubject) -> LackingByLanguage {
    let mut lacking = LackingByLanguage::new();
    for (subject, languages) in missing {
        for language in languages {
            lacking.entry(language).or_default().insert(subject.clone());
        }
    }
    lacking
}

/// For each subject, the requested languages it has no label in.
/// Fully covered subjects are left out.
pub fn missing_translations<S: AsRef<str>>(
    records: &[LabelRecord],
    languages: &[S],
) -> MissingBySubject {
    missing_by_subject(records, &requested_languages(languages))
}

/// Like [`missing_translations`], against every language seen in the records
pub fn missing_translations_all_languages(records: &[LabelRecord]) -> MissingBySubject {
    missing_by_subject(records, &observed_languages(records))
}

/// For each language seen in the records, the subjects never labelled in it
pub fn properties_lacking_language(records: &[LabelRecord]) -> LackingByLanguage {
    invert(missing_translations_all_languages(records))
}

/// For each requested language, the subjects never labelled in it
pub fn properties_lacking_languages<S: AsRef<str>>(
    records: &[LabelRecord],
    languages: &[S],
) -> LackingByLanguage {
    invert(missing_translations(records, languages))
}
