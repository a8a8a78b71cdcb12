//! Multilinguality scores of Wikidata and Wikibase items.
//!
//! Fetches the properties and values an item asserts, looks up their labels
//! on a SPARQL endpoint and reports, per language, which share of them is
//! labelled.

pub mod audit;
pub mod config;
pub mod coverage;
pub mod error;
pub mod model;
pub mod report;
pub mod retrieval;
pub mod retry;
pub mod sparql;
