//! Request/response channel to a SPARQL endpoint.
//!
//! The rest of the crate only sees [`QueryChannel`]: a query string goes in,
//! a list of variable bindings (or a [`QueryError`]) comes out.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::Config;
use crate::error::QueryError;

/// One bound RDF term from a SPARQL-JSON result row
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Term {
    pub value: String,
}

impl Term {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// A result row: variable name → bound term. Unbound variables are absent.
pub type Binding = HashMap<String, Term>;

/// Read a bound variable's value
pub fn value_of<'a>(binding: &'a Binding, variable: &str) -> Option<&'a str> {
    binding.get(variable).map(|term| term.value.as_str())
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<Binding>,
}

/// Parse a SPARQL 1.1 JSON results document into its bindings
pub fn parse_bindings(body: &str) -> Result<Vec<Binding>, serde_json::Error> {
    let response: SparqlResponse = serde_json::from_str(body)?;
    Ok(response.results.bindings)
}

/// Anything that can answer a SELECT query
#[async_trait]
pub trait QueryChannel: Send + Sync {
    async fn select(&self, query: &str) -> Result<Vec<Binding>, QueryError>;
}

/// [`QueryChannel`] over the SPARQL 1.1 protocol (query sent directly in a POST body)
pub struct SparqlHttpChannel {
    client: reqwest::Client,
    endpoint: String,
}

impl SparqlHttpChannel {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/sparql-results+json"),
        );
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/sparql-query"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client for the SPARQL endpoint")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QueryChannel for SparqlHttpChannel {
    async fn select(&self, query: &str) -> Result<Vec<Binding>, QueryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .body(query.to_string())
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => QueryError::RateLimited,
                StatusCode::BAD_REQUEST => QueryError::MalformedRequest(body),
                _ => QueryError::Transport(format!("SPARQL endpoint error ({}): {}", status, body)),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        parse_bindings(&body)
            .map_err(|e| QueryError::Transport(format!("Failed to parse SPARQL response: {}", e)))
    }
}
