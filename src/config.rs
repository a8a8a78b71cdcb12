use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryConfig;

/// Labels are looked up at most this many URIs per query
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct Config {
    // Endpoint
    pub endpoint: String,
    pub user_agent: String,
    pub request_timeout: Duration,

    // Namespaces of the target Wikibase
    pub entity_namespace: String,
    pub property_namespace: String,

    // Batching and throttling
    pub batch_size: usize,
    pub time_unit: Duration,
    pub phase_delay: Duration,

    // Retries
    pub max_attempts: u32,
    pub deadline: Option<Duration>,

    // Orchestration
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "https://query.wikidata.org/sparql".to_string(),
            user_agent: format!(
                "mlscores/{} (multilinguality audit)",
                env!("CARGO_PKG_VERSION")
            ),
            request_timeout: Duration::from_secs(60),
            entity_namespace: "http://www.wikidata.org/entity/".to_string(),
            property_namespace: "http://www.wikidata.org/prop/direct/".to_string(),
            batch_size: MAX_BATCH_SIZE,
            time_unit: Duration::from_secs(1),
            phase_delay: Duration::from_secs(1),
            max_attempts: 5,
            deadline: None,
            concurrency: 1,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let endpoint =
            std::env::var("MLSCORES_ENDPOINT").unwrap_or_else(|_| defaults.endpoint.clone());
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            anyhow::bail!("MLSCORES_ENDPOINT must be an http(s) URL, got {:?}", endpoint);
        }

        let time_unit = env_millis("MLSCORES_TIME_UNIT_MS")?.unwrap_or(defaults.time_unit);

        Ok(Self {
            endpoint,
            user_agent: std::env::var("MLSCORES_USER_AGENT")
                .unwrap_or_else(|_| defaults.user_agent.clone()),
            request_timeout: env_parse("MLSCORES_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),

            entity_namespace: std::env::var("MLSCORES_ENTITY_NAMESPACE")
                .unwrap_or_else(|_| defaults.entity_namespace.clone()),
            property_namespace: std::env::var("MLSCORES_PROPERTY_NAMESPACE")
                .unwrap_or_else(|_| defaults.property_namespace.clone()),

            batch_size: env_parse("MLSCORES_BATCH_SIZE")?
                .unwrap_or(defaults.batch_size)
                .clamp(1, MAX_BATCH_SIZE),
            time_unit,
            // The throttle between phases is one time unit unless set explicitly
            phase_delay: env_millis("MLSCORES_PHASE_DELAY_MS")?.unwrap_or(time_unit),

            max_attempts: env_parse("MLSCORES_MAX_ATTEMPTS")?
                .unwrap_or(defaults.max_attempts)
                .max(1),
            deadline: env_parse("MLSCORES_DEADLINE_SECS")?.map(Duration::from_secs),

            concurrency: env_parse("MLSCORES_CONCURRENCY")?
                .unwrap_or(defaults.concurrency)
                .max(1),
        })
    }

    /// Retry policy for every remote query
    pub fn retry_config(&self) -> RetryConfig {
        let mut retry = RetryConfig::sparql_query(self.time_unit);
        retry.max_attempts = self.max_attempts.max(1);
        retry.deadline = self.deadline;
        retry
    }
}

/// Parse a variable if it is set; a value that does not parse is an error
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} is not a valid number: {:?}", name, raw)),
        Err(_) => Ok(None),
    }
}

fn env_millis(name: &str) -> Result<Option<Duration>> {
    Ok(env_parse(name)?.map(Duration::from_millis))
}
