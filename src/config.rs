use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub resultsdb_api_url: String,
    pub resultsdb_api_ca: Option<PathBuf>,
    pub resultsdb_api_timeout: Option<Duration>,
    pub amqp_addr: String,
    pub amqp_queue: String,
    pub amqp_exchange: String,
    pub amqp_routing_keys: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let resultsdb_api_url = get("RESULTSDB_API_URL")
            .context("RESULTSDB_API_URL must be set")?
            .trim_end_matches('/')
            .to_string();

        let resultsdb_api_timeout = get("RESULTSDB_API_TIMEOUT_SECS")
            .map(|secs| {
                secs.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("invalid RESULTSDB_API_TIMEOUT_SECS: {}", secs))
            })
            .transpose()?;

        let amqp_routing_keys = get("AMQP_ROUTING_KEYS")
            .unwrap_or_else(|| "#".into())
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();
        if amqp_routing_keys.is_empty() {
            bail!("AMQP_ROUTING_KEYS does not name any routing key");
        }

        Ok(Self {
            resultsdb_api_url,
            resultsdb_api_ca: get("RESULTSDB_API_CA").map(PathBuf::from),
            resultsdb_api_timeout,
            amqp_addr: get("AMQP_ADDR").unwrap_or_else(|| "amqp://127.0.0.1:5672/%2f".into()),
            amqp_queue: get("AMQP_QUEUE").unwrap_or_else(|| "resultsdb-updater".into()),
            amqp_exchange: get("AMQP_EXCHANGE").unwrap_or_else(|| "amq.topic".into()),
            amqp_routing_keys,
        })
    }
}
