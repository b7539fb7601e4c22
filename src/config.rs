//! Service configuration read from the environment (`.env` is loaded first by
//! the binary).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// How pending transactions are resolved against the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCheckStrategy {
    /// Match `Issued` events emitted by the SBT contract
    Events,
    /// Look every transaction up by hash
    Transaction,
}

impl FromStr for StatusCheckStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "events" => Ok(StatusCheckStrategy::Events),
            "transaction" => Ok(StatusCheckStrategy::Transaction),
            _ => Err("expected \"events\" or \"transaction\"".to_string()),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub multibaas_base_url: String,
    pub multibaas_api_key: String,
    pub chain: String,
    pub contract_alias: String,
    pub contract_label: String,
    pub wallet_private_key: String,
    pub polling_interval: Duration,
    pub grace_period: chrono::Duration,
    pub status_check_strategy: StatusCheckStrategy,
    pub database_url: Option<String>,
    pub server_hostname: String,
    pub server_port: u16,
}

// Secrets stay out of logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("multibaas_base_url", &self.multibaas_base_url)
            .field("multibaas_api_key", &"<redacted>")
            .field("chain", &self.chain)
            .field("contract_alias", &self.contract_alias)
            .field("contract_label", &self.contract_label)
            .field("wallet_private_key", &"<redacted>")
            .field("polling_interval", &self.polling_interval)
            .field("grace_period", &self.grace_period)
            .field("status_check_strategy", &self.status_check_strategy)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("server_hostname", &self.server_hostname)
            .field("server_port", &self.server_port)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let polling_seconds: u64 = parse(
            "TX_STATUS_POLLING_INTERVAL_SECONDS",
            &required("TX_STATUS_POLLING_INTERVAL_SECONDS")?,
        )?;
        if polling_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "TX_STATUS_POLLING_INTERVAL_SECONDS",
                value: polling_seconds.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let grace_seconds: u64 = parse(
            "DISCARDED_TX_GRACE_PERIOD_SECONDS",
            &required("DISCARDED_TX_GRACE_PERIOD_SECONDS")?,
        )?;
        let grace_period = i64::try_from(grace_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| ConfigError::Invalid {
                key: "DISCARDED_TX_GRACE_PERIOD_SECONDS",
                value: grace_seconds.to_string(),
                reason: "out of range".to_string(),
            })?;

        let status_check_strategy = match get("STATUS_CHECK_STRATEGY") {
            Some(value) => parse("STATUS_CHECK_STRATEGY", &value)?,
            None => StatusCheckStrategy::Events,
        };

        let server_port = match get("SERVER_PORT") {
            Some(value) => parse("SERVER_PORT", &value)?,
            None => 3000,
        };

        Ok(Self {
            multibaas_base_url: required("MULTIBAAS_BASE_URL")?,
            multibaas_api_key: required("MULTIBAAS_API_KEY")?,
            chain: or_default("CHAIN", "ethereum"),
            contract_alias: or_default("SBT_CONTRACT_ALIAS", "sbt"),
            contract_label: or_default("SBT_CONTRACT_LABEL", "sbt"),
            wallet_private_key: required("WALLET_PRIVATE_KEY")?,
            polling_interval: Duration::from_secs(polling_seconds),
            grace_period,
            status_check_strategy,
            database_url: get("DATABASE_URL"),
            server_hostname: or_default("SERVER_HOSTNAME", "0.0.0.0"),
            server_port,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_hostname, self.server_port)
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
