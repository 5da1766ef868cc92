use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

use crate::portfolio::transaction::Transaction;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(YahooProviderConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RatesConfig {
    /// Seconds between scheduled rate refreshes.
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,
    /// Minimum milliseconds between consecutive provider requests.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Total attempts per pair before it is omitted.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Backoff before the first retry; doubles per attempt.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_fetch_interval_secs() -> u64 {
    300
}
fn default_request_delay_ms() -> u64 {
    200
}
fn default_max_attempts() -> usize {
    5
}
fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for RatesConfig {
    fn default() -> Self {
        RatesConfig {
            fetch_interval_secs: default_fetch_interval_secs(),
            request_delay_ms: default_request_delay_ms(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SummaryConfig {
    /// Seconds a computed summary stays fresh.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Seconds between proactive background recomputations.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_max_age_secs() -> u64 {
    600
}
fn default_refresh_interval_secs() -> u64 {
    300
}

impl Default for SummaryConfig {
    fn default() -> Self {
        SummaryConfig {
            max_age_secs: default_max_age_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

fn default_main_currency() -> String {
    "USD".to_string()
}

fn default_secondary_currency() -> String {
    "EUR".to_string()
}

fn default_currencies() -> Vec<String> {
    ["USD", "EUR", "GBP", "PLN"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Reporting currency all portfolio figures are expressed in.
    #[serde(default = "default_main_currency")]
    pub main_currency: String,
    /// Second triangulation pivot for the rate resolver.
    #[serde(default = "default_secondary_currency")]
    pub secondary_currency: String,
    /// Display currencies to keep rates fresh for.
    #[serde(default = "default_currencies")]
    pub currencies: Vec<String>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    /// Override for the durable snapshot/summary directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// The transaction log, supplied here for the CLI. Acts as the
    /// transaction-store collaborator.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "btcfolio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "btcfolio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// The directory durable documents live in: the configured override or
    /// the platform data dir.
    pub fn data_path(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_data_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::transaction::TransactionKind;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
main_currency: "EUR"
currencies: ["EUR", "USD", "PLN"]
transactions:
  - id: "t1"
    type: buy
    btc_amount: 0.1
    price_per_unit: 50000.0
    currency: "EUR"
    fee: 10.0
    timestamp: "2024-01-01T00:00:00Z"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.main_currency, "EUR");
        assert_eq!(config.secondary_currency, "EUR"); // default kicks in
        assert_eq!(config.currencies.len(), 3);
        assert_eq!(config.transactions.len(), 1);
        assert_eq!(config.transactions[0].kind, TransactionKind::Buy);
        assert_eq!(config.rates.fetch_interval_secs, 300);
        assert_eq!(config.rates.request_delay_ms, 200);
        assert_eq!(config.summary.max_age_secs, 600);
        assert_eq!(
            config.providers.yahoo.unwrap().base_url,
            "https://query1.finance.yahoo.com"
        );
    }

    #[test]
    fn test_config_overrides() {
        let yaml_str = r#"
providers:
  yahoo:
    base_url: "http://example.com/yahoo"
rates:
  fetch_interval_secs: 60
  max_attempts: 2
summary:
  max_age_secs: 120
data_dir: "/tmp/btcfolio-test"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(config.main_currency, "USD");
        assert_eq!(
            config.providers.yahoo.as_ref().unwrap().base_url,
            "http://example.com/yahoo"
        );
        assert_eq!(config.rates.fetch_interval_secs, 60);
        assert_eq!(config.rates.max_attempts, 2);
        assert_eq!(config.rates.retry_delay_ms, 500);
        assert_eq!(config.summary.max_age_secs, 120);
        assert_eq!(config.data_path().unwrap(), PathBuf::from("/tmp/btcfolio-test"));
        assert!(config.transactions.is_empty());
    }
}
