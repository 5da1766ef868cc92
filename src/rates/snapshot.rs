//! The canonical rate snapshot and its durable document format.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// All rate data we currently believe, published as a whole. A currency pair
/// absent from the matrix means "unknown" and must fall through the resolver
/// chain; it is never stored as 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSnapshot {
    /// BTC spot price keyed by quote currency.
    #[serde(default)]
    pub btc_price: HashMap<String, f64>,
    /// FX rates: `rate_matrix[from][to]` units of `to` per unit of `from`.
    /// The identity pair is implicit and never stored.
    #[serde(default)]
    pub rate_matrix: HashMap<String, HashMap<String, f64>>,
    pub timestamp: DateTime<Utc>,
}

/// The fragment a fetch produced. Pairs that could not be obtained are
/// simply absent.
#[derive(Debug, Clone, Default)]
pub struct PartialRates {
    pub btc_price: HashMap<String, f64>,
    pub rate_matrix: HashMap<String, HashMap<String, f64>>,
}

impl PartialRates {
    pub fn is_empty(&self) -> bool {
        self.btc_price.is_empty() && self.rate_matrix.is_empty()
    }
}

fn valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

impl RateSnapshot {
    pub fn empty() -> Self {
        RateSnapshot {
            btc_price: HashMap::new(),
            rate_matrix: HashMap::new(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Builds the successor snapshot by merging `partial` field-by-field.
    /// Non-finite or non-positive rates and identity pairs are dropped.
    /// Entries not present in `partial` keep their prior values.
    pub fn merged(&self, partial: &PartialRates) -> Self {
        let mut next = self.clone();

        for (currency, price) in &partial.btc_price {
            if !valid_rate(*price) {
                warn!(%currency, price, "Dropping invalid BTC price from merge");
                continue;
            }
            next.btc_price.insert(currency.clone(), *price);
        }

        for (from, targets) in &partial.rate_matrix {
            for (to, rate) in targets {
                if from == to {
                    debug!(%from, "Skipping identity pair in merge");
                    continue;
                }
                if !valid_rate(*rate) {
                    warn!(%from, %to, rate, "Dropping invalid rate from merge");
                    continue;
                }
                next.rate_matrix
                    .entry(from.clone())
                    .or_default()
                    .insert(to.clone(), *rate);
            }
        }

        next.timestamp = Utc::now();
        next
    }

    /// Parses the durable document. Older flat documents (a single USD BTC
    /// price plus USD-quoted rates) are upgraded into the matrix shape here,
    /// once, and never written back out in the old form.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(raw).context("Snapshot document is not valid JSON")?;

        let is_legacy = value.get("btcPriceUsd").is_some() || value.get("usdRates").is_some();
        if !is_legacy {
            return serde_json::from_value(value).context("Failed to parse snapshot document");
        }

        debug!("Upgrading legacy flat snapshot document to matrix shape");
        let legacy: LegacyDocument =
            serde_json::from_value(value).context("Failed to parse legacy snapshot document")?;

        let mut snapshot = RateSnapshot::empty();
        if let Some(price) = legacy.btc_price_usd.filter(|p| valid_rate(*p)) {
            snapshot.btc_price.insert("USD".to_string(), price);
        }
        if let Some(rates) = legacy.usd_rates {
            let targets: HashMap<String, f64> = rates
                .into_iter()
                .filter(|(to, rate)| to != "USD" && valid_rate(*rate))
                .collect();
            if !targets.is_empty() {
                snapshot.rate_matrix.insert("USD".to_string(), targets);
            }
        }
        if let Some(timestamp) = legacy.timestamp {
            snapshot.timestamp = timestamp;
        }
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize snapshot document")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyDocument {
    btc_price_usd: Option<f64>,
    usd_rates: Option<HashMap<String, f64>>,
    timestamp: Option<DateTime<Utc>>,
}
