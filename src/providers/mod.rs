//! Market-data providers and shared request plumbing.

pub mod util;
pub mod yahoo_finance;

use anyhow::Result;
use async_trait::async_trait;

/// External market-data source for BTC spot prices and FX pairs. One
/// request per query; failures are transient-retryable by the caller.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_pair(&self, from: &str, to: &str) -> Result<f64>;
    async fn fetch_btc_price(&self, currency: &str) -> Result<f64>;
}
