use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::providers::MarketDataProvider;

// YahooFinanceProvider implementation for MarketDataProvider
pub struct YahooFinanceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("btcfolio/0.1")
            .build()?;
        Ok(YahooFinanceProvider {
            base_url: base_url.to_string(),
            client,
        })
    }

    #[instrument(name = "YahooQuote", skip(self), fields(symbol = %symbol))]
    async fn quote(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        debug!("Requesting quote from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for symbol: {} URL: {}", e, symbol, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for symbol: {}",
                response.status(),
                symbol
            ));
        }

        let text = response.text().await?;
        let data: YahooChartResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", symbol, e))?;

        let item = data
            .chart
            .result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No quote data found for symbol: {}", symbol))?;

        let price = item.meta.regular_market_price;
        if !price.is_finite() || price <= 0.0 {
            return Err(anyhow!(
                "Non-positive quote {} for symbol: {}",
                price,
                symbol
            ));
        }
        Ok(price)
    }
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Vec<ChartItem>,
}

#[derive(Debug, Deserialize)]
struct ChartItem {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: f64,
}

#[async_trait]
impl MarketDataProvider for YahooFinanceProvider {
    async fn fetch_pair(&self, from: &str, to: &str) -> Result<f64> {
        self.quote(&format!("{from}{to}=X")).await
    }

    async fn fetch_btc_price(&self, currency: &str) -> Result<f64> {
        self.quote(&format!("BTC-{currency}")).await
    }
}
