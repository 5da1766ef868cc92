//! The portfolio service: one explicitly constructed instance wires the
//! rate cache, resolver and summary cache together for its consumers.

use crate::config::AppConfig;
use crate::portfolio::summary::{PortfolioSummary, SummaryCache};
use crate::portfolio::transaction::TransactionSource;
use crate::portfolio::valuation::value_portfolio;
use crate::providers::MarketDataProvider;
use crate::rates::fetcher::{FetchOptions, RateFetcher};
use crate::rates::resolver::RateResolver;
use crate::rates::store::RateStore;
use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

pub struct PortfolioService {
    store: Arc<RateStore>,
    fetcher: Arc<RateFetcher>,
    resolver: RateResolver,
    summaries: Arc<SummaryCache>,
    transactions: Arc<dyn TransactionSource>,
    main_currency: String,
    rate_refresh_interval: Duration,
    summary_refresh_interval: Duration,
}

impl PortfolioService {
    pub fn new(
        config: &AppConfig,
        provider: Arc<dyn MarketDataProvider>,
        transactions: Arc<dyn TransactionSource>,
        data_dir: Option<PathBuf>,
    ) -> Self {
        let store = Arc::new(RateStore::open(
            data_dir.as_ref().map(|d| d.join("rates.json")),
        ));
        let fetcher = Arc::new(RateFetcher::new(
            provider,
            Arc::clone(&store),
            &config.main_currency,
            &config.currencies,
            FetchOptions {
                request_delay: Duration::from_millis(config.rates.request_delay_ms),
                max_attempts: config.rates.max_attempts,
                retry_delay_ms: config.rates.retry_delay_ms,
            },
        ));
        let resolver = RateResolver::new(&config.main_currency, &config.secondary_currency);
        let summaries = Arc::new(SummaryCache::new(
            chrono::Duration::seconds(config.summary.max_age_secs as i64),
            data_dir.as_ref().map(|d| d.join("summary.json")),
        ));

        PortfolioService {
            store,
            fetcher,
            resolver,
            summaries,
            transactions,
            main_currency: config.main_currency.clone(),
            rate_refresh_interval: Duration::from_secs(config.rates.fetch_interval_secs),
            summary_refresh_interval: Duration::from_secs(config.summary.refresh_interval_secs),
        }
    }

    /// BTC spot price in `currency`, from the best currently held data.
    /// Never blocks on the provider and never returns a non-positive value.
    pub fn get_current_price(&self, currency: &str) -> f64 {
        let (snapshot, _) = self.store.get();
        let quote = self.resolver.btc_price(&snapshot, currency);
        if quote.is_estimate() {
            warn!(%currency, "Serving estimated BTC price from fallback data");
        }
        quote.rate
    }

    /// FX rate between two currencies, same non-blocking guarantees.
    pub fn get_rate(&self, from: &str, to: &str) -> f64 {
        let (snapshot, _) = self.store.get();
        let quote = self.resolver.resolve(&snapshot, from, to);
        if quote.is_estimate() {
            warn!(%from, %to, "Serving estimated rate from fallback data");
        }
        quote.rate
    }

    pub fn rates(&self) -> (Arc<crate::rates::snapshot::RateSnapshot>, chrono::Duration) {
        self.store.get()
    }

    /// The memoized summary, recomputed only when stale or forced.
    pub async fn get_portfolio_summary(&self, force_fresh: bool) -> Result<PortfolioSummary> {
        let fingerprint = self.transactions.fingerprint().await?;
        let transactions = Arc::clone(&self.transactions);
        let store = Arc::clone(&self.store);
        let resolver = self.resolver.clone();
        let main_currency = self.main_currency.clone();

        self.summaries
            .get(
                move || async move {
                    let txs = transactions.transactions().await?;
                    let (snapshot, _) = store.get();
                    Ok(value_portfolio(
                        &txs,
                        &resolver,
                        &snapshot,
                        &main_currency,
                        Utc::now(),
                    ))
                },
                force_fresh,
                fingerprint,
            )
            .await
    }

    /// Called by the transaction-store collaborator after any write.
    pub fn invalidate_summary(&self) {
        self.summaries.invalidate();
    }

    /// Force-fresh rates. Joins an in-flight fetch rather than duplicating
    /// provider calls.
    pub async fn force_refresh_rates(&self) -> Result<()> {
        self.fetcher.refresh().await
    }

    /// Starts the periodic rate refresh and the proactive summary refresh.
    /// The two timers are independent.
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let fetch_task = Arc::clone(&self.fetcher).spawn_periodic(self.rate_refresh_interval);

        let transactions = Arc::clone(&self.transactions);
        let store = Arc::clone(&self.store);
        let resolver = self.resolver.clone();
        let main_currency = self.main_currency.clone();
        let fingerprint_source = Arc::clone(&self.transactions);

        let summary_task = Arc::clone(&self.summaries).spawn_background_refresh(
            move || {
                let transactions = Arc::clone(&transactions);
                let store = Arc::clone(&store);
                let resolver = resolver.clone();
                let main_currency = main_currency.clone();
                async move {
                    let txs = transactions.transactions().await?;
                    let (snapshot, _) = store.get();
                    Ok(value_portfolio(
                        &txs,
                        &resolver,
                        &snapshot,
                        &main_currency,
                        Utc::now(),
                    ))
                }
            },
            move || {
                let source = Arc::clone(&fingerprint_source);
                async move { source.fingerprint().await }
            },
            self.summary_refresh_interval,
        );

        vec![fetch_task, summary_task]
    }
}
