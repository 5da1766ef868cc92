//! Periodic and on-demand fetching of rates from the market-data provider.

use crate::providers::MarketDataProvider;
use crate::providers::util::{Throttle, with_retry};
use crate::rates::snapshot::PartialRates;
use crate::rates::store::RateStore;
use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Minimum delay between consecutive provider requests.
    pub request_delay: Duration,
    /// Total attempts per pair before it is omitted from the result.
    pub max_attempts: usize,
    /// Backoff before the first retry; doubles per attempt.
    pub retry_delay_ms: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            request_delay: Duration::from_millis(200),
            max_attempts: 5,
            retry_delay_ms: 500,
        }
    }
}

/// Obtains fresh rate fragments from the provider and merges them into the
/// store. At most one fetch runs at a time; overlapping `refresh` calls
/// coalesce into the in-flight one.
pub struct RateFetcher {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<RateStore>,
    /// FX pairs to keep current, quoted from the main currency.
    pairs: Vec<(String, String)>,
    /// Currencies to fetch a direct BTC quote for.
    btc_currencies: Vec<String>,
    throttle: Throttle,
    flight: Mutex<()>,
    options: FetchOptions,
}

impl RateFetcher {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<RateStore>,
        main_currency: &str,
        currencies: &[String],
        options: FetchOptions,
    ) -> Self {
        let pairs = currencies
            .iter()
            .filter(|c| c.as_str() != main_currency)
            .map(|c| (main_currency.to_string(), c.clone()))
            .collect();

        RateFetcher {
            provider,
            store,
            pairs,
            btc_currencies: vec![main_currency.to_string()],
            throttle: Throttle::new(options.request_delay),
            flight: Mutex::new(()),
            options,
        }
    }

    /// Fetches all configured pairs and merges the obtained ones. A caller
    /// arriving while a fetch is in flight waits for it and adopts its
    /// result instead of issuing duplicate provider calls. Fails only when
    /// not a single pair could be obtained; the store is left untouched in
    /// that case.
    pub async fn refresh(&self) -> Result<()> {
        let generation = self.store.generation();
        let _flight = self.flight.lock().await;
        if self.store.generation() != generation {
            debug!("Joined in-flight rate refresh");
            return Ok(());
        }

        let partial = self.fetch_rates().await;
        if partial.is_empty() {
            return Err(anyhow!("Rate refresh obtained no pairs from provider"));
        }

        let fetched_pairs: usize = partial.rate_matrix.values().map(|m| m.len()).sum();
        info!(
            fx_pairs = fetched_pairs,
            btc_quotes = partial.btc_price.len(),
            "Merging fetched rates"
        );
        self.store.update(&partial);
        Ok(())
    }

    /// One throttled, retried request per configured pair. Pairs that
    /// exhaust their retries are omitted, never zeroed.
    async fn fetch_rates(&self) -> PartialRates {
        let mut partial = PartialRates::default();

        for currency in &self.btc_currencies {
            self.throttle.wait().await;
            match with_retry(
                || self.provider.fetch_btc_price(currency),
                self.options.max_attempts,
                self.options.retry_delay_ms,
            )
            .await
            {
                Ok(price) => {
                    partial.btc_price.insert(currency.clone(), price);
                }
                Err(e) => warn!(%currency, error = %e, "Omitting BTC quote after retries"),
            }
        }

        for (from, to) in &self.pairs {
            self.throttle.wait().await;
            match with_retry(
                || self.provider.fetch_pair(from, to),
                self.options.max_attempts,
                self.options.retry_delay_ms,
            )
            .await
            {
                Ok(rate) => {
                    partial
                        .rate_matrix
                        .entry(from.clone())
                        .or_default()
                        .insert(to.clone(), rate);
                }
                Err(e) => warn!(%from, %to, error = %e, "Omitting pair after retries"),
            }
        }

        partial
    }

    /// Spawns the periodic refresh loop. Failures are logged; the loop
    /// keeps going with whatever the store already holds.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let fetcher = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so startup reads
            // use persisted data instead of racing the provider.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = fetcher.refresh().await {
                    warn!(error = %e, "Scheduled rate refresh failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_options() -> FetchOptions {
        FetchOptions {
            request_delay: Duration::from_millis(1),
            max_attempts: 2,
            retry_delay_ms: 1,
        }
    }

    /// Provider that fails for a configured set of pairs and counts calls.
    struct ScriptedProvider {
        failing: HashSet<String>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedProvider {
        fn new(failing: &[&str]) -> Self {
            ScriptedProvider {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn answer(&self, key: &str, value: f64) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(key) {
                Err(anyhow!("provider unavailable for {key}"))
            } else {
                Ok(value)
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for ScriptedProvider {
        async fn fetch_pair(&self, from: &str, to: &str) -> Result<f64> {
            tokio::time::sleep(self.delay).await;
            self.answer(&format!("{from}{to}"), 2.0)
        }

        async fn fetch_btc_price(&self, currency: &str) -> Result<f64> {
            tokio::time::sleep(self.delay).await;
            self.answer(&format!("BTC-{currency}"), 60_000.0)
        }
    }

    fn currencies(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_partial_failure_updates_only_obtained_pairs() {
        let store = Arc::new(RateStore::open(None));

        // Seed prior values for the pairs that will fail.
        let mut seed = PartialRates::default();
        seed.rate_matrix
            .entry("EUR".to_string())
            .or_default()
            .extend([("PLN".to_string(), 4.5), ("JPY".to_string(), 160.0)]);
        store.update(&seed);

        let provider = Arc::new(ScriptedProvider::new(&["EURPLN", "EURJPY"]));
        let fetcher = RateFetcher::new(
            Arc::clone(&provider) as Arc<dyn MarketDataProvider>,
            Arc::clone(&store),
            "EUR",
            &currencies(&["EUR", "USD", "GBP", "CHF", "CAD", "PLN", "JPY"]),
            test_options(),
        );

        fetcher.refresh().await.unwrap();

        let (snapshot, _) = store.get();
        let eur = &snapshot.rate_matrix["EUR"];
        // 4 of 6 pairs fetched fresh...
        assert_eq!(eur["USD"], 2.0);
        assert_eq!(eur["GBP"], 2.0);
        assert_eq!(eur["CHF"], 2.0);
        assert_eq!(eur["CAD"], 2.0);
        // ...the failed 2 keep their prior values.
        assert_eq!(eur["PLN"], 4.5);
        assert_eq!(eur["JPY"], 160.0);
        assert_eq!(snapshot.btc_price["EUR"], 60_000.0);
    }

    #[tokio::test]
    async fn test_total_failure_leaves_store_untouched() {
        let store = Arc::new(RateStore::open(None));
        let mut seed = PartialRates::default();
        seed.rate_matrix
            .entry("EUR".to_string())
            .or_default()
            .insert("USD".to_string(), 1.1);
        store.update(&seed);
        let timestamp = store.get().0.timestamp;

        let provider = Arc::new(ScriptedProvider::new(&["BTC-EUR", "EURUSD"]));
        let fetcher = RateFetcher::new(
            provider,
            Arc::clone(&store),
            "EUR",
            &currencies(&["EUR", "USD"]),
            test_options(),
        );

        assert!(fetcher.refresh().await.is_err());
        let (snapshot, _) = store.get();
        assert_eq!(snapshot.rate_matrix["EUR"]["USD"], 1.1);
        assert_eq!(snapshot.timestamp, timestamp);
    }

    #[tokio::test]
    async fn test_failed_pair_is_retried_with_bound() {
        let store = Arc::new(RateStore::open(None));
        let provider = Arc::new(ScriptedProvider::new(&["EURUSD"]));
        let fetcher = RateFetcher::new(
            Arc::clone(&provider) as Arc<dyn MarketDataProvider>,
            store,
            "EUR",
            &currencies(&["EUR", "USD"]),
            test_options(),
        );

        fetcher.refresh().await.unwrap();
        // 1 BTC call + max_attempts for the failing pair.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_coalesce() {
        let store = Arc::new(RateStore::open(None));
        let provider = Arc::new(ScriptedProvider {
            failing: HashSet::new(),
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(20),
        });
        let fetcher = Arc::new(RateFetcher::new(
            Arc::clone(&provider) as Arc<dyn MarketDataProvider>,
            store,
            "EUR",
            &currencies(&["EUR", "USD", "PLN"]),
            test_options(),
        ));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let fetcher = Arc::clone(&fetcher);
                tokio::spawn(async move { fetcher.refresh().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // One BTC quote plus two pairs: a single flight's worth of calls.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }
}
