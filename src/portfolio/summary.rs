//! Memoized portfolio summary with fingerprint and age based staleness.

use crate::portfolio::transaction::LogFingerprint;
use crate::portfolio::valuation::ValuationResult;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub metrics: ValuationResult,
    /// Fingerprint of the transaction log this summary was computed from.
    pub fingerprint: LogFingerprint,
    pub computed_at: DateTime<Utc>,
}

impl PortfolioSummary {
    fn is_fresh(&self, current: &LogFingerprint, max_age: Duration) -> bool {
        self.fingerprint == *current && Utc::now() - self.computed_at < max_age
    }
}

/// Caches the latest valuation so reads do not recompute aggregates. The
/// cache starts empty, turns fresh after a successful compute and goes
/// stale on fingerprint drift, age, or explicit invalidation. At most one
/// recomputation runs at a time; concurrent stale readers share its result.
pub struct SummaryCache {
    current: Mutex<Option<PortfolioSummary>>,
    flight: tokio::sync::Mutex<()>,
    max_age: Duration,
    persist_path: Option<PathBuf>,
}

impl SummaryCache {
    pub fn new(max_age: Duration, persist_path: Option<PathBuf>) -> Self {
        SummaryCache {
            current: Mutex::new(None),
            flight: tokio::sync::Mutex::new(()),
            max_age,
            persist_path,
        }
    }

    fn peek_fresh(&self, fingerprint: &LogFingerprint) -> Option<PortfolioSummary> {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .filter(|s| s.is_fresh(fingerprint, self.max_age))
            .cloned()
    }

    /// Returns the cached summary when fresh for `fingerprint`, otherwise
    /// recomputes under a single-flight guard. A caller that queued behind
    /// an in-flight recomputation adopts its result instead of starting a
    /// second one. When the compute fails and a prior summary exists, the
    /// stale prior is served; with no prior the error propagates.
    pub async fn get<F, Fut>(
        &self,
        compute: F,
        force_fresh: bool,
        fingerprint: LogFingerprint,
    ) -> Result<PortfolioSummary>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ValuationResult>>,
    {
        if !force_fresh {
            if let Some(summary) = self.peek_fresh(&fingerprint) {
                debug!("Summary cache hit");
                return Ok(summary);
            }
        }

        let _flight = self.flight.lock().await;
        // A recomputation we queued behind may have already satisfied us.
        if !force_fresh {
            if let Some(summary) = self.peek_fresh(&fingerprint) {
                debug!("Adopted summary from in-flight recomputation");
                return Ok(summary);
            }
        }

        match compute().await {
            Ok(metrics) => {
                let summary = PortfolioSummary {
                    metrics,
                    fingerprint,
                    computed_at: Utc::now(),
                };
                *self.current.lock().unwrap() = Some(summary.clone());
                self.persist(&summary);
                Ok(summary)
            }
            Err(e) => {
                let prior = self.current.lock().unwrap().clone();
                match prior {
                    Some(stale) => {
                        warn!(error = %e, "Summary recomputation failed, serving stale summary");
                        Ok(stale)
                    }
                    None => Err(e).context("Summary recomputation failed with no prior summary"),
                }
            }
        }
    }

    /// Drops the cached summary; the next read recomputes. The transaction
    /// store collaborator calls this after every write.
    pub fn invalidate(&self) {
        debug!("Summary cache invalidated");
        *self.current.lock().unwrap() = None;
    }

    fn persist(&self, summary: &PortfolioSummary) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let result: Result<()> = (|| {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(summary)?)?;
            Ok(())
        })();
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to persist summary");
        }
    }

    /// Periodically refreshes through the same single-flight `get` path so
    /// interactive reads rarely observe a cold cache.
    pub fn spawn_background_refresh<C, CFut, P, PFut>(
        self: Arc<Self>,
        compute: C,
        fingerprint: P,
        interval: std::time::Duration,
    ) -> JoinHandle<()>
    where
        C: Fn() -> CFut + Send + Sync + 'static,
        CFut: Future<Output = Result<ValuationResult>> + Send,
        P: Fn() -> PFut + Send + Sync + 'static,
        PFut: Future<Output = Result<LogFingerprint>> + Send,
    {
        let cache = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let current = match fingerprint().await {
                    Ok(fp) => fp,
                    Err(e) => {
                        warn!(error = %e, "Background refresh could not fingerprint the log");
                        continue;
                    }
                };
                if let Err(e) = cache.get(&compute, false, current).await {
                    warn!(error = %e, "Background summary refresh failed");
                }
            }
        })
    }
}
