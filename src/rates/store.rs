//! Durable holder of the canonical rate snapshot.

use crate::rates::snapshot::{PartialRates, RateSnapshot};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Single source of truth for "what do we currently believe the rates are".
/// Readers always get the best available snapshot without blocking on
/// writers; writers publish a whole new snapshot atomically.
pub struct RateStore {
    inner: RwLock<Inner>,
    path: Option<PathBuf>,
}

struct Inner {
    snapshot: Arc<RateSnapshot>,
    /// Bumped on every successful merge; lets concurrent fetches detect
    /// that an in-flight refresh already landed.
    generation: u64,
}

impl RateStore {
    /// Opens the store, loading the durable document if one exists. A
    /// missing or unparsable file yields an empty snapshot, never an error.
    pub fn open(path: Option<PathBuf>) -> Self {
        let snapshot = path.as_deref().map_or_else(RateSnapshot::empty, |p| {
            match fs::read_to_string(p) {
                Ok(raw) => RateSnapshot::from_json(&raw).unwrap_or_else(|e| {
                    warn!(path = %p.display(), error = %e, "Ignoring unreadable snapshot file");
                    RateSnapshot::empty()
                }),
                Err(e) => {
                    debug!(path = %p.display(), error = %e, "No snapshot file, starting empty");
                    RateSnapshot::empty()
                }
            }
        });

        RateStore {
            inner: RwLock::new(Inner {
                snapshot: Arc::new(snapshot),
                generation: 0,
            }),
            path,
        }
    }

    /// Returns the latest snapshot and its age. Never blocks on outbound
    /// I/O; a stale snapshot is returned as-is.
    pub fn get(&self) -> (Arc<RateSnapshot>, Duration) {
        let inner = self.inner.read().unwrap();
        let age = Utc::now() - inner.snapshot.timestamp;
        (Arc::clone(&inner.snapshot), age)
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().unwrap().generation
    }

    /// Merges `partial` into the current snapshot and publishes the result.
    /// An empty fragment leaves the store completely untouched. Persistence
    /// is best-effort: a write failure is logged, never propagated.
    pub fn update(&self, partial: &PartialRates) {
        if partial.is_empty() {
            debug!("Skipping merge of empty rate fragment");
            return;
        }

        let merged = {
            let mut inner = self.inner.write().unwrap();
            let merged = Arc::new(inner.snapshot.merged(partial));
            inner.snapshot = Arc::clone(&merged);
            inner.generation += 1;
            merged
        };

        if let Err(e) = self.save(&merged) {
            warn!(error = %e, "Failed to persist rate snapshot");
        }
    }

    fn save(&self, snapshot: &RateSnapshot) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        // Write-then-rename so readers of the file never see a torn document.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, snapshot.to_json()?)
            .with_context(|| format!("Failed to write snapshot file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace snapshot file: {}", path.display()))?;
        debug!(path = %path.display(), "Persisted rate snapshot");
        Ok(())
    }
}
