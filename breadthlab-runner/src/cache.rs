//! Rerun memoization for daily breadth computations.
//!
//! A rerun shortly after a completed run reuses the computed record instead
//! of hitting the price source again. Entries are JSON files keyed by a
//! content hash of the price source, instrument list and engine settings; freshness is judged
//! against a `now` the caller supplies, so nothing here reads the clock.

use anyhow::{Context, Result};
use breadthlab_core::{DailyBreadthRecord, EngineConfig};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Content hash identifying one (price source, instrument list, engine settings) request.
pub type CacheKey = String;

/// Hash of everything that shapes a computed record: the price source, the
/// identifier list in the given order, the lookback and the flat threshold.
pub fn cache_key<S: AsRef<str>>(provider: &str, identifiers: &[S], engine: &EngineConfig) -> CacheKey {
    let mut hasher = blake3::Hasher::new();
    let mut field = |bytes: &[u8]| {
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    };
    field(provider.as_bytes());
    field(&engine.lookback.as_days().to_le_bytes());
    field(&engine.flat_epsilon.to_bits().to_le_bytes());
    for id in identifiers {
        field(id.as_ref().as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// A memoized computation and when it was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRun {
    pub key: CacheKey,
    pub computed_at: DateTime<Utc>,
    pub record: DailyBreadthRecord,
}

#[derive(Debug, Clone)]
pub struct RunCache {
    cache_dir: PathBuf,
    ttl: Duration,
}

impl RunCache {
    /// Creates a cache in `cache_dir`, creating the directory if needed.
    pub fn new(cache_dir: impl AsRef<Path>, ttl_secs: u64) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir).with_context(|| {
            format!("Failed to create cache directory {}", cache_dir.display())
        })?;

        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .context("cache ttl_secs out of range")?;

        Ok(Self { cache_dir, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether an entry made at `computed_at` is still usable at `now`.
    ///
    /// An entry stamped in the future (clock moved backwards) is stale.
    pub fn is_fresh(&self, computed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age = now - computed_at;
        age >= Duration::zero() && age < self.ttl
    }

    /// Returns the cached record for `key` if present and fresh at `now`.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<DailyBreadthRecord>> {
        let path = self.entry_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path).context("Failed to read cached run")?;

        let entry: CachedRun =
            serde_json::from_str(&json).context("Failed to deserialize cached run")?;

        if entry.key != key || !self.is_fresh(entry.computed_at, now) {
            tracing::debug!(key, computed_at = %entry.computed_at, "cached run is stale");
            return Ok(None);
        }

        Ok(Some(entry.record))
    }

    /// Stores `record` under `key`, stamped with `now`.
    pub fn put(&self, key: &str, record: &DailyBreadthRecord, now: DateTime<Utc>) -> Result<()> {
        let entry = CachedRun {
            key: key.to_string(),
            computed_at: now,
            record: record.clone(),
        };

        let json = serde_json::to_string_pretty(&entry).context("Failed to serialize cached run")?;

        std::fs::write(self.entry_path(key), json).context("Failed to write cached run")?;

        Ok(())
    }

    /// Removes every cached run.
    pub fn clear(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();

            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                std::fs::remove_file(path)?;
            }
        }

        Ok(())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }
}
