//! Response cache wrapper (spec.md §4.3).
//!
//! Wraps any [`Service`] and memoizes non-error results on disk, keyed by a
//! stable fingerprint of `(service, tool, params)`. Writes are
//! temp-file-then-rename within the service's subdirectory, the same
//! crash-safe pattern used for report and scheduler-state files (spec.md §9
//! "Atomic file writes").

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use burrow_core::traits::{Service, ServiceError};
use burrow_core::{CancellationToken, FetchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// On-disk representation of a cached entry (spec.md §6 "Cache file
/// layout"). Field order and names are part of the persisted format.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    service: String,
    tool: String,
    data: String,
    stored_at: i64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    context_label: Option<String>,
}

/// Computes a stable fingerprint for `(service, tool, params)` in canonical
/// (sorted-key) form, so it is stable across processes (spec.md §3).
#[must_use]
pub fn fingerprint(service: &str, tool: &str, params: &BTreeMap<String, String>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(service.as_bytes());
    hasher.update(b"\0");
    hasher.update(tool.as_bytes());
    for (k, v) in params {
        hasher.update(b"\0");
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Wraps any [`Service`] with a file-per-entry response cache.
pub struct CachingService {
    inner: std::sync::Arc<dyn Service>,
    cache_root: PathBuf,
    ttl: Duration,
}

impl CachingService {
    #[must_use]
    pub fn new(inner: std::sync::Arc<dyn Service>, cache_root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            inner,
            cache_root: cache_root.into(),
            ttl,
        }
    }

    fn entry_path(&self, tool: &str, params: &BTreeMap<String, String>) -> PathBuf {
        let fp = fingerprint(self.inner.name(), tool, params);
        self.cache_root.join(self.inner.name()).join(format!("{fp}.json"))
    }

    /// Reads the cache entry at `path`, treating any form of corruption or
    /// staleness as a miss rather than an error (spec.md §4.3, §7).
    fn read_fresh(&self, path: &Path) -> Option<CacheEntry> {
        let raw = std::fs::read_to_string(path).ok()?;
        let entry: CacheEntry = serde_json::from_str(&raw).ok()?;
        if is_expired(entry.stored_at, self.ttl.as_secs() as i64, now_unix()) {
            return None;
        }
        Some(entry)
    }

    fn write_entry(&self, path: &Path, entry: &CacheEntry) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        let body = serde_json::to_vec(entry).expect("CacheEntry serializes infallibly");
        temp.write_all(&body)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// An entry is expired once its age reaches `ttl_secs`.
fn is_expired(stored_at: i64, ttl_secs: i64, now: i64) -> bool {
    match now.checked_sub(stored_at) {
        Some(age) => age >= ttl_secs,
        None => true,
    }
}

#[async_trait]
impl Service for CachingService {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(
        &self,
        ctx: &CancellationToken,
        tool: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<FetchResult, ServiceError> {
        let path = self.entry_path(tool, params);

        if let Some(entry) = self.read_fresh(&path) {
            debug!(service = self.name(), tool, "cache hit");
            let timestamp = DateTime::<Utc>::from(
                UNIX_EPOCH + Duration::from_secs(entry.stored_at.max(0) as u64),
            );
            return Ok(FetchResult {
                service: entry.service,
                tool: entry.tool,
                data: entry.data.into_bytes(),
                url: entry.url,
                timestamp,
                error: String::new(),
                context_label: entry.context_label,
            });
        }

        debug!(service = self.name(), tool, "cache miss");
        let result = self.inner.execute(ctx, tool, params).await?;

        if !result.is_failure() {
            let entry = CacheEntry {
                service: result.service.clone(),
                tool: result.tool.clone(),
                data: String::from_utf8_lossy(&result.data).into_owned(),
                stored_at: now_unix(),
                url: result.url.clone(),
                context_label: result.context_label.clone(),
            };
            if let Err(e) = self.write_entry(&path, &entry) {
                debug!(service = self.name(), tool, error = %e, "failed to persist cache entry");
            }
        }

        Ok(result)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// An entry is fresh for every age strictly under the TTL and expired
        /// at or beyond it, for any stored/now pair with a non-negative age
        /// (spec.md §8: TTL-boundary cache expiry).
        #[test]
        fn expiry_flips_exactly_at_the_ttl_boundary(stored_at in 0i64..1_000_000, ttl_secs in 1i64..100_000, drift in 0i64..200_000) {
            let now = stored_at + drift;
            let age = now - stored_at;
            prop_assert_eq!(is_expired(stored_at, ttl_secs, now), age >= ttl_secs);
        }
    }
}
