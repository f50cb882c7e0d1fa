/// Load estimation with read-through caching and fail-safe fallbacks

use crate::config::{Configuration, ResolvedConfig};
use crate::core::DatabaseTarget;
use crate::counter::SessionCounter;
use crate::error::{GuardError, GuardResult};
use crate::probe;
use std::time::Duration;

/// Load reported when the cache layer fails
///
/// A broken cache must never itself cause shedding, so the database is
/// assumed healthy.
pub const CACHE_FAILURE_FALLBACK: f64 = 0.0;

/// Load reported when probing fails
///
/// An unreachable or misbehaving database biases toward caution: it is
/// assumed to be at capacity.
pub const PROBE_FAILURE_FALLBACK: f64 = 1.0;

const CACHE_NAMESPACE: &str = "loadguard";

/// Computes the normalized load fraction for a database
///
/// Reads through the configured cache; on a miss it resolves the engine
/// probe, counts active sessions, normalizes by capacity units, and writes
/// the sample back with the configured TTL. The two failure domains (cache,
/// probing) each fall back independently and never mix: a failed probe is
/// not written to cache, so the next call retries instead of serving a
/// false fully-loaded sample for a whole TTL.
#[derive(Debug)]
pub struct LoadEstimator {
    counter: SessionCounter,
}

impl LoadEstimator {
    pub fn new() -> Self {
        Self {
            counter: SessionCounter::new(),
        }
    }

    pub fn with_counter(counter: SessionCounter) -> Self {
        Self { counter }
    }

    /// Cache key for a logical database's load sample
    ///
    /// Derived solely from the logical name, so every connection to the same
    /// database shares one cached sample.
    pub fn cache_key(database_name: &str) -> String {
        format!("{}:load_pct:{}", CACHE_NAMESPACE, database_name)
    }

    /// Current load fraction for the target database
    ///
    /// Only an unsupported engine surfaces as an error; cache and probing
    /// failures are absorbed into their fallback values.
    pub async fn load_fraction(
        &self,
        config: &Configuration,
        target: &DatabaseTarget,
    ) -> GuardResult<f64> {
        let key = Self::cache_key(target.name());

        let cache = match config.cache() {
            Some(cache) => cache,
            None => {
                tracing::warn!(database = target.name(), "no cache configured, assuming idle");
                return Ok(CACHE_FAILURE_FALLBACK);
            }
        };

        match cache.read(&key).await {
            Ok(Some(cached)) => {
                tracing::debug!(database = target.name(), load = cached, "load sample cache hit");
                return Ok(cached);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    database = target.name(),
                    error = %err,
                    "cache read failed, assuming idle"
                );
                return Ok(CACHE_FAILURE_FALLBACK);
            }
        }

        let resolved = config.for_target(target.name());

        let load = match self.probe_load(&resolved, target).await {
            Ok(load) => load,
            Err(GuardError::UnsupportedEngine { engine }) => {
                return Err(GuardError::UnsupportedEngine { engine });
            }
            Err(err) => {
                // Nothing is cached here; the next call retries the probe.
                tracing::warn!(
                    database = target.name(),
                    error = %err,
                    "probe failed, assuming fully loaded"
                );
                return Ok(PROBE_FAILURE_FALLBACK);
            }
        };

        let ttl = Duration::from_secs(resolved.cache_ttl_secs);
        if let Err(err) = cache.write(&key, load, ttl).await {
            tracing::warn!(
                database = target.name(),
                error = %err,
                "cache write failed, assuming idle"
            );
            return Ok(CACHE_FAILURE_FALLBACK);
        }

        tracing::debug!(database = target.name(), load, "load sample refreshed");
        Ok(load)
    }

    async fn probe_load(
        &self,
        resolved: &ResolvedConfig,
        target: &DatabaseTarget,
    ) -> GuardResult<f64> {
        let probe = probe::resolve_probe(target.connection()).await?;
        let sessions = self.counter.count(target.connection(), &probe).await?;

        let capacity = resolved
            .capacity_units
            .ok_or_else(|| GuardError::probe("capacity_units not configured"))?;

        Ok(sessions as f64 / f64::from(capacity))
    }
}

impl Default for LoadEstimator {
    fn default() -> Self {
        Self::new()
    }
}
