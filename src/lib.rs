pub mod cache;
pub mod config;
/// loadguard - Load-shedding guard for relational databases
///
/// The guard estimates how busy a database is from its active-session count,
/// normalizes that count into a load fraction, and lets callers skip risky
/// operations when the database is judged overloaded.
///
/// Two seams connect it to the host application:
/// 1. `Connection` / `ConnectionProvider`: a narrow view of the pool or driver
/// 2. `Cache`: a TTL key/value store shared by all callers probing one database
pub mod core;
pub mod counter;
pub mod error;
pub mod estimator;
pub mod probe;

pub use crate::cache::{Cache, CacheError, MemoryCache};
pub use crate::config::{ConfigError, Configuration, ResolvedConfig, TargetOverride, Tunables};
pub use crate::core::{Connection, ConnectionError, ConnectionProvider, DatabaseTarget};
pub use crate::counter::SessionCounter;
pub use crate::error::{ErrorSeverity, GuardError, GuardResult};
pub use crate::estimator::LoadEstimator;
pub use crate::probe::EngineProbe;

/// Main guard instance
///
/// Owns a validated configuration and the load estimator. Intended lifecycle
/// is construct-configure-use-discard: production wiring builds one long-lived
/// guard at startup, tests build a fresh one per case.
#[derive(Debug)]
pub struct LoadGuard {
    config: Configuration,
    estimator: LoadEstimator,
}

impl LoadGuard {
    /// Build a guard from a configuration mutator and validate it
    ///
    /// This is the startup boundary: a validation failure here should halt
    /// startup rather than be retried.
    pub fn configure<F>(mutator: F) -> GuardResult<Self>
    where
        F: FnOnce(&mut Configuration),
    {
        let mut config = Configuration::new();
        mutator(&mut config);
        config.validate()?;

        Ok(Self {
            config,
            estimator: LoadEstimator::new(),
        })
    }

    /// Wrap an existing configuration without validating it
    ///
    /// The per-request path tolerates an unvalidated configuration through
    /// the estimator's fallbacks; prefer `configure` in real wiring.
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            estimator: LoadEstimator::new(),
        }
    }

    /// The current configuration
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Mutate and re-validate the configuration of a live guard
    pub fn reconfigure<F>(&mut self, mutator: F) -> GuardResult<()>
    where
        F: FnOnce(&mut Configuration),
    {
        mutator(&mut self.config);
        self.config.validate()?;
        Ok(())
    }

    /// Current load fraction for the target database
    ///
    /// Active sessions divided by capacity units; can exceed 1.0 under
    /// overload. Served from cache when a fresh sample exists.
    pub async fn load_fraction(&self, target: &DatabaseTarget) -> GuardResult<f64> {
        self.estimator.load_fraction(&self.config, target).await
    }

    /// Whether the target database is at or below its configured threshold
    pub async fn is_healthy(&self, target: &DatabaseTarget) -> GuardResult<bool> {
        let load = self.load_fraction(target).await?;
        let threshold = self.config.for_target(target.name()).threshold;
        Ok(load <= threshold)
    }

    /// Run `block` unless the target database is over its configured threshold
    ///
    /// Returns the block's result when healthy; fails with
    /// `GuardError::Overloaded` otherwise, without running the block.
    pub async fn shed<T, F>(&self, target: &DatabaseTarget, block: F) -> GuardResult<T>
    where
        F: FnOnce() -> T,
    {
        let threshold = self.config.for_target(target.name()).threshold;
        self.shed_at_threshold(target, threshold, block).await
    }

    /// Run `block` unless the current load exceeds a caller-supplied fraction
    ///
    /// The boundary is inclusive: the block runs when load equals `pct`.
    pub async fn shed_at_threshold<T, F>(
        &self,
        target: &DatabaseTarget,
        pct: f64,
        block: F,
    ) -> GuardResult<T>
    where
        F: FnOnce() -> T,
    {
        let load = self.load_fraction(target).await?;
        if load > pct {
            tracing::debug!(
                database = target.name(),
                load,
                threshold = pct,
                "shedding guarded operation"
            );
            return Err(GuardError::overloaded(load));
        }

        Ok(block())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct FakeConnection {
        engine: &'static str,
        version: &'static str,
        sessions: i64,
        last_query: Mutex<Option<String>>,
        queries: AtomicUsize,
    }

    impl FakeConnection {
        fn new(engine: &'static str, version: &'static str, sessions: i64) -> Arc<Self> {
            Arc::new(Self {
                engine,
                version,
                sessions,
                last_query: Mutex::new(None),
                queries: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Connection for FakeConnection {
        fn engine_name(&self) -> &str {
            self.engine
        }

        async fn query_scalar(
            &self,
            sql: &str,
            _statement_timeout: Duration,
        ) -> Result<i64, ConnectionError> {
            *self.last_query.lock().unwrap() = Some(sql.to_string());
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.sessions)
        }

        async fn server_version(&self) -> Result<String, ConnectionError> {
            Ok(self.version.to_string())
        }
    }

    fn guard_with_capacity_16() -> LoadGuard {
        LoadGuard::configure(|config| {
            config.capacity_units = Some(16);
            config.set_cache(Arc::new(MemoryCache::new()));
        })
        .unwrap()
    }

    async fn seed_sample(guard: &LoadGuard, name: &str, load: f64) {
        let key = LoadEstimator::cache_key(name);
        guard
            .config()
            .cache()
            .unwrap()
            .write(&key, load, Duration::from_secs(60))
            .await
            .unwrap();
    }

    fn primary(conn: Arc<FakeConnection>) -> DatabaseTarget {
        DatabaseTarget::new("primary", conn)
    }

    #[test]
    fn test_configure_validates() {
        let result = LoadGuard::configure(|config| {
            config.set_cache(Arc::new(MemoryCache::new()));
        });
        assert!(matches!(result.unwrap_err(), GuardError::Config(_)));

        let result = LoadGuard::configure(|config| {
            config.capacity_units = Some(16);
        });
        assert!(matches!(result.unwrap_err(), GuardError::Config(_)));

        assert!(LoadGuard::configure(|config| {
            config.capacity_units = Some(16);
            config.set_cache(Arc::new(MemoryCache::new()));
        })
        .is_ok());
    }

    #[test]
    fn test_reconfigure_revalidates() {
        let mut guard = guard_with_capacity_16();

        let result = guard.reconfigure(|config| config.capacity_units = None);
        assert!(matches!(result.unwrap_err(), GuardError::Config(_)));

        assert!(guard
            .reconfigure(|config| config.capacity_units = Some(32))
            .is_ok());
        assert_eq!(guard.config().capacity_units, Some(32));
    }

    #[tokio::test]
    async fn test_shed_runs_block_when_healthy() {
        let guard = guard_with_capacity_16();
        seed_sample(&guard, "primary", 0.5).await;
        let conn = FakeConnection::new("PostgreSQL", "15.4", 0);

        let result = guard.shed(&primary(conn), || 42).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_shed_raises_with_rounded_percentage() {
        let guard = guard_with_capacity_16();
        seed_sample(&guard, "primary", 0.9).await;
        let conn = FakeConnection::new("PostgreSQL", "15.4", 0);

        let ran = std::cell::Cell::new(false);
        let err = guard
            .shed(&primary(conn), || ran.set(true))
            .await
            .unwrap_err();

        assert!(!ran.get());
        assert!(matches!(err, GuardError::Overloaded { load_pct: 90 }));
        assert!(err.to_string().contains("90"));
    }

    #[tokio::test]
    async fn test_shed_at_threshold_boundary_is_inclusive() {
        let guard = guard_with_capacity_16();
        seed_sample(&guard, "primary", 0.5).await;

        let conn = FakeConnection::new("PostgreSQL", "15.4", 0);
        let result = guard
            .shed_at_threshold(&primary(conn), 0.5, || "ran")
            .await
            .unwrap();
        assert_eq!(result, "ran");
    }

    #[tokio::test]
    async fn test_shed_at_threshold_raises_above_pct() {
        let guard = guard_with_capacity_16();
        seed_sample(&guard, "primary", 0.6).await;

        let conn = FakeConnection::new("PostgreSQL", "15.4", 0);
        let err = guard
            .shed_at_threshold(&primary(conn), 0.5, || "ran")
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Overloaded { load_pct: 60 }));
    }

    #[tokio::test]
    async fn test_is_healthy_boundary_is_inclusive() {
        let guard = guard_with_capacity_16();

        seed_sample(&guard, "primary", 0.75).await;
        let conn = FakeConnection::new("PostgreSQL", "15.4", 0);
        assert!(guard.is_healthy(&primary(conn)).await.unwrap());

        let guard = guard_with_capacity_16();
        seed_sample(&guard, "primary", 0.76).await;
        let conn = FakeConnection::new("PostgreSQL", "15.4", 0);
        assert!(!guard.is_healthy(&primary(conn)).await.unwrap());
    }

    #[tokio::test]
    async fn test_override_threshold_applies_to_guard_decisions() {
        let guard = LoadGuard::configure(|config| {
            config.capacity_units = Some(16);
            config.set_cache(Arc::new(MemoryCache::new()));
            config.override_for("replica", |target| {
                target.threshold = Some(0.5);
            });
        })
        .unwrap();

        seed_sample(&guard, "replica", 0.6).await;
        let conn = FakeConnection::new("PostgreSQL", "15.4", 0);
        let target = DatabaseTarget::new("replica", conn);

        assert!(!guard.is_healthy(&target).await.unwrap());
        assert!(guard.shed(&target, || ()).await.is_err());
    }

    #[tokio::test]
    async fn test_end_to_end_probe_on_cache_miss() {
        let guard = guard_with_capacity_16();
        let conn = FakeConnection::new("Mysql2", "8.0.30", 12);
        let target = primary(conn.clone());

        // 12 active sessions / 16 capacity units, probed via performance_schema
        let load = guard.load_fraction(&target).await.unwrap();
        assert_eq!(load, 0.75);
        assert_eq!(
            conn.last_query.lock().unwrap().as_deref(),
            Some(probe::mysql::PERFORMANCE_SCHEMA_QUERY)
        );
        assert!(guard.is_healthy(&target).await.unwrap());

        // Second read is served from cache
        let load = guard.load_fraction(&target).await.unwrap();
        assert_eq!(load, 0.75);
        assert_eq!(conn.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_legacy_mysql_uses_information_schema() {
        let guard = guard_with_capacity_16();
        let conn = FakeConnection::new("Mysql2", "5.7.35", 4);
        let target = primary(conn.clone());

        let load = guard.load_fraction(&target).await.unwrap();
        assert_eq!(load, 0.25);
        assert_eq!(
            conn.last_query.lock().unwrap().as_deref(),
            Some(probe::mysql::INFORMATION_SCHEMA_QUERY)
        );
    }

    #[tokio::test]
    async fn test_unsupported_engine_escapes_guard_protocol() {
        let guard = guard_with_capacity_16();
        let conn = FakeConnection::new("SQLite", "3.45.0", 0);
        let target = primary(conn);

        let err = guard.is_healthy(&target).await.unwrap_err();
        assert!(matches!(err, GuardError::UnsupportedEngine { .. }));
    }
}
