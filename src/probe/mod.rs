/// Engine probes for PostgreSQL and the MySQL family
pub mod mysql;
pub mod postgres;

use crate::core::Connection;
use crate::error::{GuardError, GuardResult};

/// Engine-specific probe producing the active-session count query
///
/// The set of engines is closed and versioned, so dispatch is an exhaustive
/// match rather than an open trait. MariaDB and pre-8.0.22 MySQL both map to
/// the information-schema variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineProbe {
    Postgres,
    MysqlPerformanceSchema,
    MysqlInformationSchema,
}

impl EngineProbe {
    /// Stable tag identifying the engine family
    pub fn engine_tag(&self) -> &'static str {
        match self {
            EngineProbe::Postgres => "postgresql",
            EngineProbe::MysqlPerformanceSchema => "mysql",
            EngineProbe::MysqlInformationSchema => "mysql",
        }
    }

    /// SQL counting currently-active, non-idle sessions
    ///
    /// Each query excludes the probing connection itself and known
    /// housekeeping users.
    pub fn session_count_query(&self) -> &'static str {
        match self {
            EngineProbe::Postgres => postgres::ACTIVE_SESSION_COUNT_QUERY,
            EngineProbe::MysqlPerformanceSchema => mysql::PERFORMANCE_SCHEMA_QUERY,
            EngineProbe::MysqlInformationSchema => mysql::INFORMATION_SCHEMA_QUERY,
        }
    }
}

/// Resolve the probe for a live connection
///
/// The variant is re-derived on every probe rather than cached; a proxy
/// could change backend over a connection's life. An engine name matching
/// none of the known probes is an unsupported-engine error, never silently
/// defaulted. A failing or unparseable version query on a MySQL-family
/// engine is a probe error instead, so the caller's fail-safe policy applies.
pub async fn resolve_probe(connection: &dyn Connection) -> GuardResult<EngineProbe> {
    let engine = connection.engine_name();
    let normalized = engine.to_ascii_lowercase();

    if normalized.contains("postgresql") {
        tracing::debug!("resolved postgresql probe");
        return Ok(EngineProbe::Postgres);
    }

    if normalized.contains("mysql") {
        let version = connection.server_version().await?;
        let probe = mysql::select_probe(&version)?;
        tracing::debug!(version = %version, ?probe, "resolved mysql-family probe");
        return Ok(probe);
    }

    Err(GuardError::unsupported_engine(engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConnectionError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FakeConnection {
        engine: &'static str,
        version: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        fn engine_name(&self) -> &str {
            self.engine
        }

        async fn query_scalar(
            &self,
            _sql: &str,
            _statement_timeout: Duration,
        ) -> Result<i64, ConnectionError> {
            Ok(0)
        }

        async fn server_version(&self) -> Result<String, ConnectionError> {
            self.version
                .map(|v| v.to_string())
                .map_err(ConnectionError::new)
        }
    }

    #[tokio::test]
    async fn test_postgresql_resolves_without_version_query() {
        let conn = FakeConnection {
            engine: "PostgreSQL",
            version: Err("version query must not run for postgresql"),
        };
        let probe = resolve_probe(&conn).await.unwrap();
        assert_eq!(probe, EngineProbe::Postgres);
        assert_eq!(probe.engine_tag(), "postgresql");
    }

    #[tokio::test]
    async fn test_mysql_resolves_through_version() {
        let conn = FakeConnection {
            engine: "Mysql2",
            version: Ok("8.0.30"),
        };
        let probe = resolve_probe(&conn).await.unwrap();
        assert_eq!(probe, EngineProbe::MysqlPerformanceSchema);
        assert_eq!(probe.engine_tag(), "mysql");
    }

    #[tokio::test]
    async fn test_unknown_engine_fails_fast() {
        let conn = FakeConnection {
            engine: "SQLite",
            version: Ok("3.45.0"),
        };
        let err = resolve_probe(&conn).await.unwrap_err();
        assert!(matches!(err, GuardError::UnsupportedEngine { .. }));
        assert_eq!(err.to_string(), "Unsupported database engine: SQLite");
    }

    #[tokio::test]
    async fn test_failed_version_query_is_probe_error() {
        let conn = FakeConnection {
            engine: "Mysql2",
            version: Err("server has gone away"),
        };
        let err = resolve_probe(&conn).await.unwrap_err();
        assert!(matches!(err, GuardError::Probe { .. }));
    }
}
