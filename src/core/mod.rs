/// Core abstractions shared by the probe, estimator, and guard layers

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error reported by a connection implementation
///
/// Driver-level failures (IO errors, permission errors, statement timeouts)
/// are flattened into a message here; classification into fail-safe fallbacks
/// happens in the estimator, not at this seam.
#[derive(Debug, Clone, Error)]
#[error("connection error: {0}")]
pub struct ConnectionError(String);

impl ConnectionError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }
}

/// A live connection to a database, supplied by the host's pool or driver
///
/// This is the narrow interface the guard consumes: enough to identify the
/// engine, run the session-count query, and (for the MySQL family) fetch the
/// server version string.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The engine name as reported by the driver (e.g. "PostgreSQL", "Mysql2")
    fn engine_name(&self) -> &str;

    /// Run a query returning a single scalar value
    ///
    /// The statement timeout is a hint for the driver; the guard additionally
    /// bounds the call on its own side.
    async fn query_scalar(
        &self,
        sql: &str,
        statement_timeout: Duration,
    ) -> Result<i64, ConnectionError>;

    /// Run `SELECT VERSION()` and return the raw version string
    async fn server_version(&self) -> Result<String, ConnectionError>;
}

/// Supplies live connections for named logical databases
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Acquire a connection for the given logical database
    async fn acquire(&self, name: &str) -> Result<Arc<dyn Connection>, ConnectionError>;
}

/// Identifies a logical database to probe
///
/// The name is the stable identity used for cache keys and configuration
/// lookup; the connection is a live handle for this call only. Targets are
/// constructed per call and never cached.
#[derive(Clone)]
pub struct DatabaseTarget {
    name: String,
    connection: Arc<dyn Connection>,
}

impl DatabaseTarget {
    pub fn new<S: Into<String>>(name: S, connection: Arc<dyn Connection>) -> Self {
        Self {
            name: name.into(),
            connection,
        }
    }

    /// Build a target by acquiring a connection from a provider
    pub async fn acquire(
        provider: &dyn ConnectionProvider,
        name: &str,
    ) -> Result<Self, ConnectionError> {
        let connection = provider.acquire(name).await?;
        Ok(Self::new(name, connection))
    }

    /// The logical database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The live connection handle
    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }
}

impl std::fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseTarget")
            .field("name", &self.name)
            .field("engine", &self.connection.engine_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticConnection {
        engine: &'static str,
    }

    #[async_trait]
    impl Connection for StaticConnection {
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
            Ok("8.0.30".to_string())
        }
    }

    struct StaticProvider {
        connections: HashMap<String, Arc<dyn Connection>>,
    }

    #[async_trait]
    impl ConnectionProvider for StaticProvider {
        async fn acquire(&self, name: &str) -> Result<Arc<dyn Connection>, ConnectionError> {
            self.connections
                .get(name)
                .cloned()
                .ok_or_else(|| ConnectionError::new(format!("unknown database: {}", name)))
        }
    }

    #[test]
    fn test_target_identity() {
        let conn: Arc<dyn Connection> = Arc::new(StaticConnection {
            engine: "PostgreSQL",
        });
        let target = DatabaseTarget::new("primary", conn);
        assert_eq!(target.name(), "primary");
        assert_eq!(target.connection().engine_name(), "PostgreSQL");
    }

    #[tokio::test]
    async fn test_target_acquired_from_provider() {
        let mut connections: HashMap<String, Arc<dyn Connection>> = HashMap::new();
        connections.insert(
            "replica".to_string(),
            Arc::new(StaticConnection { engine: "Mysql2" }),
        );
        let provider = StaticProvider { connections };

        let target = DatabaseTarget::acquire(&provider, "replica").await.unwrap();
        assert_eq!(target.name(), "replica");
        assert_eq!(target.connection().engine_name(), "Mysql2");

        let missing = DatabaseTarget::acquire(&provider, "analytics").await;
        assert!(missing.is_err());
    }
}
