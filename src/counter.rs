/// Session counting against a live connection

use crate::core::Connection;
use crate::error::{GuardError, GuardResult};
use crate::probe::EngineProbe;
use std::time::Duration;
use tokio::time::timeout;

/// Executes a probe's query and returns the raw active-session count
///
/// The timeout is passed to the connection as the statement timeout and also
/// enforced here with `tokio::time::timeout`; the driver owns real
/// cancellation, this side just refuses to wait longer. Failures are not
/// absorbed at this layer, they propagate to the estimator which applies the
/// fail-safe policy.
#[derive(Debug)]
pub struct SessionCounter {
    query_timeout: Duration,
}

impl SessionCounter {
    /// Default bound on the session-count query
    pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            query_timeout: Self::DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    /// The configured query timeout
    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Count currently-active sessions using the given probe's query
    pub async fn count(
        &self,
        connection: &dyn Connection,
        probe: &EngineProbe,
    ) -> GuardResult<u64> {
        let query = probe.session_count_query();

        let scalar = match timeout(
            self.query_timeout,
            connection.query_scalar(query, self.query_timeout),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(GuardError::timeout("active session count query"));
            }
        };

        if scalar < 0 {
            return Err(GuardError::probe(format!(
                "negative session count: {}",
                scalar
            )));
        }

        tracing::debug!(sessions = scalar, engine = probe.engine_tag(), "counted active sessions");
        Ok(scalar as u64)
    }
}

impl Default for SessionCounter {
    fn default() -> Self {
        Self::new()
    }
}
