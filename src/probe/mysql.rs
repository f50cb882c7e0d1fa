/// MySQL-family active-session probes
///
/// MySQL 8.0.22 moved processlist data into performance_schema, which is
/// cheaper to read and reports the same session state. Older MySQL and all
/// MariaDB servers are probed through information_schema; MariaDB reports a
/// performance_schema table but never populates true session state in it.

use crate::error::{GuardError, GuardResult};
use crate::probe::EngineProbe;

/// First MySQL version probed through performance_schema
pub const PERFORMANCE_SCHEMA_MIN_VERSION: &str = "8.0.22";

/// Active-session count query for MySQL >= 8.0.22
pub const PERFORMANCE_SCHEMA_QUERY: &str = "SELECT COUNT(*) FROM performance_schema.processlist \
     WHERE COMMAND != 'Sleep' \
     AND ID != CONNECTION_ID() \
     AND USER NOT IN ('event_scheduler', 'system user')";

/// Active-session count query for older MySQL and MariaDB
///
/// Replication binlog-dump sessions show up in information_schema and are
/// excluded here; they are not visible the same way in performance_schema.
pub const INFORMATION_SCHEMA_QUERY: &str = "SELECT COUNT(*) FROM information_schema.processlist \
     WHERE Command != 'Sleep' \
     AND ID != CONNECTION_ID() \
     AND User NOT IN ('event_scheduler', 'system user') \
     AND Command NOT IN ('Binlog Dump', 'Binlog Dump GTID')";

/// Parsed server version, ordered numerically per dotted component
///
/// Comparison is lexicographic over the components, so "8.0" sorts below
/// "8.0.22" and "10.5.12" above both.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion(Vec<u64>);

impl ServerVersion {
    /// Parse the numeric prefix of a reported version string
    ///
    /// Build metadata after the first `-` (e.g. "-MariaDB", "-log") is
    /// ignored.
    pub fn parse(raw: &str) -> GuardResult<Self> {
        let numeric = raw.split('-').next().unwrap_or(raw).trim();

        let components = numeric
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| GuardError::probe(format!("unparseable server version: {}", raw)))?;

        Ok(Self(components))
    }
}

fn performance_schema_min_version() -> ServerVersion {
    ServerVersion(vec![8, 0, 22])
}

fn is_mariadb(version: &str) -> bool {
    version.to_ascii_lowercase().contains("mariadb")
}

/// Select the probe for a MySQL-family server from its version string
pub fn select_probe(version: &str) -> GuardResult<EngineProbe> {
    if is_mariadb(version) {
        return Ok(EngineProbe::MysqlInformationSchema);
    }

    if ServerVersion::parse(version)? >= performance_schema_min_version() {
        Ok(EngineProbe::MysqlPerformanceSchema)
    } else {
        Ok(EngineProbe::MysqlInformationSchema)
    }
}
