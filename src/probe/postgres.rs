/// PostgreSQL active-session probe
///
/// A single fixed query against pg_stat_activity; no version branching.
/// Counts active client backends, excluding the probing connection itself.
/// Background workers, autovacuum, and replication walsenders report other
/// backend types and are not counted.
pub const ACTIVE_SESSION_COUNT_QUERY: &str = "SELECT count(*) FROM pg_stat_activity \
     WHERE state = 'active' \
     AND backend_type = 'client backend' \
     AND pid != pg_backend_pid()";
