//! `SQLite` schema definitions for musterpoint.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the roster table.
///
/// `position` preserves import order.
pub const CREATE_ROSTER_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS roster (
    id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    company TEXT NOT NULL,
    person_type TEXT NOT NULL,
    last_known_zone TEXT NOT NULL,
    status TEXT NOT NULL,
    phone_number TEXT,
    host_name TEXT,
    badge_number TEXT
)
";

/// SQL statement to create the zone summary table.
pub const CREATE_ZONES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS zones (
    id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    muster_point TEXT NOT NULL,
    capacity INTEGER NOT NULL,
    current_count INTEGER NOT NULL,
    safe_count INTEGER NOT NULL,
    missing_count INTEGER NOT NULL
)
";

/// SQL statement to create the session history table.
pub const CREATE_SESSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    start_time TEXT NOT NULL,
    end_time TEXT,
    session_type TEXT NOT NULL,
    activated_by TEXT NOT NULL,
    status TEXT NOT NULL,
    total_people INTEGER NOT NULL,
    safe_people INTEGER NOT NULL,
    missing_people INTEGER NOT NULL
)
";

/// SQL statement to create an index on `start_time` for latest-session lookups.
pub const CREATE_SESSION_START_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_sessions_start_time ON sessions(start_time DESC)
";

/// SQL statement to create an index on `last_known_zone` for zone queries.
///
/// Added by schema version 2.
pub const CREATE_ROSTER_ZONE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_roster_zone ON roster(last_known_zone)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_ROSTER_TABLE,
    CREATE_ZONES_TABLE,
    CREATE_SESSIONS_TABLE,
    CREATE_SESSION_START_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_roster_table_contains_required_columns() {
        assert!(CREATE_ROSTER_TABLE.contains("id TEXT PRIMARY KEY"));
        assert!(CREATE_ROSTER_TABLE.contains("last_known_zone TEXT NOT NULL"));
        assert!(CREATE_ROSTER_TABLE.contains("status TEXT NOT NULL"));
    }

    #[test]
    fn test_sessions_table_allows_open_end_time() {
        assert!(CREATE_SESSIONS_TABLE.contains("end_time TEXT,"));
        assert!(CREATE_SESSIONS_TABLE.contains("start_time TEXT NOT NULL"));
    }
}
