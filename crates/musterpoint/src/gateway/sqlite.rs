//! `SQLite`-backed persistence gateway.
//!
//! Every CLI invocation opens its own connection, so changes written by other
//! processes are detected through `PRAGMA data_version` and pushed to
//! subscribers on [`PersistenceGateway::poll`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{migrations, publish, GatewayEvent, PersistenceGateway};
use crate::error::{Error, Result};
use crate::person::{Person, PersonType, SafetyStatus};
use crate::session::{SessionRecord, SessionStatus, SessionType};
use crate::zone::Zone;

/// Metadata key holding the blake3 fingerprint of the stored roster.
const ROSTER_FINGERPRINT_KEY: &str = "roster_fingerprint";

const SESSION_COLUMNS: &str = "id, start_time, end_time, session_type, activated_by, status, \
     total_people, safe_people, missing_people";

/// A [`PersistenceGateway`] storing everything in a single `SQLite` file.
#[derive(Debug)]
pub struct SqliteGateway {
    path: PathBuf,
    conn: Connection,
    listeners: Vec<mpsc::UnboundedSender<GatewayEvent>>,
    data_version: i64,
}

impl SqliteGateway {
    /// Open or create a database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets a watching process read while another CLI invocation writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        let data_version = read_data_version(&conn)?;
        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn,
            listeners: Vec::new(),
            data_version,
        })
    }

    /// Create an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;
        let data_version = read_data_version(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
            listeners: Vec::new(),
            data_version,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let people: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM roster", [], |row| row.get(0))?;
        let sessions: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            people,
            sessions,
            db_size_bytes,
        })
    }

    fn stored_fingerprint(&self) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                [ROSTER_FINGERPRINT_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn row_to_person(row: &rusqlite::Row) -> rusqlite::Result<Person> {
        let person_type_str: String = row.get(3)?;
        let status_str: String = row.get(5)?;

        let person_type = PersonType::parse(&person_type_str).unwrap_or_else(|| {
            warn!("Unknown person type: {}, defaulting to visitor", person_type_str);
            PersonType::Visitor
        });
        let status = SafetyStatus::parse(&status_str).unwrap_or_else(|| {
            warn!("Unknown safety status: {}, defaulting to unknown", status_str);
            SafetyStatus::Unknown
        });

        Ok(Person {
            id: row.get(0)?,
            name: row.get(1)?,
            company: row.get(2)?,
            person_type,
            last_known_zone: row.get(4)?,
            status,
            phone_number: row.get(6)?,
            host_name: row.get(7)?,
            badge_number: row.get(8)?,
        })
    }

    fn row_to_zone(row: &rusqlite::Row) -> rusqlite::Result<Zone> {
        Ok(Zone {
            id: row.get(0)?,
            name: row.get(1)?,
            muster_point: row.get(2)?,
            capacity: row.get(3)?,
            current_count: from_count(row.get(4)?),
            safe_count: from_count(row.get(5)?),
            missing_count: from_count(row.get(6)?),
        })
    }

    fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<SessionRecord> {
        let start_str: String = row.get(1)?;
        let end_str: Option<String> = row.get(2)?;
        let type_str: String = row.get(3)?;
        let status_str: String = row.get(5)?;

        let session_type = SessionType::parse(&type_str).unwrap_or_else(|| {
            warn!("Unknown session type: {}, defaulting to actual", type_str);
            SessionType::Actual
        });
        let status = SessionStatus::parse(&status_str).unwrap_or_else(|| {
            warn!("Unknown session status: {}, defaulting to completed", status_str);
            SessionStatus::Completed
        });

        Ok(SessionRecord {
            id: row.get(0)?,
            start_time: parse_timestamp(&start_str),
            end_time: end_str.as_deref().map(parse_timestamp),
            session_type,
            activated_by: row.get(4)?,
            status,
            total_people: from_count(row.get(6)?),
            safe_people: from_count(row.get(7)?),
            missing_people: from_count(row.get(8)?),
        })
    }
}

impl PersistenceGateway for SqliteGateway {
    fn load_roster(&self) -> Result<Vec<Person>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, name, company, person_type, last_known_zone, status,
                   phone_number, host_name, badge_number
            FROM roster ORDER BY position ASC
            ",
        )?;

        let people = stmt
            .query_map([], Self::row_to_person)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(people)
    }

    fn save_roster(&mut self, people: &[Person]) -> Result<()> {
        let fingerprint = roster_fingerprint(people)?;
        if self.stored_fingerprint()?.as_deref() == Some(fingerprint.as_str()) {
            debug!("Roster unchanged, skipping write");
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM roster", [])?;
        {
            let mut stmt = tx.prepare(
                r"
                INSERT INTO roster (id, position, name, company, person_type, last_known_zone,
                                    status, phone_number, host_name, badge_number)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
            )?;
            for (position, person) in people.iter().enumerate() {
                stmt.execute(params![
                    person.id,
                    to_count(position),
                    person.name,
                    person.company,
                    person.person_type.as_str(),
                    person.last_known_zone,
                    person.status.as_str(),
                    person.phone_number,
                    person.host_name,
                    person.badge_number,
                ])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            (ROSTER_FINGERPRINT_KEY, fingerprint),
        )?;
        tx.commit()?;

        debug!(people = people.len(), "Roster saved");
        Ok(())
    }

    fn load_session(&self) -> Result<Option<SessionRecord>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY start_time DESC LIMIT 1");
        let session = self
            .conn
            .query_row(&sql, [], Self::row_to_session)
            .optional()?;
        Ok(session)
    }

    fn save_session(&mut self, session: &SessionRecord) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO sessions (id, start_time, end_time, session_type, activated_by, status,
                                  total_people, safe_people, missing_people)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                end_time = excluded.end_time,
                status = excluded.status,
                total_people = excluded.total_people,
                safe_people = excluded.safe_people,
                missing_people = excluded.missing_people
            ",
            params![
                session.id,
                session.start_time.to_rfc3339(),
                session.end_time.map(|t| t.to_rfc3339()),
                session.session_type.as_str(),
                session.activated_by,
                session.status.as_str(),
                to_count(session.total_people),
                to_count(session.safe_people),
                to_count(session.missing_people),
            ],
        )?;
        debug!(session_id = %session.id, status = %session.status, "Session saved");
        Ok(())
    }

    fn load_history(&self) -> Result<Vec<SessionRecord>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY start_time DESC");
        let mut stmt = self.conn.prepare(&sql)?;
        let sessions = stmt
            .query_map([], Self::row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn load_zones(&self) -> Result<Vec<Zone>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, name, muster_point, capacity, current_count, safe_count, missing_count
            FROM zones ORDER BY position ASC
            ",
        )?;
        let zones = stmt
            .query_map([], Self::row_to_zone)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(zones)
    }

    fn save_zones(&mut self, zones: &[Zone]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM zones", [])?;
        {
            let mut stmt = tx.prepare(
                r"
                INSERT INTO zones (id, position, name, muster_point, capacity,
                                   current_count, safe_count, missing_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
            )?;
            for (position, zone) in zones.iter().enumerate() {
                stmt.execute(params![
                    zone.id,
                    to_count(position),
                    zone.name,
                    zone.muster_point,
                    zone.capacity,
                    to_count(zone.current_count),
                    to_count(zone.safe_count),
                    to_count(zone.missing_count),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn subscribe(&mut self, listener: mpsc::UnboundedSender<GatewayEvent>) {
        self.listeners.push(listener);
    }

    fn poll(&mut self) -> Result<()> {
        let version = read_data_version(&self.conn)?;
        if version == self.data_version {
            return Ok(());
        }
        self.data_version = version;
        if self.listeners.is_empty() {
            return Ok(());
        }

        debug!("Database changed by another connection");
        let roster = self.load_roster()?;
        publish(&mut self.listeners, &GatewayEvent::RosterSaved(roster));
        if let Some(session) = self.load_session()? {
            publish(&mut self.listeners, &GatewayEvent::SessionSaved(session));
        }
        let zones = self.load_zones()?;
        publish(&mut self.listeners, &GatewayEvent::ZonesSaved(zones));
        Ok(())
    }
}

/// Statistics about the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    /// People on the stored roster.
    pub people: i64,
    /// Stored session records, including history.
    pub sessions: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

fn read_data_version(conn: &Connection) -> Result<i64> {
    let version = conn.query_row("PRAGMA data_version", [], |row| row.get(0))?;
    Ok(version)
}

fn roster_fingerprint(people: &[Person]) -> Result<String> {
    let bytes = serde_json::to_vec(people)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

fn to_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_gateway() -> SqliteGateway {
        SqliteGateway::open_in_memory().expect("failed to create test gateway")
    }

    fn person(id: &str, zone: &str) -> Person {
        let mut p = Person::new(id, format!("Person {id}"), "Acme", PersonType::Staff, zone);
        p.badge_number = Some(format!("B-{id}"));
        p
    }

    fn record(id: &str) -> SessionRecord {
        SessionRecord::new(id.to_string(), SessionType::Drill, "warden".to_string())
    }

    fn temp_db_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("musterpoint_{tag}_{}.db", std::process::id()))
    }

    fn remove_db(path: &Path) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
    }

    #[test]
    fn test_open_in_memory() {
        let gateway = create_test_gateway();
        assert_eq!(gateway.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_roster_round_trip_preserves_order_and_fields() {
        let mut gateway = create_test_gateway();
        let mut people = vec![person("b", "office"), person("a", "production")];
        people[0].status = SafetyStatus::Safe;
        people[1].host_name = Some("Linus".to_string());

        gateway.save_roster(&people).unwrap();
        let loaded = gateway.load_roster().unwrap();
        assert_eq!(loaded, people);
    }

    #[test]
    fn test_save_roster_replaces_previous() {
        let mut gateway = create_test_gateway();
        gateway
            .save_roster(&[person("a", "office"), person("b", "office")])
            .unwrap();
        gateway.save_roster(&[person("c", "office")]).unwrap();

        let loaded = gateway.load_roster().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "c");
    }

    #[test]
    fn test_unchanged_roster_skips_write() {
        let mut gateway = create_test_gateway();
        let people = vec![person("a", "office")];
        gateway.save_roster(&people).unwrap();
        let first = gateway.stored_fingerprint().unwrap();

        gateway.save_roster(&people).unwrap();
        assert_eq!(gateway.stored_fingerprint().unwrap(), first);

        let mut changed = people.clone();
        changed[0].status = SafetyStatus::Missing;
        gateway.save_roster(&changed).unwrap();
        assert_ne!(gateway.stored_fingerprint().unwrap(), first);
        assert_eq!(gateway.load_roster().unwrap()[0].status, SafetyStatus::Missing);
    }

    #[test]
    fn test_session_upsert_and_history() {
        let mut gateway = create_test_gateway();
        let mut older = record("m1");
        older.start_time = Utc::now() - Duration::hours(2);
        older.status = SessionStatus::Completed;
        older.end_time = Some(Utc::now() - Duration::hours(1));
        gateway.save_session(&older).unwrap();

        let mut current = record("m2");
        gateway.save_session(&current).unwrap();
        current.safe_people = 4;
        current.total_people = 5;
        gateway.save_session(&current).unwrap();

        let latest = gateway.load_session().unwrap().unwrap();
        assert_eq!(latest.id, "m2");
        assert_eq!(latest.safe_people, 4);
        assert_eq!(latest.status, SessionStatus::Active);
        assert!(latest.end_time.is_none());

        let history = gateway.load_history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].id, "m1");
        assert!(history[1].end_time.is_some());
    }

    #[test]
    fn test_load_session_empty() {
        let gateway = create_test_gateway();
        assert!(gateway.load_session().unwrap().is_none());
        assert!(gateway.load_history().unwrap().is_empty());
    }

    #[test]
    fn test_zones_round_trip() {
        let mut gateway = create_test_gateway();
        let zones = vec![
            Zone {
                id: "production".to_string(),
                name: "Production Floor".to_string(),
                muster_point: "Assembly Point A".to_string(),
                capacity: 150,
                current_count: 3,
                safe_count: 1,
                missing_count: 1,
            },
            Zone {
                id: "office".to_string(),
                name: "Office Block".to_string(),
                muster_point: "Assembly Point B".to_string(),
                capacity: 80,
                current_count: 0,
                safe_count: 0,
                missing_count: 0,
            },
        ];
        gateway.save_zones(&zones).unwrap();
        assert_eq!(gateway.load_zones().unwrap(), zones);
    }

    #[test]
    fn test_stats() {
        let mut gateway = create_test_gateway();
        gateway.save_roster(&[person("a", "office")]).unwrap();
        gateway.save_session(&record("m1")).unwrap();

        let stats = gateway.stats().unwrap();
        assert_eq!(stats.people, 1);
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_poll_without_changes_publishes_nothing() {
        let mut gateway = create_test_gateway();
        let (tx, mut rx) = mpsc::unbounded_channel();
        gateway.subscribe(tx);

        gateway.save_roster(&[person("a", "office")]).unwrap();
        gateway.poll().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_poll_publishes_changes_from_other_connections() {
        let path = temp_db_path("poll");
        remove_db(&path);

        let mut watcher = SqliteGateway::open(&path).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        watcher.subscribe(tx);

        let mut writer = SqliteGateway::open(&path).unwrap();
        writer.save_roster(&[person("a", "office")]).unwrap();
        writer.save_session(&record("m1")).unwrap();

        watcher.poll().unwrap();

        let mut saw_roster = false;
        let mut saw_session = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                GatewayEvent::RosterSaved(people) => saw_roster = people.len() == 1,
                GatewayEvent::SessionSaved(session) => saw_session = session.id == "m1",
                GatewayEvent::ZonesSaved(_) => {}
            }
        }
        assert!(saw_roster);
        assert!(saw_session);

        drop(watcher);
        drop(writer);
        remove_db(&path);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let nested_path = std::env::temp_dir().join(format!(
            "musterpoint_test_{}/nested/muster.db",
            std::process::id()
        ));
        if let Some(parent) = nested_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }

        let gateway = SqliteGateway::open(&nested_path).unwrap();
        assert!(nested_path.exists());
        assert_eq!(gateway.path(), nested_path);

        drop(gateway);
        if let Some(parent) = nested_path.parent() {
            let _ = std::fs::remove_dir_all(parent.parent().unwrap());
        }
    }

    #[test]
    fn test_unknown_stored_values_fall_back() {
        let gateway = create_test_gateway();
        gateway
            .conn
            .execute(
                "INSERT INTO roster VALUES ('x', 0, 'X', 'Acme', 'alien', 'office', 'lost', NULL, NULL, NULL)",
                [],
            )
            .unwrap();

        let loaded = gateway.load_roster().unwrap();
        assert_eq!(loaded[0].person_type, PersonType::Visitor);
        assert_eq!(loaded[0].status, SafetyStatus::Unknown);
    }
}
