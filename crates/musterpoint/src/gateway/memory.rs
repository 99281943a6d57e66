//! In-memory gateway.
//!
//! Clones share one store but act as separate writers, the way two browser
//! tabs share one local store: a save through one handle is pushed to the
//! subscribers of every other handle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::trace;

use super::{GatewayEvent, PersistenceGateway};
use crate::error::{Error, Result};
use crate::person::Person;
use crate::session::SessionRecord;
use crate::zone::Zone;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct Store {
    roster: Vec<Person>,
    zones: Vec<Zone>,
    sessions: Vec<SessionRecord>,
    listeners: Vec<(u64, mpsc::UnboundedSender<GatewayEvent>)>,
}

impl Store {
    fn publish(&mut self, from: u64, event: &GatewayEvent) {
        self.listeners
            .retain(|(handle, tx)| *handle == from || tx.send(event.clone()).is_ok());
    }
}

/// A [`PersistenceGateway`] backed by process memory.
#[derive(Debug)]
pub struct MemoryGateway {
    handle: u64,
    store: Arc<Mutex<Store>>,
    available: Arc<AtomicBool>,
}

impl MemoryGateway {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            store: Arc::new(Mutex::new(Store::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create a store pre-populated with a roster.
    #[must_use]
    pub fn with_roster(people: Vec<Person>) -> Self {
        let gateway = Self::new();
        gateway.lock().roster = people;
        gateway
    }

    /// Simulate the store going offline or coming back.
    ///
    /// Affects every handle sharing this store.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored session records.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::storage_unavailable(operation, "memory store is offline"))
        }
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryGateway {
    fn clone(&self) -> Self {
        Self {
            handle: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
            store: Arc::clone(&self.store),
            available: Arc::clone(&self.available),
        }
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load_roster(&self) -> Result<Vec<Person>> {
        self.check("load_roster")?;
        Ok(self.lock().roster.clone())
    }

    fn save_roster(&mut self, people: &[Person]) -> Result<()> {
        self.check("save_roster")?;
        let mut store = self.lock();
        store.roster = people.to_vec();
        store.publish(self.handle, &GatewayEvent::RosterSaved(people.to_vec()));
        trace!(people = people.len(), "Roster saved to memory");
        Ok(())
    }

    fn load_session(&self) -> Result<Option<SessionRecord>> {
        self.check("load_session")?;
        Ok(self
            .lock()
            .sessions
            .iter()
            .max_by_key(|s| s.start_time)
            .cloned())
    }

    fn save_session(&mut self, session: &SessionRecord) -> Result<()> {
        self.check("save_session")?;
        let mut store = self.lock();
        if let Some(existing) = store.sessions.iter_mut().find(|s| s.id == session.id) {
            *existing = session.clone();
        } else {
            store.sessions.push(session.clone());
        }
        store.publish(self.handle, &GatewayEvent::SessionSaved(session.clone()));
        Ok(())
    }

    fn load_history(&self) -> Result<Vec<SessionRecord>> {
        self.check("load_history")?;
        let mut sessions = self.lock().sessions.clone();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    fn load_zones(&self) -> Result<Vec<Zone>> {
        self.check("load_zones")?;
        Ok(self.lock().zones.clone())
    }

    fn save_zones(&mut self, zones: &[Zone]) -> Result<()> {
        self.check("save_zones")?;
        let mut store = self.lock();
        store.zones = zones.to_vec();
        store.publish(self.handle, &GatewayEvent::ZonesSaved(zones.to_vec()));
        Ok(())
    }

    fn subscribe(&mut self, listener: mpsc::UnboundedSender<GatewayEvent>) {
        self.lock().listeners.push((self.handle, listener));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person::PersonType;
    use crate::session::{SessionStatus, SessionType};
    use chrono::{Duration, Utc};

    fn person(id: &str) -> Person {
        Person::new(id, id, "Acme", PersonType::Staff, "office")
    }

    fn record(id: &str, minutes_ago: i64) -> SessionRecord {
        let mut r = SessionRecord::new(id.to_string(), SessionType::Drill, "warden".to_string());
        r.start_time = Utc::now() - Duration::minutes(minutes_ago);
        r
    }

    #[test]
    fn test_roster_round_trip() {
        let mut gateway = MemoryGateway::new();
        gateway.save_roster(&[person("a"), person("b")]).unwrap();
        assert_eq!(gateway.load_roster().unwrap().len(), 2);
    }

    #[test]
    fn test_with_roster() {
        let gateway = MemoryGateway::with_roster(vec![person("a")]);
        assert_eq!(gateway.load_roster().unwrap()[0].id, "a");
    }

    #[test]
    fn test_save_session_upserts_by_id() {
        let mut gateway = MemoryGateway::new();
        let mut r = record("m1", 5);
        gateway.save_session(&r).unwrap();
        r.status = SessionStatus::Completed;
        gateway.save_session(&r).unwrap();

        assert_eq!(gateway.session_count(), 1);
        assert_eq!(
            gateway.load_session().unwrap().unwrap().status,
            SessionStatus::Completed
        );
    }

    #[test]
    fn test_load_session_returns_latest() {
        let mut gateway = MemoryGateway::new();
        gateway.save_session(&record("old", 60)).unwrap();
        gateway.save_session(&record("new", 1)).unwrap();
        gateway.save_session(&record("mid", 30)).unwrap();

        assert_eq!(gateway.load_session().unwrap().unwrap().id, "new");
        let history: Vec<String> = gateway
            .load_history()
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(history, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_offline_store_fails_every_operation() {
        let mut gateway = MemoryGateway::new();
        gateway.set_available(false);

        assert!(gateway.load_roster().unwrap_err().is_recoverable());
        assert!(gateway.save_roster(&[]).is_err());
        assert!(gateway.load_session().is_err());
        assert!(gateway.save_zones(&[]).is_err());

        gateway.set_available(true);
        assert!(gateway.load_roster().is_ok());
    }

    #[test]
    fn test_other_handles_receive_events() {
        let mut writer = MemoryGateway::new();
        let mut reader = writer.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        reader.subscribe(tx);

        writer.save_roster(&[person("a")]).unwrap();

        match rx.try_recv().unwrap() {
            GatewayEvent::RosterSaved(people) => assert_eq!(people[0].id, "a"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_writer_does_not_receive_own_events() {
        let mut gateway = MemoryGateway::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        gateway.subscribe(tx);

        gateway.save_roster(&[person("a")]).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_listeners_are_pruned() {
        let mut writer = MemoryGateway::new();
        let mut reader = writer.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        reader.subscribe(tx);
        drop(rx);

        writer.save_zones(&[]).unwrap();
        assert!(writer.lock().listeners.is_empty());
    }
}
