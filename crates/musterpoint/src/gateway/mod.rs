//! Persistence gateway for the mustering core.
//!
//! The gateway is the durable system of record for the roster, the zone
//! summaries and session records. The session layer only needs load, save and
//! subscribe semantics, and treats every failure here as "storage
//! unavailable": it keeps working from memory.

mod memory;
pub mod migrations;
pub mod schema;
mod sqlite;

pub use memory::MemoryGateway;
pub use sqlite::{SqliteGateway, StorageStats};

use std::path::Path;

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::Result;
use crate::person::Person;
use crate::session::SessionRecord;
use crate::zone::Zone;

/// A change written to the store by someone other than the subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// The roster was replaced.
    RosterSaved(Vec<Person>),
    /// A session record was created or updated.
    SessionSaved(SessionRecord),
    /// Zone summaries were rewritten.
    ZonesSaved(Vec<Zone>),
}

/// Durable storage used by [`MusterSession`](crate::session::MusterSession).
///
/// Writers never receive their own events; `subscribe` only delivers changes
/// made through other handles or processes. Conflicting writers are resolved
/// last-write-wins.
pub trait PersistenceGateway: Send + std::fmt::Debug {
    /// Load the stored roster.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load_roster(&self) -> Result<Vec<Person>>;

    /// Replace the stored roster.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn save_roster(&mut self, people: &[Person]) -> Result<()>;

    /// Load the most recently started session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load_session(&self) -> Result<Option<SessionRecord>>;

    /// Insert or update a session record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn save_session(&mut self, session: &SessionRecord) -> Result<()>;

    /// Load every stored session, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load_history(&self) -> Result<Vec<SessionRecord>>;

    /// Load the stored zone summaries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load_zones(&self) -> Result<Vec<Zone>>;

    /// Replace the stored zone summaries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn save_zones(&mut self, zones: &[Zone]) -> Result<()>;

    /// Register a listener for changes made by other writers.
    fn subscribe(&mut self, listener: mpsc::UnboundedSender<GatewayEvent>);

    /// Check for changes made by other writers and publish them to
    /// subscribers. Stores that push eagerly can keep the default no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn poll(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Send an event to every listener, dropping listeners whose receiver is gone.
fn publish(listeners: &mut Vec<mpsc::UnboundedSender<GatewayEvent>>, event: &GatewayEvent) {
    listeners.retain(|tx| tx.send(event.clone()).is_ok());
}

/// Open the SQLite store at `path`, or an offline placeholder if it cannot be
/// opened.
///
/// The placeholder fails every operation, so a session opened over it starts
/// in degraded mode and keeps working from memory.
#[must_use]
pub fn open_or_offline(path: &Path) -> Box<dyn PersistenceGateway> {
    match SqliteGateway::open(path) {
        Ok(gateway) => Box::new(gateway),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Database unavailable, continuing without storage"
            );
            let offline = MemoryGateway::new();
            offline.set_available(false);
            Box::new(offline)
        }
    }
}
