//! `musterpoint` - Emergency mustering and roll-call tracking
//!
//! This library keeps track of who is on site during an evacuation: which
//! zone each person was last seen in, who has reached a muster point and who
//! is still missing. A [`MusterSession`] drives the roll call from activation
//! to deactivation and persists every change through a [`PersistenceGateway`].

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod notify;
pub mod person;
pub mod roster;
pub mod session;
pub mod zone;

pub use clock::{drive, ClockEvent, ManualClock, SessionClock, TokioClock};
pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{
    open_or_offline, GatewayEvent, MemoryGateway, PersistenceGateway, SqliteGateway, StorageStats,
};
pub use logging::init_logging;
pub use notify::{LogNotifier, Notifier};
pub use person::{Person, PersonType, SafetyStatus, StaffRecord, VisitorRecord};
pub use roster::RosterStore;
pub use session::{
    DeactivationReport, MusterSession, SessionRecord, SessionSettings, SessionStatus,
    SessionType, Statistics,
};
pub use zone::{Zone, ZoneConfig, ZoneRegistry};
