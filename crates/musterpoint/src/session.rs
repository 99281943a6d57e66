//! Muster session lifecycle.
//!
//! A [`MusterSession`] owns the roster, the zone catalogue and the current
//! session record. Every mutation recomputes the aggregates from the roster
//! and writes the result through the [`PersistenceGateway`]. Storage failures
//! never stop a muster: the session logs them and carries on from memory.
//!
//! ```text
//! idle ──activate──▶ active ──deactivate──▶ completed
//!                      │
//!                      └──────cancel──────▶ cancelled
//! ```
//!
//! Terminal records never change again. A new session may be activated once
//! the previous one is terminal; the old record stays in the history.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clock::{ClockEvent, SessionClock};
use crate::error::{Error, Result};
use crate::gateway::{GatewayEvent, PersistenceGateway};
use crate::notify::{LogNotifier, Notifier};
use crate::person::{Person, SafetyStatus};
use crate::roster::RosterStore;
use crate::zone::{Zone, ZoneRegistry};

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Whether a muster is a practice or a real emergency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// A scheduled practice muster.
    Drill,
    /// A real emergency.
    Actual,
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionType {
    /// Stable lowercase name, also used as the storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drill => "drill",
            Self::Actual => "actual",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "drill" => Some(Self::Drill),
            "actual" => Some(Self::Actual),
            _ => None,
        }
    }
}

/// Lifecycle status of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// People are being accounted for.
    Active,
    /// Ended normally.
    Completed,
    /// Called off.
    Cancelled,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionStatus {
    /// Stable lowercase name, also used as the storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// One activation-to-deactivation cycle.
///
/// The headcount fields are a snapshot of the roster at the last recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Time-based id, unique within the process.
    pub id: String,
    /// When the session was activated.
    pub start_time: DateTime<Utc>,
    /// When the session ended; `None` while active.
    pub end_time: Option<DateTime<Utc>>,
    /// Drill or actual emergency.
    #[serde(rename = "type")]
    pub session_type: SessionType,
    /// Who activated the session.
    pub activated_by: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// People on the roster.
    pub total_people: usize,
    /// People confirmed safe.
    pub safe_people: usize,
    /// People reported missing.
    pub missing_people: usize,
}

impl SessionRecord {
    /// Create an active record starting now with zero headcounts.
    #[must_use]
    pub fn new(id: String, session_type: SessionType, activated_by: String) -> Self {
        Self {
            id,
            start_time: Utc::now(),
            end_time: None,
            session_type,
            activated_by,
            status: SessionStatus::Active,
            total_people: 0,
            safe_people: 0,
            missing_people: 0,
        }
    }

    /// Whether the record is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Time since activation, measured up to `end_time` once the session ended.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.end_time.unwrap_or(now) - self.start_time
    }

    /// Headline statistics from the stored snapshot.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        Statistics::from_counts(self.total_people, self.safe_people, self.missing_people)
    }
}

/// Headcount summary exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Everyone on the roster.
    pub total: usize,
    /// Confirmed safe.
    pub safe: usize,
    /// Reported missing.
    pub missing: usize,
    /// Neither safe nor missing.
    pub unknown: usize,
    /// Share of people accounted for, rounded to a whole percent.
    pub percentage: u32,
}

impl Statistics {
    /// Build statistics from raw counts.
    #[must_use]
    pub fn from_counts(total: usize, safe: usize, missing: usize) -> Self {
        Self {
            total,
            safe,
            missing,
            unknown: total.saturating_sub(safe + missing),
            percentage: accounted_for_percentage(safe, total),
        }
    }
}

/// `round(safe / total * 100)`, rounding halves up; `0` for an empty roster.
#[must_use]
pub fn accounted_for_percentage(safe: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let rounded = (safe * 200 + total) / (total * 2);
    u32::try_from(rounded).unwrap_or(u32::MAX)
}

/// What the caller needs to know after ending a session.
///
/// Ending a muster with people still missing is allowed; the counts here are
/// a warning the front end should put in front of the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivationReport {
    /// The final, terminal record.
    pub session: SessionRecord,
    /// People still reported missing when the session ended.
    pub missing_at_close: usize,
    /// People never accounted for either way.
    pub unknown_at_close: usize,
}

impl DeactivationReport {
    fn new(session: SessionRecord) -> Self {
        let stats = session.statistics();
        Self {
            missing_at_close: stats.missing,
            unknown_at_close: stats.unknown,
            session,
        }
    }

    /// Whether anyone was left missing.
    #[must_use]
    pub fn has_warning(&self) -> bool {
        self.missing_at_close > 0
    }
}

/// Timing and roster defaults for a [`MusterSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Interval between periodic refreshes while a session is active.
    pub refresh_interval: Duration,
    /// Length of the countdown started for drills.
    pub drill_countdown: Duration,
    /// Zone given to imported people with no recorded zone.
    pub default_zone: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            drill_countdown: Duration::from_secs(10),
            default_zone: "office".to_string(),
        }
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Active(SessionRecord),
    Closed(SessionRecord),
}

/// The emergency mustering state machine.
#[derive(Debug)]
pub struct MusterSession {
    settings: SessionSettings,
    zones: ZoneRegistry,
    roster: RosterStore,
    summaries: Vec<Zone>,
    state: State,
    gateway: Box<dyn PersistenceGateway>,
    clock: Box<dyn SessionClock>,
    notifier: Box<dyn Notifier>,
    events: mpsc::UnboundedReceiver<GatewayEvent>,
    countdown: Option<Countdown>,
    degraded: bool,
}

/// The drill countdown this session is showing.
#[derive(Debug, Clone, Copy)]
struct Countdown {
    id: u64,
    remaining_secs: u64,
}

impl MusterSession {
    /// Open the session layer over a gateway, restoring whatever it holds.
    ///
    /// An active session found in storage is resumed and its refresh timer
    /// restarted. If storage cannot be read the session starts empty in
    /// degraded mode.
    #[must_use]
    pub fn open(
        settings: SessionSettings,
        zones: ZoneRegistry,
        mut gateway: Box<dyn PersistenceGateway>,
        clock: Box<dyn SessionClock>,
    ) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        gateway.subscribe(tx);

        let roster = RosterStore::new(settings.default_zone.clone());
        let mut session = Self {
            settings,
            zones,
            roster,
            summaries: Vec::new(),
            state: State::Idle,
            gateway,
            clock,
            notifier: Box::new(LogNotifier),
            events,
            countdown: None,
            degraded: false,
        };
        session.restore();
        session
    }

    /// Replace the announcement channel.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    fn restore(&mut self) {
        match self.gateway.load_roster() {
            Ok(people) => self.roster.replace(people),
            Err(e) => self.degrade("load_roster", &e),
        }

        match self.gateway.load_zones() {
            Ok(stored) => {
                if stored.iter().any(|z| !self.zones.contains(&z.id)) {
                    info!("Stored zone summaries predate the configured zone catalogue");
                }
            }
            Err(e) => self.degrade("load_zones", &e),
        }

        match self.gateway.load_session() {
            Ok(Some(record)) if record.is_active() => {
                info!(session_id = %record.id, "Resuming active muster session");
                self.adopt_active(record);
            }
            Ok(Some(record)) => self.state = State::Closed(record),
            Ok(None) => {}
            Err(e) => self.degrade("load_session", &e),
        }

        self.recompute();
    }

    // === Transitions ===

    /// Start a new session.
    ///
    /// Resets every person to unknown, starts the periodic refresh and, for
    /// drills, the countdown.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyActive`] if a session is active here or in
    /// storage. The active session is left untouched.
    pub fn activate(&mut self, session_type: SessionType, activated_by: &str) -> Result<SessionRecord> {
        self.sync_external();
        if let State::Active(record) = &self.state {
            return Err(Error::AlreadyActive {
                session_id: record.id.clone(),
            });
        }
        match self.gateway.load_session() {
            Ok(Some(record)) if record.is_active() => {
                let session_id = record.id.clone();
                self.adopt_active(record);
                self.recompute();
                return Err(Error::AlreadyActive { session_id });
            }
            Ok(_) => {}
            Err(e) => self.degrade("load_session", &e),
        }

        let record = SessionRecord::new(next_session_id(), session_type, activated_by.to_string());
        let session_id = record.id.clone();

        self.clock.cancel();
        self.countdown = None;
        self.roster.reset();
        self.state = State::Active(record);
        self.recompute();

        self.clock.start_refresh(self.settings.refresh_interval);
        if session_type == SessionType::Drill {
            let id = self.clock.start_countdown(self.settings.drill_countdown);
            self.countdown = Some(Countdown {
                id,
                remaining_secs: self.settings.drill_countdown.as_secs(),
            });
        }

        info!(
            session_id = %session_id,
            session_type = %session_type,
            activated_by,
            people = self.roster.len(),
            "Muster session activated"
        );
        self.persist();
        self.active_record()
    }

    /// Confirm a person safe at a zone's muster point.
    ///
    /// An unknown person id is ignored; aggregates are still recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TerminalState`] or [`Error::NoActiveSession`] when no
    /// session is active, and [`Error::NotFound`] for an unconfigured zone.
    pub fn mark_safe(&mut self, person_id: &str, zone_id: &str) -> Result<SessionRecord> {
        self.ensure_active()?;
        if !self.zones.contains(zone_id) {
            return Err(Error::zone_not_found(zone_id));
        }
        if self
            .roster
            .set_status(person_id, SafetyStatus::Safe, Some(zone_id))
        {
            info!(person_id, zone_id, "Person marked safe");
        }
        self.recompute();
        self.persist();
        self.active_record()
    }

    /// Report a person missing. Their last known zone is kept.
    ///
    /// An unknown person id is ignored; aggregates are still recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TerminalState`] or [`Error::NoActiveSession`] when no
    /// session is active.
    pub fn mark_missing(&mut self, person_id: &str) -> Result<SessionRecord> {
        self.ensure_active()?;
        if self.roster.set_status(person_id, SafetyStatus::Missing, None) {
            warn!(person_id, "Person reported missing");
        }
        self.recompute();
        self.persist();
        self.active_record()
    }

    /// Recompute aggregates from the current roster. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TerminalState`] or [`Error::NoActiveSession`] when no
    /// session is active.
    pub fn refresh(&mut self) -> Result<SessionRecord> {
        self.ensure_active()?;
        self.recompute();
        self.active_record()
    }

    /// End the session as completed.
    ///
    /// Succeeds even with people still missing; the report carries the
    /// counts so the caller can warn the operator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TerminalState`] if the session already ended, or
    /// [`Error::NoActiveSession`] if none was ever started.
    pub fn deactivate(&mut self) -> Result<DeactivationReport> {
        let record = self.close(SessionStatus::Completed)?;
        let report = DeactivationReport::new(record);
        if report.has_warning() {
            warn!(
                session_id = %report.session.id,
                missing = report.missing_at_close,
                "Muster session completed with people still missing"
            );
        }
        Ok(report)
    }

    /// Call off the session, e.g. after a false alarm.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TerminalState`] if the session already ended, or
    /// [`Error::NoActiveSession`] if none was ever started.
    pub fn cancel(&mut self) -> Result<SessionRecord> {
        self.close(SessionStatus::Cancelled)
    }

    fn close(&mut self, status: SessionStatus) -> Result<SessionRecord> {
        self.ensure_active()?;
        self.recompute();

        let State::Active(mut record) = std::mem::replace(&mut self.state, State::Idle) else {
            return Err(Error::NoActiveSession);
        };
        record.status = status;
        record.end_time = Some(Utc::now());

        self.clock.cancel();
        self.countdown = None;
        self.state = State::Closed(record.clone());

        info!(
            session_id = %record.id,
            status = %status,
            safe = record.safe_people,
            missing = record.missing_people,
            total = record.total_people,
            "Muster session ended"
        );
        self.persist();
        Ok(record)
    }

    /// Replace the roster from upstream visitor and staff records.
    ///
    /// Returns the number of people now on the roster.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyActive`] while a session is active, or
    /// [`Error::InvalidRecord`] for malformed input.
    pub fn import_roster(
        &mut self,
        visitors: &[crate::person::VisitorRecord],
        staff: &[crate::person::StaffRecord],
    ) -> Result<usize> {
        if let State::Active(record) = &self.state {
            return Err(Error::AlreadyActive {
                session_id: record.id.clone(),
            });
        }
        let count = self.roster.load(visitors, staff)?.len();
        self.recompute();
        self.persist();
        Ok(count)
    }

    // === Timers and external changes ===

    /// Apply a clock event.
    ///
    /// Refresh ticks first pick up changes pushed by the gateway, so a
    /// session ended elsewhere stops being refreshed. Countdown events only
    /// apply to the countdown started by the current activation; anything
    /// else (including events still queued after the session closed) is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Propagates refresh errors.
    pub fn handle_clock_event(&mut self, event: ClockEvent) -> Result<()> {
        match event {
            ClockEvent::Refresh => {
                self.sync_external();
                if self.is_active() {
                    self.refresh()?;
                }
            }
            ClockEvent::CountdownTick {
                countdown,
                remaining_secs,
            } => match self.countdown.as_mut() {
                Some(current) if current.id == countdown => {
                    current.remaining_secs = remaining_secs;
                }
                _ => debug!(countdown, "Ignoring tick from a stale countdown"),
            },
            ClockEvent::CountdownComplete { countdown } => match self.countdown {
                Some(current) if current.id == countdown => {
                    self.countdown = None;
                    info!("Drill countdown complete");
                }
                _ => debug!(countdown, "Ignoring completion of a stale countdown"),
            },
        }
        Ok(())
    }

    /// Apply changes other writers made to storage, last write wins.
    ///
    /// Returns `true` if anything was applied.
    pub fn sync_external(&mut self) -> bool {
        if let Err(e) = self.gateway.poll() {
            self.degrade("poll", &e);
        }

        let mut roster = None;
        let mut session = None;
        while let Ok(event) = self.events.try_recv() {
            match event {
                GatewayEvent::RosterSaved(people) => roster = Some(people),
                GatewayEvent::SessionSaved(record) => session = Some(record),
                GatewayEvent::ZonesSaved(_) => {}
            }
        }
        if roster.is_none() && session.is_none() {
            return false;
        }

        if let Some(people) = roster {
            debug!(people = people.len(), "Applying roster written elsewhere");
            self.roster.replace(people);
        }
        if let Some(record) = session {
            self.apply_external_session(record);
        }
        self.recompute();
        true
    }

    fn apply_external_session(&mut self, record: SessionRecord) {
        let current_id = match &self.state {
            State::Active(current) => Some(current.id.clone()),
            State::Idle | State::Closed(_) => None,
        };

        match current_id {
            Some(id) if id == record.id => {
                if record.status.is_terminal() {
                    info!(session_id = %id, status = %record.status, "Muster session ended elsewhere");
                    self.clock.cancel();
                    self.countdown = None;
                    self.state = State::Closed(record);
                }
            }
            Some(id) if record.is_active() => {
                warn!(
                    replaced = %id,
                    session_id = %record.id,
                    "Another active session was written elsewhere, adopting it"
                );
                self.state = State::Active(record);
            }
            Some(_) => {}
            None if record.is_active() => self.adopt_active(record),
            None => self.state = State::Closed(record),
        }
    }

    fn adopt_active(&mut self, record: SessionRecord) {
        self.state = State::Active(record);
        self.clock.start_refresh(self.settings.refresh_interval);
    }

    // === Announcements ===

    /// Send a message to everyone on the roster.
    ///
    /// Returns the number of recipients.
    ///
    /// # Errors
    ///
    /// Fails when no session is active or the notifier rejects the message.
    pub async fn announce(&self, message: &str) -> Result<usize> {
        self.ensure_active()?;
        let ids: Vec<String> = self.roster.people().iter().map(|p| p.id.clone()).collect();
        self.notifier.notify(&ids, message).await?;
        Ok(ids.len())
    }

    /// Send a message to everyone not yet confirmed safe.
    ///
    /// Returns the number of recipients.
    ///
    /// # Errors
    ///
    /// Fails when no session is active or the notifier rejects the message.
    pub async fn alert_unaccounted(&self, message: &str) -> Result<usize> {
        self.ensure_active()?;
        let ids: Vec<String> = self
            .roster
            .people()
            .iter()
            .filter(|p| !p.is_accounted_for())
            .map(|p| p.id.clone())
            .collect();
        self.notifier.notify(&ids, message).await?;
        Ok(ids.len())
    }

    // === Queries ===

    /// Headcount statistics for the current roster.
    #[must_use]
    pub fn get_statistics(&self) -> Statistics {
        Statistics::from_counts(
            self.roster.len(),
            self.roster.count_with_status(SafetyStatus::Safe),
            self.roster.count_with_status(SafetyStatus::Missing),
        )
    }

    /// Per-zone headcounts in catalogue order.
    #[must_use]
    pub fn get_zone_summaries(&self) -> &[Zone] {
        &self.summaries
    }

    /// People last seen in a zone, or everyone when `zone_id` is `None`.
    #[must_use]
    pub fn get_people_in_zone(&self, zone_id: Option<&str>) -> Vec<Person> {
        match zone_id {
            Some(zone) => self.roster.in_zone(zone),
            None => self.roster.people().to_vec(),
        }
    }

    /// People with the given status.
    #[must_use]
    pub fn get_people_with_status(&self, status: SafetyStatus) -> Vec<Person> {
        self.roster.with_status(status)
    }

    /// Case-insensitive search over name, company and badge number.
    #[must_use]
    pub fn search_people(&self, query: &str) -> Vec<Person> {
        self.roster.search(query)
    }

    /// The active session, or the most recent terminal one.
    #[must_use]
    pub fn current_session(&self) -> Option<&SessionRecord> {
        match &self.state {
            State::Idle => None,
            State::Active(record) | State::Closed(record) => Some(record),
        }
    }

    /// Whether a session is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// All stored sessions, newest first.
    ///
    /// Falls back to the session held in memory if storage is unavailable.
    pub fn history(&mut self) -> Vec<SessionRecord> {
        match self.gateway.load_history() {
            Ok(history) => history,
            Err(e) => {
                self.degrade("load_history", &e);
                self.current_session().cloned().into_iter().collect()
            }
        }
    }

    /// Seconds left on the drill countdown, if one is running.
    #[must_use]
    pub fn countdown_remaining(&self) -> Option<u64> {
        self.countdown.map(|countdown| countdown.remaining_secs)
    }

    /// Whether the last storage operation failed and state is memory-only.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// The zone catalogue.
    #[must_use]
    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    /// The timing settings in use.
    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    // === Internals ===

    fn ensure_active(&self) -> Result<()> {
        match &self.state {
            State::Active(_) => Ok(()),
            State::Closed(record) => Err(Error::TerminalState {
                session_id: record.id.clone(),
                status: record.status,
            }),
            State::Idle => Err(Error::NoActiveSession),
        }
    }

    fn active_record(&self) -> Result<SessionRecord> {
        self.ensure_active()?;
        match &self.state {
            State::Active(record) => Ok(record.clone()),
            State::Idle | State::Closed(_) => Err(Error::NoActiveSession),
        }
    }

    fn recompute(&mut self) {
        self.summaries = self.zones.recompute_aggregates(self.roster.people());
        let stats = self.get_statistics();
        if let State::Active(record) = &mut self.state {
            record.total_people = stats.total;
            record.safe_people = stats.safe;
            record.missing_people = stats.missing;
        }
    }

    fn persist(&mut self) {
        let mut ok = true;
        if let Err(e) = self.gateway.save_roster(self.roster.people()) {
            self.degrade("save_roster", &e);
            ok = false;
        }
        if let Err(e) = self.gateway.save_zones(&self.summaries) {
            self.degrade("save_zones", &e);
            ok = false;
        }
        let record = match &self.state {
            State::Active(record) | State::Closed(record) => Some(record.clone()),
            State::Idle => None,
        };
        if let Some(record) = record {
            if let Err(e) = self.gateway.save_session(&record) {
                self.degrade("save_session", &e);
                ok = false;
            }
        }
        if ok && self.degraded {
            info!("Storage available again");
            self.degraded = false;
        }
    }

    fn degrade(&mut self, operation: &'static str, err: &Error) {
        warn!(operation, error = %err, "Storage unavailable, continuing with in-memory state");
        self.degraded = true;
    }
}

fn next_session_id() -> String {
    let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("muster-{}-{seq}", Utc::now().timestamp_millis())
}
