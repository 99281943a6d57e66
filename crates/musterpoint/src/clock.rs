//! Session timers.
//!
//! A [`SessionClock`] schedules the periodic refresh and the drill countdown
//! while a session is active. Timer output is delivered as [`ClockEvent`]s
//! over a channel; [`drive`] feeds them back into a [`MusterSession`].
//!
//! [`TokioClock`] runs real timers on the tokio runtime. [`ManualClock`]
//! only records what was requested, for one-shot commands and tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::session::MusterSession;

/// Timer output delivered to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Time to recompute aggregates.
    Refresh,
    /// One second of the drill countdown elapsed.
    CountdownTick {
        /// The countdown this tick belongs to.
        countdown: u64,
        /// Whole seconds left.
        remaining_secs: u64,
    },
    /// The drill countdown reached zero.
    CountdownComplete {
        /// The countdown that finished.
        countdown: u64,
    },
}

/// Schedules the timers a session needs while it is active.
pub trait SessionClock: Send + std::fmt::Debug {
    /// Start (or restart) the periodic refresh.
    fn start_refresh(&mut self, interval: Duration);

    /// Start (or restart) the drill countdown.
    ///
    /// Returns the id carried by this countdown's events. Every call returns a
    /// new id, so events from a replaced countdown can be told apart.
    fn start_countdown(&mut self, duration: Duration) -> u64;

    /// Cancel every pending timer. No events are produced afterwards.
    fn cancel(&mut self);

    /// Whether any timer is still scheduled.
    fn is_running(&self) -> bool;
}

/// A [`SessionClock`] backed by tokio tasks.
#[derive(Debug)]
pub struct TokioClock {
    tx: mpsc::Sender<ClockEvent>,
    refresh: Option<JoinHandle<()>>,
    countdown: Option<JoinHandle<()>>,
    countdowns_started: u64,
}

impl TokioClock {
    /// Create a clock and the receiver its events arrive on.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ClockEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                tx,
                refresh: None,
                countdown: None,
                countdowns_started: 0,
            },
            rx,
        )
    }

    fn spawn<F>(task: F) -> Option<JoinHandle<()>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(task)),
            Err(_) => {
                warn!("No async runtime available, session timers are disabled");
                None
            }
        }
    }
}

impl SessionClock for TokioClock {
    fn start_refresh(&mut self, interval: Duration) {
        abort(&mut self.refresh);
        let tx = self.tx.clone();
        let period = interval.max(Duration::from_millis(1));
        debug!(interval_ms = period.as_millis(), "Starting refresh timer");

        self.refresh = Self::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.send(ClockEvent::Refresh).await.is_err() {
                    break;
                }
            }
        });
    }

    fn start_countdown(&mut self, duration: Duration) -> u64 {
        abort(&mut self.countdown);
        self.countdowns_started += 1;
        let countdown = self.countdowns_started;
        let tx = self.tx.clone();
        let secs = duration.as_secs();
        debug!(countdown, secs, "Starting drill countdown");

        self.countdown = Self::spawn(async move {
            if secs == 0 {
                tokio::time::sleep(duration).await;
                let _ = tx.send(ClockEvent::CountdownComplete { countdown }).await;
                return;
            }

            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.tick().await;
            for remaining_secs in (0..secs).rev() {
                ticker.tick().await;
                let event = if remaining_secs == 0 {
                    ClockEvent::CountdownComplete { countdown }
                } else {
                    ClockEvent::CountdownTick {
                        countdown,
                        remaining_secs,
                    }
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        countdown
    }

    fn cancel(&mut self) {
        abort(&mut self.refresh);
        abort(&mut self.countdown);
    }

    fn is_running(&self) -> bool {
        [&self.refresh, &self.countdown]
            .into_iter()
            .flatten()
            .any(|task| !task.is_finished())
    }
}

impl Drop for TokioClock {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn abort(task: &mut Option<JoinHandle<()>>) {
    if let Some(task) = task.take() {
        task.abort();
    }
}

#[derive(Debug, Default)]
struct ManualState {
    refresh_interval: Option<Duration>,
    countdown: Option<Duration>,
    countdowns_started: u64,
    cancellations: usize,
}

/// A [`SessionClock`] that schedules nothing and records requests.
///
/// Clones share state, so a clone kept outside the session can inspect what
/// the session asked for.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    /// Create an idle clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The refresh interval currently scheduled.
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.lock().refresh_interval
    }

    /// The countdown currently scheduled.
    #[must_use]
    pub fn countdown(&self) -> Option<Duration> {
        self.lock().countdown
    }

    /// Id of the most recently started countdown, `0` if none was started.
    #[must_use]
    pub fn last_countdown(&self) -> u64 {
        self.lock().countdowns_started
    }

    /// How many times the timers were cancelled.
    #[must_use]
    pub fn cancellations(&self) -> usize {
        self.lock().cancellations
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionClock for ManualClock {
    fn start_refresh(&mut self, interval: Duration) {
        self.lock().refresh_interval = Some(interval);
    }

    fn start_countdown(&mut self, duration: Duration) -> u64 {
        let mut state = self.lock();
        state.countdown = Some(duration);
        state.countdowns_started += 1;
        state.countdowns_started
    }

    fn cancel(&mut self) {
        let mut state = self.lock();
        state.refresh_interval = None;
        state.countdown = None;
        state.cancellations += 1;
    }

    fn is_running(&self) -> bool {
        let state = self.lock();
        state.refresh_interval.is_some() || state.countdown.is_some()
    }
}

/// Feed clock events into a session until it is no longer active.
///
/// `on_event` runs after each event has been applied, e.g. to redraw a
/// status display. Returns when the session ends (locally or elsewhere) or
/// the clock channel closes.
///
/// # Errors
///
/// Propagates errors from applying an event.
pub async fn drive<F>(
    session: &mut MusterSession,
    events: &mut mpsc::Receiver<ClockEvent>,
    mut on_event: F,
) -> Result<()>
where
    F: FnMut(&MusterSession, ClockEvent),
{
    while session.is_active() {
        let Some(event) = events.recv().await else {
            debug!("Clock channel closed");
            break;
        };
        session.handle_clock_event(event)?;
        on_event(session, event);
    }
    Ok(())
}
