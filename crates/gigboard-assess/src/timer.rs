//! Countdown for a timed assessment attempt.
//!
//! Remaining time is always derived from the attempt's fixed deadline
//! (`started_at + time_limit`), never from a decrementing counter, so a
//! suspended or delayed task cannot make the clock drift. The deadline is
//! converted once into a monotonic `Instant`; every tick recomputes
//! `deadline - now` and the published value never increases.
//!
//! When the countdown reaches zero the time-up signal fires exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use gigboard_core::defaults;

/// Whole seconds left in an attempt at `now`, floored at zero.
///
/// A `now` before `started_at` (clock skew) yields the full limit.
pub fn remaining_seconds(started_at: DateTime<Utc>, limit_minutes: u32, now: DateTime<Utc>) -> u64 {
    let total = i64::from(limit_minutes) * 60;
    let elapsed = (now - started_at).num_seconds().max(0);
    (total - elapsed).max(0) as u64
}

/// Render seconds as `MM:SS` (minutes are not wrapped into hours).
pub fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Urgency band of the remaining time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// More than five minutes left.
    Normal,
    /// Five minutes or less.
    Warning,
    /// One minute or less.
    Critical,
    /// Thirty seconds or less.
    CriticalPulsing,
}

impl TimerPhase {
    pub fn from_remaining(secs: u64) -> Self {
        if secs <= defaults::TIMER_PULSE_SECS {
            Self::CriticalPulsing
        } else if secs <= defaults::TIMER_CRITICAL_SECS {
            Self::Critical
        } else if secs <= defaults::TIMER_WARNING_SECS {
            Self::Warning
        } else {
            Self::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::CriticalPulsing => "critical_pulsing",
        }
    }
}

/// One published timer reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub remaining_secs: u64,
    pub phase: TimerPhase,
}

impl TimerSnapshot {
    pub fn new(remaining_secs: u64) -> Self {
        Self {
            remaining_secs,
            phase: TimerPhase::from_remaining(remaining_secs),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_secs == 0
    }

    pub fn clock(&self) -> String {
        format_clock(self.remaining_secs)
    }
}

/// Fired-once latch for the time-up signal.
#[derive(Debug, Default)]
pub struct TimeUpGuard {
    fired: AtomicBool,
}

impl TimeUpGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for the first caller only.
    pub fn try_fire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Running countdown for one attempt.
///
/// Readings are published on a `watch` channel once per second. The ticking
/// task stops at zero, or when the timer is dropped.
pub struct SessionTimer {
    snapshots: watch::Receiver<TimerSnapshot>,
    time_up: Option<oneshot::Receiver<()>>,
    guard: Arc<TimeUpGuard>,
    task: JoinHandle<()>,
}

impl SessionTimer {
    /// Start a countdown for an attempt that began at `started_at`.
    pub fn start(started_at: DateTime<Utc>, limit_minutes: u32) -> Self {
        Self::start_at(started_at, limit_minutes, Utc::now())
    }

    /// Start a countdown as if the wall clock read `now`.
    pub fn start_at(started_at: DateTime<Utc>, limit_minutes: u32, now: DateTime<Utc>) -> Self {
        let limit_ms = i64::from(limit_minutes) * 60_000;
        let elapsed_ms = (now - started_at).num_milliseconds().max(0);
        let remaining_ms = (limit_ms - elapsed_ms).max(0) as u64;
        Self::with_remaining(Duration::from_millis(remaining_ms))
    }

    /// Start a countdown with `remaining` left on the clock.
    pub fn with_remaining(remaining: Duration) -> Self {
        let deadline = Instant::now() + remaining;
        let initial = TimerSnapshot::new(ceil_secs(remaining));
        let (tx, snapshots) = watch::channel(initial);
        let (fire_tx, fire_rx) = oneshot::channel();
        let guard = Arc::new(TimeUpGuard::new());

        debug!(
            remaining_secs = initial.remaining_secs,
            phase = initial.phase.label(),
            "Assessment timer started"
        );
        let task = tokio::spawn(run_countdown(deadline, tx, guard.clone(), fire_tx));

        Self {
            snapshots,
            time_up: Some(fire_rx),
            guard,
            task,
        }
    }

    /// Latest reading.
    pub fn snapshot(&self) -> TimerSnapshot {
        *self.snapshots.borrow()
    }

    /// Receiver of every reading.
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.clone()
    }

    /// One-shot time-up signal. Available to a single consumer.
    pub fn take_time_up(&mut self) -> Option<oneshot::Receiver<()>> {
        self.time_up.take()
    }

    pub fn guard(&self) -> &Arc<TimeUpGuard> {
        &self.guard
    }

    pub fn has_expired(&self) -> bool {
        self.guard.has_fired()
    }

    /// Stop ticking without firing time-up.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

async fn run_countdown(
    deadline: Instant,
    tx: watch::Sender<TimerSnapshot>,
    guard: Arc<TimeUpGuard>,
    fire: oneshot::Sender<()>,
) {
    let mut ticker = interval(Duration::from_millis(defaults::TIMER_TICK_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = tx.borrow().remaining_secs;
    let mut fire = Some(fire);

    loop {
        ticker.tick().await;
        let remaining = ceil_secs(deadline.saturating_duration_since(Instant::now())).min(last);
        if remaining != last {
            last = remaining;
            tx.send_replace(TimerSnapshot::new(remaining));
        }
        if remaining == 0 {
            if guard.try_fire() {
                info!(remaining_secs = 0, "Assessment time is up");
                if let Some(fire) = fire.take() {
                    let _ = fire.send(());
                }
            }
            break;
        }
    }
}
