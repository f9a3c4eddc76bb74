//! Market-day boundary scheduler.
//!
//! Clears the alert ledger once per market day at a fixed wall-clock time
//! (09:30 by default). The next fire instant is recomputed from "now" after
//! every reset, so restarts and long sleeps never accumulate drift.

use chrono::{
    DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::ledger::AlertLedger;
use crate::types::ClockAnomaly;

/// Delay used instead of a zero or negative one.
pub const MIN_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

/// Monday through Friday. Holidays are not modelled.
pub fn is_market_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Next market-day occurrence of `reset_at` that is not before `now`.
pub fn next_reset_after(now: NaiveDateTime, reset_at: NaiveTime) -> NaiveDateTime {
    let mut candidate = now.date().and_time(reset_at);
    if now > candidate {
        candidate += Duration::days(1);
    }
    while !is_market_day(candidate.date()) {
        candidate += Duration::days(1);
    }
    candidate
}

/// Absolute instant of a wall-clock time in `tz`. Ambiguous times take the
/// earlier instant; a time skipped by a forward jump lands after the gap.
pub fn resolve_local<Z: TimeZone>(tz: &Z, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Real time between two wall-clock readings in `tz`, counting any
/// offset change in between.
pub fn zoned_gap<Z: TimeZone>(tz: &Z, from: NaiveDateTime, to: NaiveDateTime) -> Option<Duration> {
    Some(resolve_local(tz, to)? - resolve_local(tz, from)?)
}

/// Sleepable delay for `delta`, rejecting non-positive gaps.
pub fn checked_delay(delta: Duration) -> Result<std::time::Duration, ClockAnomaly> {
    if delta <= Duration::zero() {
        return Err(ClockAnomaly {
            delay_ms: delta.num_milliseconds(),
        });
    }
    delta.to_std().map_err(|_| ClockAnomaly {
        delay_ms: delta.num_milliseconds(),
    })
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of local wall-clock time. Swapped for a fake in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    /// Real time between two readings of this clock.
    fn between(&self, from: NaiveDateTime, to: NaiveDateTime) -> Duration {
        to - from
    }
}

/// Real time, in the configured market zone or the process's local zone.
pub struct SystemClock {
    tz: Option<Tz>,
}

impl SystemClock {
    pub fn new(tz: Option<Tz>) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        match self.tz {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => Local::now().naive_local(),
        }
    }

    fn between(&self, from: NaiveDateTime, to: NaiveDateTime) -> Duration {
        let real = match self.tz {
            Some(tz) => zoned_gap(&tz, from, to),
            None => zoned_gap(&Local, from, to),
        };
        real.unwrap_or(to - from)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Boundaries {
    next: Option<NaiveDateTime>,
    last_fired: Option<NaiveDateTime>,
}

pub struct DayBoundaryScheduler {
    ledger: Arc<AlertLedger>,
    clock: Arc<dyn Clock>,
    reset_at: NaiveTime,
    boundaries: Mutex<Boundaries>,
}

impl DayBoundaryScheduler {
    pub fn new(ledger: Arc<AlertLedger>, clock: Arc<dyn Clock>, reset_at: NaiveTime) -> Self {
        Self {
            ledger,
            clock,
            reset_at,
            boundaries: Mutex::new(Boundaries::default()),
        }
    }

    fn boundaries(&self) -> std::sync::MutexGuard<'_, Boundaries> {
        self.boundaries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Next boundary and how long to sleep until it, clamped to
    /// [`MIN_DELAY`] when the clock misbehaves. A boundary that already
    /// fired is never returned again.
    pub fn next_fire(&self) -> (NaiveDateTime, std::time::Duration) {
        let now = self.clock.now();
        let mut next = next_reset_after(now, self.reset_at);
        if self.boundaries().last_fired.is_some_and(|fired| next <= fired) {
            next = next_reset_after(next + Duration::seconds(1), self.reset_at);
        }
        let delay = checked_delay(self.clock.between(now, next)).unwrap_or_else(|e| {
            warn!(error = %e, now = %now, next = %next, "Clamping reset delay");
            MIN_DELAY
        });
        (next, delay)
    }

    /// The boundary the running task is currently waiting for.
    pub fn next_reset(&self) -> Option<NaiveDateTime> {
        self.boundaries().next
    }

    /// Reset the ledger at every boundary, forever.
    pub async fn run(self: Arc<Self>) {
        loop {
            let (next, delay) = self.next_fire();
            self.boundaries().next = Some(next);
            info!(next_reset = %next, delay_secs = delay.as_secs(), "Ledger reset scheduled");

            tokio::time::sleep(delay).await;

            self.boundaries().last_fired = Some(next);
            let cleared = self.ledger.clear();
            info!(cleared, "New market day: sent alerts reset");
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
