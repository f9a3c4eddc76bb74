//! Start/stop of the repeating scan, plus the operator's "clear flags".
//!
//! `start()` runs a cycle immediately and then one every `interval` after
//! the previous one finishes. `stop()` lets an in-flight cycle finish but
//! prevents the next one. Each start gets a fresh epoch; a loop from an
//! earlier epoch exits the next time it checks, so a quick stop/start never
//! leaves two loops rescheduling.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{error, info};

use super::cycle::{CycleReport, ScanCycle};
use crate::types::ScanState;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub cycles_run: u64,
    pub alerts_sent: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle_failed: usize,
    /// Set when the last cycle could not read the watchlist at all.
    pub last_cycle_error: Option<String>,
}

#[derive(Debug)]
struct Control {
    state: ScanState,
    epoch: u64,
}

pub struct ScanController {
    cycle: Arc<ScanCycle>,
    interval: Duration,
    control: Mutex<Control>,
    stats: Mutex<ScanStats>,
}

impl ScanController {
    pub fn new(cycle: Arc<ScanCycle>, interval: Duration) -> Self {
        Self {
            cycle,
            interval,
            control: Mutex::new(Control {
                state: ScanState::Idle,
                epoch: 0,
            }),
            stats: Mutex::new(ScanStats::default()),
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stats_guard(&self) -> MutexGuard<'_, ScanStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ScanState {
        self.control().state
    }

    pub fn stats(&self) -> ScanStats {
        self.stats_guard().clone()
    }

    pub fn cycle(&self) -> &Arc<ScanCycle> {
        &self.cycle
    }

    /// Begin scanning. Returns `false` (and does nothing) if already scanning.
    pub fn start(self: &Arc<Self>) -> bool {
        let epoch = {
            let mut control = self.control();
            if control.state == ScanState::Scanning {
                return false;
            }
            control.state = ScanState::Scanning;
            control.epoch += 1;
            control.epoch
        };

        info!(epoch, interval_secs = self.interval.as_secs(), "Scanning started");
        tokio::spawn(Arc::clone(self).run_loop(epoch));
        true
    }

    /// Stop scanning. Returns `false` if already idle.
    pub fn stop(&self) -> bool {
        let mut control = self.control();
        if control.state == ScanState::Idle {
            return false;
        }
        control.state = ScanState::Idle;
        info!(epoch = control.epoch, "Scanning stopped");
        true
    }

    /// Forget every alerted ticker, whatever the scan state.
    pub fn clear_flags(&self) -> usize {
        let cleared = self.cycle.ledger().clear();
        info!(cleared, "Operator cleared alert flags");
        cleared
    }

    fn is_current(&self, epoch: u64) -> bool {
        let control = self.control();
        control.state == ScanState::Scanning && control.epoch == epoch
    }

    async fn run_loop(self: Arc<Self>, epoch: u64) {
        loop {
            match self.cycle.run_once().await {
                Ok(report) => self.record(&report),
                Err(e) => {
                    error!(error = %e, "Scan cycle failed to read the watchlist");
                    self.record_failure(e.to_string());
                }
            }

            if !self.is_current(epoch) {
                info!(epoch, "Not rescheduling scan");
                return;
            }
            tokio::time::sleep(self.interval).await;
            if !self.is_current(epoch) {
                return;
            }
        }
    }

    fn record(&self, report: &CycleReport) {
        let mut stats = self.stats_guard();
        stats.cycles_run += 1;
        stats.alerts_sent += report.alerted() as u64;
        stats.last_cycle_at = Some(report.finished_at);
        stats.last_cycle_failed = report.failed();
        stats.last_cycle_error = None;
    }

    fn record_failure(&self, error: String) {
        let mut stats = self.stats_guard();
        stats.cycles_run += 1;
        stats.last_cycle_at = Some(Utc::now());
        stats.last_cycle_failed = 0;
        stats.last_cycle_error = Some(error);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
