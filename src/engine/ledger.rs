//! Alert ledger: which tickers have already alerted this market day.
//!
//! One instance per process, shared behind an `Arc`. Every read and write
//! goes through the lock, so a running scan cycle, an operator clear and a
//! day-boundary reset never race. Nothing is persisted.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::types::Ticker;

#[derive(Debug, Default)]
pub struct AlertLedger {
    alerted: Mutex<HashSet<Ticker>>,
}

impl AlertLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock still holds a valid set; keep using it.
    fn guard(&self) -> MutexGuard<'_, HashSet<Ticker>> {
        self.alerted.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn has_alerted(&self, ticker: &Ticker) -> bool {
        self.guard().contains(ticker)
    }

    /// Record that `ticker` alerted. Returns `false` if it already had.
    pub fn mark_alerted(&self, ticker: &Ticker) -> bool {
        let inserted = self.guard().insert(ticker.clone());
        debug!(ticker = %ticker, inserted, "Ledger mark");
        inserted
    }

    /// Forget every ticker. Returns how many were cleared.
    pub fn clear(&self) -> usize {
        let mut set = self.guard();
        let cleared = set.len();
        set.clear();
        info!(cleared, "Alert ledger cleared");
        cleared
    }

    /// Alerted tickers, sorted, for display.
    pub fn snapshot(&self) -> Vec<Ticker> {
        let mut tickers: Vec<Ticker> = self.guard().iter().cloned().collect();
        tickers.sort();
        tickers
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}
