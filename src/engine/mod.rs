//! Core engine: the scan → evaluate → dedup → notify loop and the
//! once-per-market-day ledger reset that drives it.

pub mod controller;
pub mod cycle;
pub mod ledger;
pub mod scheduler;

pub use controller::{ScanController, ScanStats};
pub use cycle::{CycleReport, ScanCycle, SignalBoard, TickerOutcome, TickerSnapshot};
pub use ledger::AlertLedger;
pub use scheduler::{Clock, DayBoundaryScheduler, SystemClock};
