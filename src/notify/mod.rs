//! Alert delivery.
//!
//! The scan cycle never waits on delivery: it hands each alert to a bounded
//! queue (`Dispatcher::hand_off`) and moves on. A background task drains the
//! queue into an `AlertSink`. Delivery failures are logged, never retried.

pub mod discord;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::types::{Alert, Chart, HandOffError, LiveQuote, SignalResult, Ticker};

/// Destination for alerts (chat channel, log, test recorder).
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<()>;

    fn name(&self) -> &str;
}

/// Build the human-readable alert text.
pub fn format_alert_message(
    mention: &str,
    ticker: &Ticker,
    quote: &LiveQuote,
    signal: &SignalResult,
) -> String {
    let prefix = if mention.is_empty() {
        "🚨".to_string()
    } else {
        format!("🚨 {mention}")
    };
    format!(
        "{prefix} BUY Alert for **{ticker}**:\n\
         Price: ${:.2}\n\
         SAR: {:.2}% higher\n\
         Volume: {:.2}% higher",
        quote.current_price, signal.sar_percent, signal.volume_percent,
    )
}

/// Assemble an alert ready for hand-off.
pub fn build_alert(ticker: &Ticker, message: String, chart: Chart) -> Alert {
    Alert {
        id: uuid::Uuid::new_v4(),
        ticker: ticker.clone(),
        message,
        chart,
        created_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Sending half of the alert queue.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Alert>,
}

impl Dispatcher {
    /// A dispatcher and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue plus a spawned task delivering into `sink`.
    pub fn spawn(sink: Arc<dyn AlertSink>, capacity: usize) -> (Self, Delivery) {
        let (dispatcher, rx) = Self::channel(capacity);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(deliver_until(rx, sink, shutdown_rx));
        (dispatcher, Delivery { handle, shutdown })
    }

    /// Enqueue without waiting. Success means the alert is owned by the
    /// delivery task, not that anyone has seen it.
    pub fn hand_off(&self, alert: Alert) -> Result<(), HandOffError> {
        self.tx.try_send(alert).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => HandOffError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => HandOffError::Closed,
        })
    }
}

/// Handle on the spawned delivery task.
pub struct Delivery {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

impl Delivery {
    /// Refuse new alerts, deliver what is already queued, and give up after
    /// `grace`. Returns `false` if the queue was abandoned.
    pub async fn finish(self, grace: Duration) -> bool {
        let Delivery { mut handle, shutdown } = self;
        let _ = shutdown.send(());
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!(grace_secs = grace.as_secs(), "Alert queue not drained in time; abandoning");
                handle.abort();
                false
            }
        }
    }
}

/// Drain the queue into `sink` until every sender is dropped.
pub async fn deliver_all(mut rx: mpsc::Receiver<Alert>, sink: Arc<dyn AlertSink>) {
    while let Some(alert) = rx.recv().await {
        deliver(sink.as_ref(), &alert).await;
    }
}

/// Like [`deliver_all`], but on `shutdown` the queue is closed and only the
/// alerts already in it are delivered.
async fn deliver_until(
    mut rx: mpsc::Receiver<Alert>,
    sink: Arc<dyn AlertSink>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut closing = false;
    loop {
        tokio::select! {
            _ = &mut shutdown, if !closing => {
                closing = true;
                rx.close();
            }
            next = rx.recv() => match next {
                Some(alert) => deliver(sink.as_ref(), &alert).await,
                None => break,
            },
        }
    }
}

async fn deliver(sink: &dyn AlertSink, alert: &Alert) {
    match sink.send(alert).await {
        Ok(()) => info!(ticker = %alert.ticker, alert_id = %alert.id, sink = sink.name(), "Alert delivered"),
        Err(e) => error!(ticker = %alert.ticker, alert_id = %alert.id, sink = sink.name(), error = %e, "Alert delivery failed"),
    }
}

// ---------------------------------------------------------------------------
// Log sink
// ---------------------------------------------------------------------------

/// Writes alerts to the log instead of a chat channel (no webhook configured).
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send(&self, alert: &Alert) -> Result<()> {
        info!(
            ticker = %alert.ticker,
            chart_bytes = alert.chart.bytes.len(),
            message = %alert.message,
            "[DRY RUN] Would send alert"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
