//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::engine::{AlertLedger, DayBoundaryScheduler, ScanController, SignalBoard, TickerSnapshot};
use crate::storage::TickerRegistry;
use crate::types::{RegistryError, ScanState, Ticker};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub controller: Arc<ScanController>,
    pub registry: Arc<dyn TickerRegistry>,
    pub scheduler: Option<Arc<DayBoundaryScheduler>>,
}

impl DashboardState {
    pub fn new(
        controller: Arc<ScanController>,
        registry: Arc<dyn TickerRegistry>,
        scheduler: Option<Arc<DayBoundaryScheduler>>,
    ) -> Self {
        Self {
            controller,
            registry,
            scheduler,
        }
    }

    fn ledger(&self) -> &AlertLedger {
        self.controller.cycle().ledger()
    }

    fn board(&self) -> &SignalBoard {
        self.controller.cycle().board()
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

pub struct ApiError(RegistryError);

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RegistryError::InvalidTicker(_) => StatusCode::BAD_REQUEST,
            RegistryError::Storage(e) => {
                error!(error = %e, "Registry storage error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub state: ScanState,
    pub alerted: Vec<Ticker>,
    pub cycles_run: u64,
    pub alerts_sent: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle_failed: usize,
    pub last_cycle_error: Option<String>,
    pub next_reset: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct AddTickerRequest {
    pub ticker: String,
}

#[derive(Debug, Serialize)]
pub struct TickerChange {
    pub ticker: Ticker,
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct SignalsResponse {
    pub stocks: Vec<TickerSnapshot>,
    pub breakouts: Vec<TickerSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub state: ScanState,
    pub changed: bool,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let stats = state.controller.stats();
    Json(StatusResponse {
        state: state.controller.state(),
        alerted: state.ledger().snapshot(),
        cycles_run: stats.cycles_run,
        alerts_sent: stats.alerts_sent,
        last_cycle_at: stats.last_cycle_at,
        last_cycle_failed: stats.last_cycle_failed,
        last_cycle_error: stats.last_cycle_error,
        next_reset: state.scheduler.as_ref().and_then(|s| s.next_reset()),
    })
}

/// GET /api/tickers
pub async fn list_tickers(State(state): State<AppState>) -> Result<Json<Vec<Ticker>>, ApiError> {
    Ok(Json(state.registry.list().await?))
}

/// POST /api/tickers
pub async fn add_ticker(
    State(state): State<AppState>,
    Json(req): Json<AddTickerRequest>,
) -> Result<(StatusCode, Json<TickerChange>), ApiError> {
    let ticker = Ticker::parse(&req.ticker)?;
    let changed = state.registry.add(&ticker).await?;
    info!(ticker = %ticker, changed, "Ticker added via dashboard");
    let status = if changed { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(TickerChange { ticker, changed })))
}

/// DELETE /api/tickers/:ticker
pub async fn remove_ticker(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<(StatusCode, Json<TickerChange>), ApiError> {
    let ticker = Ticker::parse(&raw)?;
    let changed = state.registry.remove(&ticker).await?;
    info!(ticker = %ticker, changed, "Ticker removed via dashboard");
    let status = if changed { StatusCode::OK } else { StatusCode::NOT_FOUND };
    Ok((status, Json(TickerChange { ticker, changed })))
}

/// GET /api/signals
pub async fn get_signals(State(state): State<AppState>) -> Json<SignalsResponse> {
    let stocks = state.board().ranked().await;
    let breakouts = stocks.iter().filter(|s| s.breakout).cloned().collect();
    Json(SignalsResponse { stocks, breakouts })
}

/// POST /api/scan/start
pub async fn start_scan(State(state): State<AppState>) -> Json<ScanResponse> {
    let changed = state.controller.start();
    Json(ScanResponse {
        state: state.controller.state(),
        changed,
    })
}

/// POST /api/scan/stop
pub async fn stop_scan(State(state): State<AppState>) -> Json<ScanResponse> {
    let changed = state.controller.stop();
    Json(ScanResponse {
        state: state.controller.state(),
        changed,
    })
}

/// POST /api/flags/clear
pub async fn clear_flags(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cleared = state.controller.clear_flags();
    Json(json!({ "cleared": cleared }))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
