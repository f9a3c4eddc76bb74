//! Persistence layer.
//!
//! The watchlist lives in a single SQLite table. The scan cycle reads it at
//! the start of every pass; the dashboard adds and removes symbols.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::types::{RegistryError, Ticker};

/// Persisted set of watched symbols.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TickerRegistry: Send + Sync {
    /// All symbols, in insertion order. Stored rows that are not valid
    /// symbols are skipped.
    async fn list(&self) -> Result<Vec<Ticker>, RegistryError>;

    /// Returns false when the symbol was already present.
    async fn add(&self, ticker: &Ticker) -> Result<bool, RegistryError>;

    /// Returns false when the symbol was not present.
    async fn remove(&self, ticker: &Ticker) -> Result<bool, RegistryError>;
}

pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    /// Open (creating if needed) the database at `url` and ensure the table.
    pub async fn connect(url: &str) -> Result<Self, RegistryError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // One long-lived connection: in-memory databases are per-connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tickers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT UNIQUE NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        info!(url, "Ticker registry ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl TickerRegistry for SqliteRegistry {
    async fn list(&self) -> Result<Vec<Ticker>, RegistryError> {
        let rows = sqlx::query("SELECT ticker FROM tickers ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut tickers = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get("ticker")?;
            match Ticker::parse(&raw) {
                Ok(ticker) => tickers.push(ticker),
                // Rows written by older tools may hold anything.
                Err(e) => warn!(raw = %raw, error = %e, "Skipping unusable registry row"),
            }
        }
        Ok(tickers)
    }

    async fn add(&self, ticker: &Ticker) -> Result<bool, RegistryError> {
        let result = sqlx::query("INSERT OR IGNORE INTO tickers (ticker) VALUES (?)")
            .bind(ticker.as_str())
            .execute(&self.pool)
            .await?;
        let added = result.rows_affected() > 0;
        debug!(ticker = %ticker, added, "Registry add");
        Ok(added)
    }

    async fn remove(&self, ticker: &Ticker) -> Result<bool, RegistryError> {
        let result = sqlx::query("DELETE FROM tickers WHERE ticker = ?")
            .bind(ticker.as_str())
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected() > 0;
        debug!(ticker = %ticker, removed, "Registry remove");
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
