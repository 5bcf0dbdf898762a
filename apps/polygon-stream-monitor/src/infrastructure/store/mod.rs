//! Durable Tick and Anomaly Storage
//!
//! SQLite-backed append-mostly logs for market data and detected anomaly
//! events, plus the read contracts the dashboard layer consumes.
//!
//! # Sessions
//!
//! Each stream worker opens its own [`MarketStore`] at startup and keeps it
//! for the worker's lifetime; there is no cross-worker shared connection.
//! Writes within a session are serialized by an internal mutex, and
//! cross-session contention is left to SQLite's own locking with a 30s
//! busy timeout.
//!
//! # Write semantics
//!
//! The live path ([`MarketStore::write_tick`]) inserts unconditionally:
//! reconnects replay overlapping data and the log is at-least-once by
//! design. Backfill jobs use [`MarketStore::upsert_tick`], which checks
//! `(timestamp, symbol)` existence first so re-runs stay idempotent.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;

use crate::application::ports::{HandlerError, TickSink};
use crate::domain::market::{AnomalyEvent, AssetClass, Tick};

/// How long a session waits on SQLite's file lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Schema and indexes, applied idempotently on open.
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS market_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp DATETIME NOT NULL,
    symbol TEXT NOT NULL,
    asset_type TEXT NOT NULL,
    price REAL NOT NULL,
    volume REAL NOT NULL,
    high REAL,
    low REAL,
    open REAL,
    vwap REAL,
    raw_data TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS anomalies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    start_time DATETIME NOT NULL,
    end_time DATETIME,
    symbol TEXT NOT NULL,
    asset_type TEXT NOT NULL,
    anomaly_type TEXT NOT NULL,
    multiplier REAL,
    current_value REAL,
    average_value REAL,
    status TEXT DEFAULT 'detected',
    details TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_market_data_symbol_time
    ON market_data(symbol, timestamp);
CREATE INDEX IF NOT EXISTS idx_market_data_asset_time
    ON market_data(asset_type, timestamp);
CREATE INDEX IF NOT EXISTS idx_anomalies_time
    ON anomalies(start_time);
CREATE INDEX IF NOT EXISTS idx_anomalies_symbol
    ON anomalies(symbol, start_time);
";

// =============================================================================
// Errors
// =============================================================================

/// Persistence failures.
///
/// Callers on the streaming path log these and keep going; a failed write
/// never interrupts dispatch or the connection.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite-level failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("database path error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Read Models
// =============================================================================

/// One stored tick row.
#[derive(Debug, Clone, PartialEq)]
pub struct TickRecord {
    /// Synthetic row identity.
    pub id: i64,
    /// Observation time.
    pub timestamp: DateTime<Utc>,
    /// Trading symbol.
    pub symbol: String,
    /// Asset class wire name.
    pub asset_type: String,
    /// Last/close price.
    pub price: f64,
    /// Traded volume.
    pub volume: f64,
    /// Bar high, when stored.
    pub high: Option<f64>,
    /// Bar low, when stored.
    pub low: Option<f64>,
    /// Bar open, when stored.
    pub open: Option<f64>,
    /// Volume-weighted average price, when stored.
    pub vwap: Option<f64>,
}

/// One stored anomaly row.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyRecord {
    /// Synthetic row identity.
    pub id: i64,
    /// Detection time.
    pub start_time: DateTime<Utc>,
    /// Resolution time, once resolved.
    pub end_time: Option<DateTime<Utc>>,
    /// Trading symbol.
    pub symbol: String,
    /// Asset class wire name.
    pub asset_type: String,
    /// Anomaly kind identifier.
    pub anomaly_type: String,
    /// Current-to-average ratio.
    pub multiplier: f64,
    /// Value that triggered the event.
    pub current_value: f64,
    /// Rolling average it was compared against.
    pub average_value: f64,
    /// Lifecycle status.
    pub status: String,
}

/// Rows removed by a retention pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    /// Deleted `market_data` rows.
    pub ticks_deleted: usize,
    /// Deleted `anomalies` rows.
    pub anomalies_deleted: usize,
}

/// Coarse database statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    /// Total stored ticks.
    pub tick_count: i64,
    /// Total stored anomaly events.
    pub anomaly_count: i64,
    /// Most recent tick timestamp, if any data exists.
    pub latest_tick: Option<DateTime<Utc>>,
}

// =============================================================================
// Market Store
// =============================================================================

/// One SQLite session over the tick and anomaly logs.
pub struct MarketStore {
    conn: Mutex<Connection>,
}

impl MarketStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the parent directory cannot be created
    /// or SQLite refuses the file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store, used by tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if SQLite cannot create the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append one tick unconditionally (live-stream path).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on insert failure.
    pub fn write_tick(&self, tick: &Tick) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO market_data
                 (timestamp, symbol, asset_type, price, volume, high, low, open, vwap, raw_data)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                tick.timestamp,
                tick.symbol,
                tick.asset_class.wire_name(),
                decimal_to_f64(tick.price),
                tick.volume,
                tick.high.map(decimal_to_f64),
                tick.low.map(decimal_to_f64),
                tick.open.map(decimal_to_f64),
                tick.vwap.map(decimal_to_f64),
                tick.raw,
            ],
        )?;
        Ok(())
    }

    /// Insert a tick only if no row exists for `(timestamp, symbol)`.
    ///
    /// Returns whether a row was inserted, so backfill re-runs can report
    /// how much was actually new.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query or insert failure.
    pub fn upsert_tick(&self, tick: &Tick) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM market_data WHERE timestamp = ? AND symbol = ?",
            params![tick.timestamp, tick.symbol],
            |row| row.get(0),
        )?;
        if exists > 0 {
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO market_data
                 (timestamp, symbol, asset_type, price, volume, high, low, open, vwap, raw_data)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                tick.timestamp,
                tick.symbol,
                tick.asset_class.wire_name(),
                decimal_to_f64(tick.price),
                tick.volume,
                tick.high.map(decimal_to_f64),
                tick.low.map(decimal_to_f64),
                tick.open.map(decimal_to_f64),
                tick.vwap.map(decimal_to_f64),
                tick.raw,
            ],
        )?;
        Ok(true)
    }

    /// Append one anomaly event; repeated triggers on a sustained condition
    /// each produce their own row. Returns the new row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on insert failure.
    pub fn write_anomaly(&self, event: &AnomalyEvent) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO anomalies
                 (start_time, end_time, symbol, asset_type, anomaly_type,
                  multiplier, current_value, average_value, status, details)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                event.start_time,
                event.end_time,
                event.symbol,
                event.asset_class.wire_name(),
                event.kind.as_str(),
                event.multiplier,
                event.current_value,
                event.average_value,
                event.status.as_str(),
                event.details,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Close an anomaly: set its end time and flip the status to resolved.
    /// The transition itself is driven by an external consumer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on update failure.
    pub fn resolve_anomaly(
        &self,
        id: i64,
        end_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE anomalies SET end_time = ?, status = 'resolved' WHERE id = ?",
            params![end_time, id],
        )?;
        Ok(())
    }

    /// Ticks newer than `since`, optionally filtered by symbol and asset
    /// class, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure.
    pub fn recent_ticks(
        &self,
        symbol: Option<&str>,
        asset_class: Option<AssetClass>,
        since: DateTime<Utc>,
    ) -> Result<Vec<TickRecord>, StoreError> {
        let mut sql = String::from(
            "SELECT id, timestamp, symbol, asset_type, price, volume, high, low, open, vwap
             FROM market_data WHERE timestamp > ?",
        );
        let mut bindings: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(since)];

        if let Some(symbol) = symbol {
            sql.push_str(" AND symbol = ?");
            bindings.push(Box::new(symbol.to_string()));
        }
        if let Some(asset_class) = asset_class {
            sql.push_str(" AND asset_type = ?");
            bindings.push(Box::new(asset_class.wire_name()));
        }
        sql.push_str(" ORDER BY timestamp DESC");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(bindings.iter().map(|binding| &**binding)),
            |row| {
                Ok(TickRecord {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    symbol: row.get(2)?,
                    asset_type: row.get(3)?,
                    price: row.get(4)?,
                    volume: row.get(5)?,
                    high: row.get(6)?,
                    low: row.get(7)?,
                    open: row.get(8)?,
                    vwap: row.get(9)?,
                })
            },
        )?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Anomaly events newer than `since`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure.
    pub fn recent_anomalies(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<AnomalyRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, start_time, end_time, symbol, asset_type, anomaly_type,
                    multiplier, current_value, average_value, status
             FROM anomalies WHERE start_time > ?
             ORDER BY start_time DESC",
        )?;
        let rows = stmt.query_map(params![since], |row| {
            Ok(AnomalyRecord {
                id: row.get(0)?,
                start_time: row.get(1)?,
                end_time: row.get(2)?,
                symbol: row.get(3)?,
                asset_type: row.get(4)?,
                anomaly_type: row.get(5)?,
                multiplier: row.get(6)?,
                current_value: row.get(7)?,
                average_value: row.get(8)?,
                status: row.get(9)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every stored symbol, grouped by asset class wire name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure.
    pub fn symbols_by_asset_class(&self) -> Result<BTreeMap<String, Vec<String>>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT asset_type, symbol FROM market_data ORDER BY asset_type, symbol",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in rows {
            let (asset_type, symbol) = row?;
            grouped.entry(asset_type).or_default().push(symbol);
        }
        Ok(grouped)
    }

    /// Delete everything older than `older_than_days` days and reclaim the
    /// space.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on delete or vacuum failure.
    pub fn retention_cleanup(&self, older_than_days: u32) -> Result<CleanupReport, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(older_than_days));

        let conn = self.conn.lock();
        let ticks_deleted =
            conn.execute("DELETE FROM market_data WHERE timestamp < ?", params![cutoff])?;
        let anomalies_deleted =
            conn.execute("DELETE FROM anomalies WHERE start_time < ?", params![cutoff])?;
        conn.execute_batch("VACUUM")?;

        Ok(CleanupReport {
            ticks_deleted,
            anomalies_deleted,
        })
    }

    /// Row counts and the newest tick timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn.lock();
        let tick_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM market_data", [], |row| row.get(0))?;
        let anomaly_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM anomalies", [], |row| row.get(0))?;
        let latest_tick: Option<DateTime<Utc>> =
            conn.query_row("SELECT MAX(timestamp) FROM market_data", [], |row| {
                row.get(0)
            })?;

        Ok(StoreStats {
            tick_count,
            anomaly_count,
            latest_tick,
        })
    }
}

impl TickSink for MarketStore {
    fn record_tick(&self, tick: &Tick) -> Result<(), HandlerError> {
        self.write_tick(tick)
            .map_err(|e| HandlerError::new(e.to_string()))
    }

    fn record_anomaly(&self, event: &AnomalyEvent) -> Result<(), HandlerError> {
        self.write_anomaly(event)
            .map(|_| ())
            .map_err(|e| HandlerError::new(e.to_string()))
    }
}

impl std::fmt::Debug for MarketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketStore").finish_non_exhaustive()
    }
}

/// REAL columns hold f64; out-of-range decimals degrade to zero rather
/// than failing a write.
fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::domain::market::{AnomalyKind, AnomalyStatus};

    use super::*;

    fn tick(symbol: &str, asset_class: AssetClass, at: DateTime<Utc>) -> Tick {
        Tick {
            timestamp: at,
            symbol: symbol.to_string(),
            asset_class,
            price: Decimal::new(42_000_50, 2),
            volume: 12.5,
            open: Some(Decimal::new(41_900, 0)),
            high: Some(Decimal::new(42_100, 0)),
            low: Some(Decimal::new(41_850, 0)),
            vwap: Some(Decimal::new(42_010, 0)),
            raw: r#"{"ev":"XA"}"#.to_string(),
        }
    }

    fn anomaly(symbol: &str, at: DateTime<Utc>) -> AnomalyEvent {
        AnomalyEvent {
            start_time: at,
            end_time: None,
            symbol: symbol.to_string(),
            asset_class: AssetClass::Crypto,
            kind: AnomalyKind::VolumeSpike,
            multiplier: 3.5,
            current_value: 5_250.0,
            average_value: 1_500.0,
            status: AnomalyStatus::Detected,
            details: "{}".to_string(),
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 12, minute, 0).unwrap()
    }

    #[test]
    fn write_tick_twice_keeps_both_rows() {
        let store = MarketStore::open_in_memory().unwrap();
        let tick = tick("BTC-USD", AssetClass::Crypto, at(0));

        store.write_tick(&tick).unwrap();
        store.write_tick(&tick).unwrap();

        assert_eq!(store.stats().unwrap().tick_count, 2);
    }

    #[test]
    fn upsert_tick_twice_keeps_one_row() {
        let store = MarketStore::open_in_memory().unwrap();
        let tick = tick("BTC-USD", AssetClass::Crypto, at(0));

        assert!(store.upsert_tick(&tick).unwrap());
        assert!(!store.upsert_tick(&tick).unwrap());

        assert_eq!(store.stats().unwrap().tick_count, 1);
    }

    #[test]
    fn upsert_distinguishes_timestamp_and_symbol() {
        let store = MarketStore::open_in_memory().unwrap();

        assert!(store
            .upsert_tick(&tick("BTC-USD", AssetClass::Crypto, at(0)))
            .unwrap());
        assert!(store
            .upsert_tick(&tick("ETH-USD", AssetClass::Crypto, at(0)))
            .unwrap());
        assert!(store
            .upsert_tick(&tick("BTC-USD", AssetClass::Crypto, at(1)))
            .unwrap());

        assert_eq!(store.stats().unwrap().tick_count, 3);
    }

    #[test]
    fn tick_round_trip_preserves_fields() {
        let store = MarketStore::open_in_memory().unwrap();
        store
            .write_tick(&tick("AAPL", AssetClass::Equities, at(30)))
            .unwrap();

        let rows = store.recent_ticks(None, None, at(0)).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.symbol, "AAPL");
        assert_eq!(row.asset_type, "stocks");
        assert!((row.price - 42_000.50).abs() < 1e-9);
        assert!((row.volume - 12.5).abs() < 1e-9);
        assert_eq!(row.open, Some(41_900.0));
        assert_eq!(row.timestamp, at(30));
    }

    #[test]
    fn recent_ticks_filters_by_symbol_class_and_since() {
        let store = MarketStore::open_in_memory().unwrap();
        store
            .write_tick(&tick("AAPL", AssetClass::Equities, at(10)))
            .unwrap();
        store
            .write_tick(&tick("BTC-USD", AssetClass::Crypto, at(20)))
            .unwrap();
        store
            .write_tick(&tick("BTC-USD", AssetClass::Crypto, at(40)))
            .unwrap();

        let by_symbol = store.recent_ticks(Some("AAPL"), None, at(0)).unwrap();
        assert_eq!(by_symbol.len(), 1);

        let by_class = store
            .recent_ticks(None, Some(AssetClass::Crypto), at(0))
            .unwrap();
        assert_eq!(by_class.len(), 2);
        // Newest first.
        assert_eq!(by_class[0].timestamp, at(40));

        let since = store.recent_ticks(None, None, at(30)).unwrap();
        assert_eq!(since.len(), 1);
    }

    #[test]
    fn write_anomaly_never_deduplicates() {
        let store = MarketStore::open_in_memory().unwrap();
        let event = anomaly("BTC-USD", at(5));

        store.write_anomaly(&event).unwrap();
        store.write_anomaly(&event).unwrap();

        assert_eq!(store.stats().unwrap().anomaly_count, 2);
    }

    #[test]
    fn resolve_anomaly_sets_end_time_and_status() {
        let store = MarketStore::open_in_memory().unwrap();
        let id = store.write_anomaly(&anomaly("BTC-USD", at(5))).unwrap();

        store.resolve_anomaly(id, at(15)).unwrap();

        let rows = store.recent_anomalies(at(0)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "resolved");
        assert_eq!(rows[0].end_time, Some(at(15)));
        assert_eq!(rows[0].anomaly_type, "volume_spike");
    }

    #[test]
    fn symbols_group_by_asset_class() {
        let store = MarketStore::open_in_memory().unwrap();
        store
            .write_tick(&tick("AAPL", AssetClass::Equities, at(1)))
            .unwrap();
        store
            .write_tick(&tick("MSFT", AssetClass::Equities, at(2)))
            .unwrap();
        store
            .write_tick(&tick("BTC-USD", AssetClass::Crypto, at(3)))
            .unwrap();
        // Duplicate rows must not duplicate symbols.
        store
            .write_tick(&tick("AAPL", AssetClass::Equities, at(4)))
            .unwrap();

        let grouped = store.symbols_by_asset_class().unwrap();
        assert_eq!(grouped["stocks"], vec!["AAPL", "MSFT"]);
        assert_eq!(grouped["crypto"], vec!["BTC-USD"]);
    }

    #[test]
    fn retention_cleanup_removes_only_old_rows() {
        let store = MarketStore::open_in_memory().unwrap();
        let old = Utc::now() - chrono::Duration::days(30);
        let fresh = Utc::now();

        store.write_tick(&tick("AAPL", AssetClass::Equities, old)).unwrap();
        store
            .write_tick(&tick("AAPL", AssetClass::Equities, fresh))
            .unwrap();
        store.write_anomaly(&anomaly("AAPL", old)).unwrap();
        store.write_anomaly(&anomaly("AAPL", fresh)).unwrap();

        let report = store.retention_cleanup(7).unwrap();
        assert_eq!(report.ticks_deleted, 1);
        assert_eq!(report.anomalies_deleted, 1);

        let stats = store.stats().unwrap();
        assert_eq!(stats.tick_count, 1);
        assert_eq!(stats.anomaly_count, 1);
    }

    #[test]
    fn stats_report_latest_tick() {
        let store = MarketStore::open_in_memory().unwrap();
        assert_eq!(store.stats().unwrap().latest_tick, None);

        store
            .write_tick(&tick("AAPL", AssetClass::Equities, at(10)))
            .unwrap();
        store
            .write_tick(&tick("AAPL", AssetClass::Equities, at(50)))
            .unwrap();

        assert_eq!(store.stats().unwrap().latest_tick, Some(at(50)));
    }

    #[test]
    fn on_disk_store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("streaming.db");

        let store = MarketStore::open(&path).unwrap();
        store
            .write_tick(&tick("AAPL", AssetClass::Equities, at(0)))
            .unwrap();

        assert!(path.exists());
    }
}
