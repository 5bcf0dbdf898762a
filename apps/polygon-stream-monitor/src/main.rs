//! Polygon Stream Monitor Binary
//!
//! Starts the multi-asset streaming pipeline.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin polygon-stream-monitor
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `POLYGON_API_KEY`: Polygon.io API key
//!
//! ## Optional
//! - `POLYGON_TIER_<CLASS>`: subscription tier per asset class —
//!   `none` | `delayed` | `realtime` | `realtime-plus` (default: none)
//! - `POLYGON_WS_URL_<CLASS>`: endpoint override per asset class
//! - `STREAM_MONITOR_SYMBOLS_<CLASS>`: comma-separated symbols
//! - `STREAM_MONITOR_VOLUME_THRESHOLD_<CLASS>`: anomaly threshold override
//! - `STREAM_MONITOR_DB_PATH`: SQLite path (default: data/streaming_data.db)
//! - `STREAM_MONITOR_HEALTH_INTERVAL_SECS`: health loop interval (default: 5)
//! - `STREAM_MONITOR_CONNECT_TIMEOUT_SECS`: handshake budget (default: 10)
//! - `STREAM_MONITOR_SHUTDOWN_TIMEOUT_SECS`: shutdown bound (default: 30)
//! - `STREAM_MONITOR_RETENTION_DAYS`: startup retention pass (default: 7)
//! - `STREAM_MONITOR_MARKET_OPEN` / `STREAM_MONITOR_MARKET_CLOSE`:
//!   equity trading window, HH:MM local (default: 09:30 / 16:00)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;

use polygon_stream_monitor::infrastructure::telemetry;
use polygon_stream_monitor::{AssetClass, MarketStore, MonitorConfig, StreamSupervisor};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    load_dotenv();
    telemetry::init();

    tracing::info!("Starting Polygon Stream Monitor");

    let config = Arc::new(MonitorConfig::from_env()?);
    log_config(&config);

    // One retention pass before streaming starts; periodic cleanup is an
    // operational job outside this process.
    match MarketStore::open(&config.storage.db_path) {
        Ok(store) => match store.retention_cleanup(config.storage.retention_days) {
            Ok(report) => tracing::info!(
                ticks_deleted = report.ticks_deleted,
                anomalies_deleted = report.anomalies_deleted,
                older_than_days = config.storage.retention_days,
                "retention cleanup complete"
            ),
            Err(error) => tracing::warn!(%error, "retention cleanup failed"),
        },
        Err(error) => tracing::warn!(%error, "could not open store for retention cleanup"),
    }

    let shutdown_token = CancellationToken::new();

    let mut supervisor = StreamSupervisor::new(Arc::clone(&config));
    supervisor.start_all();

    let supervisor_handle = tokio::spawn(supervisor.run(shutdown_token.clone()));

    tracing::info!("Stream monitor ready");

    await_shutdown(&shutdown_token).await;

    // run() drains and stops every worker once the token fires.
    let _ = supervisor_handle.await;

    tracing::info!("Stream monitor stopped");
    Ok(())
}

/// Log the parsed configuration, one line per asset class, so a blocked
/// class is visible exactly once at startup.
fn log_config(config: &MonitorConfig) {
    tracing::info!(
        db_path = %config.storage.db_path.display(),
        health_interval_secs = config.supervisor.health_interval.as_secs(),
        connect_timeout_secs = config.connection.connect_timeout.as_secs(),
        "Configuration loaded"
    );

    for asset_class in AssetClass::ALL {
        let symbols = config
            .symbols
            .get(&asset_class)
            .map_or(0, std::vec::Vec::len);
        match config.entitlements.resolve(asset_class) {
            Ok(entitlement) => tracing::info!(
                asset_class = %asset_class,
                tier = %entitlement.tier,
                endpoint = %entitlement.endpoint,
                symbols,
                "streaming enabled"
            ),
            Err(error) => tracing::info!(asset_class = %asset_class, %error, "streaming disabled"),
        }
    }
}

/// Load .env from the current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: &CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
