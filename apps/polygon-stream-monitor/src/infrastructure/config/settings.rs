//! Monitor Configuration Settings
//!
//! Configuration for the stream monitor, loaded from environment variables
//! once at process start. The resulting [`MonitorConfig`] is the only
//! configuration object in the process; components receive it (or pieces of
//! it) by reference instead of consulting globals.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::anomaly::DetectorConfig;
use crate::domain::entitlement::Entitlements;
use crate::domain::market::{AssetClass, SubscriptionTier};
use crate::infrastructure::supervisor::TradingWindow;

// =============================================================================
// Credential
// =============================================================================

/// Upstream API credential.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Create a credential, rejecting empty keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyValue`] for an empty key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ConfigError::EmptyValue("POLYGON_API_KEY".to_string()));
        }
        Ok(Self(api_key))
    }

    /// The raw key, for the authentication request.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&"[REDACTED]").finish()
    }
}

// =============================================================================
// Settings Groups
// =============================================================================

/// Anomaly detector tuning, per asset class.
#[derive(Debug, Clone, Default)]
pub struct DetectorSettings {
    threshold_overrides: HashMap<AssetClass, f64>,
}

impl DetectorSettings {
    /// Create settings with explicit threshold overrides.
    #[must_use]
    pub fn with_overrides(threshold_overrides: HashMap<AssetClass, f64>) -> Self {
        Self {
            threshold_overrides,
        }
    }

    /// The detector configuration for one asset class: class defaults with
    /// any configured threshold override applied.
    #[must_use]
    pub fn config_for(&self, asset_class: AssetClass) -> DetectorConfig {
        let base = DetectorConfig::for_asset_class(asset_class);
        self.threshold_overrides
            .get(&asset_class)
            .map_or(base, |threshold| base.with_threshold(*threshold))
    }
}

/// Connection handshake settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Budget for transport handshake plus authentication acknowledgment.
    pub connect_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Supervisor scheduling settings.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Interval between worker health checks.
    pub health_interval: Duration,
    /// Bound on graceful shutdown before stragglers are aborted.
    pub shutdown_timeout: Duration,
    /// Local-time window gating trading-hours-bound classes.
    pub trading_window: TradingWindow,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
            trading_window: TradingWindow::default(),
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// SQLite database path; each worker opens its own session on it.
    pub db_path: PathBuf,
    /// Days of data kept by the startup retention pass.
    pub retention_days: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/streaming_data.db"),
            retention_days: 7,
        }
    }
}

// =============================================================================
// Monitor Configuration
// =============================================================================

/// Complete monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Upstream API credential.
    pub credential: Credential,
    /// Per-asset-class tiers and endpoint overrides.
    pub entitlements: Entitlements,
    /// Symbols to stream, per asset class.
    pub symbols: HashMap<AssetClass, Vec<String>>,
    /// Anomaly detector tuning.
    pub detector: DetectorSettings,
    /// Connection handshake settings.
    pub connection: ConnectionSettings,
    /// Supervisor scheduling settings.
    pub supervisor: SupervisorSettings,
    /// Storage settings.
    pub storage: StorageSettings,
}

impl MonitorConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `POLYGON_API_KEY` is missing or empty.
    /// Everything else has a default; invalid tier strings fall back to
    /// `none` with a logged warning, matching the "blocked classes are
    /// reported, not fatal" policy.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("POLYGON_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("POLYGON_API_KEY".to_string()))?;
        let credential = Credential::new(api_key)?;

        let mut tiers = HashMap::new();
        let mut endpoint_overrides = HashMap::new();
        let mut symbols = HashMap::new();
        let mut threshold_overrides = HashMap::new();

        for asset_class in AssetClass::ALL {
            let suffix = asset_class.env_suffix();

            if let Ok(raw) = std::env::var(format!("POLYGON_TIER_{suffix}")) {
                let tier = raw.parse::<SubscriptionTier>().unwrap_or_else(|()| {
                    tracing::warn!(
                        asset_class = %asset_class,
                        tier = %raw,
                        "invalid subscription tier, defaulting to none"
                    );
                    SubscriptionTier::None
                });
                tiers.insert(asset_class, tier);
            }

            if let Ok(url) = std::env::var(format!("POLYGON_WS_URL_{suffix}"))
                && !url.is_empty()
            {
                endpoint_overrides.insert(asset_class, url);
            }

            let configured = std::env::var(format!("STREAM_MONITOR_SYMBOLS_{suffix}"))
                .ok()
                .map_or_else(
                    || Self::default_symbols(asset_class),
                    |raw| parse_symbol_list(&raw),
                );
            if !configured.is_empty() {
                symbols.insert(asset_class, configured);
            }

            if let Ok(raw) = std::env::var(format!("STREAM_MONITOR_VOLUME_THRESHOLD_{suffix}"))
                && let Ok(threshold) = raw.parse::<f64>()
                && threshold > 0.0
            {
                threshold_overrides.insert(asset_class, threshold);
            }
        }

        let connection = ConnectionSettings {
            connect_timeout: parse_env_duration_secs(
                "STREAM_MONITOR_CONNECT_TIMEOUT_SECS",
                ConnectionSettings::default().connect_timeout,
            ),
        };

        let supervisor = SupervisorSettings {
            health_interval: parse_env_duration_secs(
                "STREAM_MONITOR_HEALTH_INTERVAL_SECS",
                SupervisorSettings::default().health_interval,
            ),
            shutdown_timeout: parse_env_duration_secs(
                "STREAM_MONITOR_SHUTDOWN_TIMEOUT_SECS",
                SupervisorSettings::default().shutdown_timeout,
            ),
            trading_window: TradingWindow::from_env().unwrap_or_default(),
        };

        let storage = StorageSettings {
            db_path: std::env::var("STREAM_MONITOR_DB_PATH")
                .map_or_else(|_| StorageSettings::default().db_path, PathBuf::from),
            retention_days: parse_env_u32(
                "STREAM_MONITOR_RETENTION_DAYS",
                StorageSettings::default().retention_days,
            ),
        };

        Ok(Self {
            credential,
            entitlements: Entitlements::new(tiers, endpoint_overrides),
            symbols,
            detector: DetectorSettings::with_overrides(threshold_overrides),
            connection,
            supervisor,
            storage,
        })
    }

    /// Built-in symbol defaults for the classes the monitor streams out of
    /// the box; other classes stream only when symbols are configured.
    #[must_use]
    pub fn default_symbols(asset_class: AssetClass) -> Vec<String> {
        let defaults: &[&str] = match asset_class {
            AssetClass::Equities => &["AAPL", "GOOGL", "MSFT", "TSLA", "VOO"],
            AssetClass::Crypto => &[
                "BTC-USD", "ETH-USD", "ADA-USD", "SOL-USD", "DOT-USD", "DOGE-USD",
            ],
            _ => &[],
        };
        defaults.iter().map(ToString::to_string).collect()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has an empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

// =============================================================================
// Parse Helpers
// =============================================================================

/// Split a comma-separated symbol list, dropping empty entries.
fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

// =============================================================================
// Tests
// =============================================================================
