//! Trading Hours Gate
//!
//! Local-time window that gates trading-hours-bound asset classes. Crypto
//! and other always-on classes never consult it.

use chrono::NaiveTime;

/// Fallback open/close used when parsing configuration fails.
const DEFAULT_OPEN: (u32, u32) = (9, 30);
const DEFAULT_CLOSE: (u32, u32) = (16, 0);

/// A daily local-time trading window.
///
/// Weekends and exchange holidays are not modeled; outside-hours restarts
/// are merely deferred, so an unnecessary connection attempt on a holiday
/// costs one reconnect cycle at worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    /// Session open (inclusive).
    pub open: NaiveTime,
    /// Session close (inclusive).
    pub close: NaiveTime,
}

impl Default for TradingWindow {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(DEFAULT_OPEN.0, DEFAULT_OPEN.1, 0)
                .unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(DEFAULT_CLOSE.0, DEFAULT_CLOSE.1, 0)
                .unwrap_or(NaiveTime::MIN),
        }
    }
}

impl TradingWindow {
    /// Build a window from explicit open/close times.
    #[must_use]
    pub const fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }

    /// Read `STREAM_MONITOR_MARKET_OPEN` / `STREAM_MONITOR_MARKET_CLOSE`
    /// (`HH:MM`); returns `None` when neither is set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let open = std::env::var("STREAM_MONITOR_MARKET_OPEN")
            .ok()
            .and_then(|raw| NaiveTime::parse_from_str(&raw, "%H:%M").ok());
        let close = std::env::var("STREAM_MONITOR_MARKET_CLOSE")
            .ok()
            .and_then(|raw| NaiveTime::parse_from_str(&raw, "%H:%M").ok());

        if open.is_none() && close.is_none() {
            return None;
        }

        let default = Self::default();
        Some(Self {
            open: open.unwrap_or(default.open),
            close: close.unwrap_or(default.close),
        })
    }

    /// Whether `time` falls inside the window. A close before the open is
    /// treated as an overnight session wrapping midnight.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.open <= self.close {
            self.open <= time && time <= self.close
        } else {
            time >= self.open || time <= self.close
        }
    }

    /// Whether the window is open right now, in local time.
    #[must_use]
    pub fn is_open_now(&self) -> bool {
        self.contains(chrono::Local::now().time())
    }
}

// =============================================================================
// Tests
// =============================================================================
