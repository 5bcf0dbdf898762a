//! Volume Anomaly Detection
//!
//! Keeps a bounded window of recent observations per symbol and flags ticks
//! whose volume is a configurable multiple of the rolling average.
//!
//! Detection is per-symbol with no cross-symbol state, so one detector per
//! stream worker is enough; ordering only matters within a single symbol.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::market::{AnomalyEvent, AnomalyKind, AnomalyStatus, AssetClass, Symbol, Tick};

// =============================================================================
// Configuration
// =============================================================================

/// Tuning knobs for one detector instance.
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Maximum observations retained per symbol; oldest evicted first.
    pub window_capacity: usize,
    /// Minimum prior observations before any check runs.
    pub min_history: usize,
    /// Volume multiplier at or above which an anomaly fires.
    pub volume_threshold: f64,
}

impl DetectorConfig {
    /// Prior observations required before the first check.
    pub const DEFAULT_MIN_HISTORY: usize = 5;

    /// Class-specific defaults.
    ///
    /// Crypto runs a shorter window and a lower threshold: baseline volume
    /// is far spikier there, and a long window would smooth real events
    /// away while a 3x bar would fire constantly.
    #[must_use]
    pub const fn for_asset_class(asset_class: AssetClass) -> Self {
        match asset_class {
            AssetClass::Crypto => Self {
                window_capacity: 10,
                min_history: Self::DEFAULT_MIN_HISTORY,
                volume_threshold: 2.0,
            },
            _ => Self {
                window_capacity: 20,
                min_history: Self::DEFAULT_MIN_HISTORY,
                volume_threshold: 3.0,
            },
        }
    }

    /// Override the volume threshold, keeping the class defaults otherwise.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.volume_threshold = threshold;
        self
    }
}

// =============================================================================
// Detector
// =============================================================================

/// One retained observation.
#[derive(Debug, Clone, Copy)]
struct Observation {
    volume: f64,
    #[allow(dead_code)]
    price: Decimal,
    #[allow(dead_code)]
    timestamp: DateTime<Utc>,
}

/// Sliding-window volume spike detector.
///
/// Feed it every decoded tick via [`AnomalyDetector::observe`]; it returns
/// an [`AnomalyEvent`] when the newest volume clears the threshold against
/// the average of the prior window.
#[derive(Debug)]
pub struct AnomalyDetector {
    config: DetectorConfig,
    windows: HashMap<Symbol, VecDeque<Observation>>,
}

impl AnomalyDetector {
    /// Create a detector with the given configuration.
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    /// Number of symbols currently tracked.
    #[must_use]
    pub fn tracked_symbols(&self) -> usize {
        self.windows.len()
    }

    /// Record a tick and check it against the symbol's rolling baseline.
    ///
    /// Ticks with non-positive price or volume are placeholder/malformed
    /// data and are ignored entirely; they neither enter the window nor
    /// trigger a check.
    pub fn observe(&mut self, tick: &Tick) -> Option<AnomalyEvent> {
        if tick.volume <= 0.0 || tick.price <= Decimal::ZERO {
            return None;
        }

        let window = self.windows.entry(tick.symbol.clone()).or_default();
        window.push_back(Observation {
            volume: tick.volume,
            price: tick.price,
            timestamp: tick.timestamp,
        });
        if window.len() > self.config.window_capacity {
            window.pop_front();
        }

        let prior = window.len() - 1;
        if prior < self.config.min_history {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let average = window
            .iter()
            .take(prior)
            .map(|obs| obs.volume)
            .sum::<f64>()
            / prior as f64;
        if average <= 0.0 {
            return None;
        }

        let multiplier = tick.volume / average;
        if multiplier < self.config.volume_threshold {
            return None;
        }

        Some(Self::volume_spike(tick, multiplier, average))
    }

    /// Assemble the event for a triggered check.
    fn volume_spike(tick: &Tick, multiplier: f64, average: f64) -> AnomalyEvent {
        let details = serde_json::json!({
            "type": AnomalyKind::VolumeSpike,
            "symbol": tick.symbol,
            "asset_class": tick.asset_class,
            "multiplier": multiplier,
            "current_volume": tick.volume,
            "average_volume": average,
            "price": tick.price,
            "observed_at": tick.timestamp,
        });

        AnomalyEvent {
            start_time: Utc::now(),
            end_time: None,
            symbol: tick.symbol.clone(),
            asset_class: tick.asset_class,
            kind: AnomalyKind::VolumeSpike,
            multiplier,
            current_value: tick.volume,
            average_value: average,
            status: AnomalyStatus::Detected,
            details: details.to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, volume: f64) -> Tick {
        Tick {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            asset_class: AssetClass::Equities,
            price: Decimal::new(10_000, 2),
            volume,
            open: None,
            high: None,
            low: None,
            vwap: None,
            raw: String::new(),
        }
    }

    fn detector() -> AnomalyDetector {
        AnomalyDetector::new(DetectorConfig::for_asset_class(AssetClass::Equities))
    }

    #[test]
    fn five_flat_bars_then_a_spike_fires_once() {
        let mut detector = detector();
        let mut events = Vec::new();

        for volume in [100.0, 100.0, 100.0, 100.0, 100.0, 400.0] {
            if let Some(event) = detector.observe(&tick("AAPL", volume)) {
                events.push(event);
            }
        }

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!((event.multiplier - 4.0).abs() < f64::EPSILON);
        assert!((event.current_value - 400.0).abs() < f64::EPSILON);
        assert!((event.average_value - 100.0).abs() < f64::EPSILON);
        assert_eq!(event.kind, AnomalyKind::VolumeSpike);
        assert_eq!(event.status, AnomalyStatus::Detected);
        assert!(event.end_time.is_none());
    }

    #[test]
    fn insufficient_history_never_fires() {
        let mut detector = detector();

        for volume in [100.0, 100.0, 100.0, 400.0] {
            assert!(detector.observe(&tick("AAPL", volume)).is_none());
        }
    }

    #[test]
    fn below_threshold_stays_quiet() {
        let mut detector = detector();

        for volume in [100.0, 100.0, 100.0, 100.0, 100.0, 250.0] {
            assert!(detector.observe(&tick("AAPL", volume)).is_none());
        }
    }

    #[test]
    fn non_positive_volume_is_ignored() {
        let mut detector = detector();

        for _ in 0..10 {
            assert!(detector.observe(&tick("AAPL", 0.0)).is_none());
            assert!(detector.observe(&tick("AAPL", -5.0)).is_none());
        }
        // Nothing entered the window, so even a huge bar has no baseline.
        assert!(detector.observe(&tick("AAPL", 1_000_000.0)).is_none());
    }

    #[test]
    fn non_positive_price_is_ignored() {
        let mut detector = detector();
        let mut bad = tick("AAPL", 500.0);
        bad.price = Decimal::ZERO;

        for _ in 0..10 {
            assert!(detector.observe(&bad).is_none());
        }
        assert_eq!(detector.tracked_symbols(), 0);
    }

    #[test]
    fn symbols_are_tracked_independently() {
        let mut detector = detector();

        for volume in [100.0, 100.0, 100.0, 100.0, 100.0] {
            assert!(detector.observe(&tick("AAPL", volume)).is_none());
            assert!(detector.observe(&tick("TSLA", volume)).is_none());
        }

        // A spike in one symbol must not fire for the other.
        assert!(detector.observe(&tick("AAPL", 400.0)).is_some());
        assert!(detector.observe(&tick("TSLA", 110.0)).is_none());
        assert_eq!(detector.tracked_symbols(), 2);
    }

    #[test]
    fn window_evicts_oldest_observations() {
        let config = DetectorConfig {
            window_capacity: 6,
            min_history: DetectorConfig::DEFAULT_MIN_HISTORY,
            volume_threshold: 3.0,
        };
        let mut detector = AnomalyDetector::new(config);

        // Fill the window with large bars, then let them age out.
        for _ in 0..6 {
            let _ = detector.observe(&tick("AAPL", 1_000.0));
        }
        for _ in 0..6 {
            let _ = detector.observe(&tick("AAPL", 100.0));
        }

        // The old 1000-volume bars are gone, so 400 is a clean 4x spike.
        let event = detector.observe(&tick("AAPL", 400.0));
        assert!(event.is_some());
    }

    #[test]
    fn crypto_defaults_are_tighter() {
        let crypto = DetectorConfig::for_asset_class(AssetClass::Crypto);
        let equities = DetectorConfig::for_asset_class(AssetClass::Equities);

        assert!(crypto.volume_threshold < equities.volume_threshold);
        assert!(crypto.window_capacity < equities.window_capacity);
    }

    #[test]
    fn crypto_threshold_fires_at_two_x() {
        let mut detector = AnomalyDetector::new(DetectorConfig::for_asset_class(AssetClass::Crypto));

        let mut spike = None;
        for volume in [50.0, 50.0, 50.0, 50.0, 50.0, 100.0] {
            spike = detector.observe(&tick("BTC-USD", volume));
        }
        assert!(spike.is_some());
    }
}
