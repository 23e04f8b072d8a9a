//! Fitting windows around detected peaks.
//!
//! Each peak gets `max_window` channels on either side. A side facing a
//! neighbour closer than `max_window + peak_width` is pulled in so that it
//! stops `peak_width` channels short of the neighbour, but never below
//! `min_window`. The outermost peaks keep `max_window` on their open side.
#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

use std::collections::BTreeMap;

use gammacount_core::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Window sizing in channels.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WindowConfig {
    /// Half-width of an unobstructed window.
    pub max_window: i64,
    /// Clearance kept from a neighbouring peak.
    pub peak_width: i64,
    /// Smallest half-width on either side.
    pub min_window: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_window: 100,
            peak_width: 15,
            min_window: 20,
        }
    }
}

impl WindowConfig {
    #[must_use]
    pub fn with_max_window(mut self, channels: i64) -> Self {
        self.max_window = channels;
        self
    }

    #[must_use]
    pub fn with_peak_width(mut self, channels: i64) -> Self {
        self.peak_width = channels;
        self
    }

    #[must_use]
    pub fn with_min_window(mut self, channels: i64) -> Self {
        self.min_window = channels;
        self
    }

    fn validate(&self) -> Result<()> {
        Error::ensure(self.min_window >= 1, "min_window", "must be at least 1")?;
        Error::ensure(
            self.max_window >= self.min_window,
            "max_window",
            format!(
                "must be at least min_window ({}), got {}",
                self.min_window, self.max_window
            ),
        )?;
        Error::ensure(self.peak_width >= 0, "peak_width", "must be non-negative")
    }
}

/// Channel range `low..=high` around `peak`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakWindow {
    pub peak: i64,
    pub low: i64,
    pub high: i64,
}

impl PeakWindow {
    /// Number of channels covered.
    pub fn len(&self) -> i64 {
        self.high - self.low + 1
    }

    pub fn is_empty(&self) -> bool {
        self.high < self.low
    }

    pub fn contains(&self, channel: i64) -> bool {
        (self.low..=self.high).contains(&channel)
    }

    /// Channels below the peak.
    pub fn low_side(&self) -> i64 {
        self.peak - self.low
    }

    /// Channels above the peak.
    pub fn high_side(&self) -> i64 {
        self.high - self.peak
    }
}

/// Computes a window for every peak, keyed by peak channel.
///
/// Windows are not clipped to any spectrum range.
///
/// # Errors
/// Returns `InvalidParameter` if the peaks are not strictly ascending or the
/// configuration is inconsistent.
pub fn compute_windows(peaks: &[i64], config: &WindowConfig) -> Result<BTreeMap<i64, PeakWindow>> {
    config.validate()?;
    Error::ensure(
        peaks.windows(2).all(|w| w[0] < w[1]),
        "peaks",
        "must be strictly ascending",
    )?;

    let reach = config.max_window + config.peak_width;
    let windows = peaks
        .iter()
        .enumerate()
        .map(|(i, &peak)| {
            let low = match i.checked_sub(1).map(|j| peaks[j]) {
                Some(previous) if peak - previous < reach => {
                    peak - (peak - previous - config.peak_width).max(config.min_window)
                }
                _ => peak - config.max_window,
            };
            let high = match peaks.get(i + 1) {
                Some(&next) if next - peak < reach => {
                    peak + (next - peak - config.peak_width).max(config.min_window)
                }
                _ => peak + config.max_window,
            };
            (peak, PeakWindow { peak, low, high })
        })
        .collect();
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEAKS: [i64; 17] = [
        138, 160, 171, 182, 195, 210, 291, 302, 418, 720, 789, 800, 869, 927, 1007, 1018, 1138,
    ];

    fn bounds(windows: &BTreeMap<i64, PeakWindow>, peak: i64) -> (i64, i64) {
        let w = windows[&peak];
        (w.low, w.high)
    }

    #[test]
    fn test_default_windows() {
        let windows = compute_windows(&PEAKS, &WindowConfig::default()).unwrap();
        assert_eq!(windows.len(), PEAKS.len());
        assert_eq!(bounds(&windows, 210), (190, 276));
        assert_eq!(bounds(&windows, 1018), (998, 1118));
        assert_eq!(bounds(&windows, 1138), (1038, 1238));
        assert_eq!(bounds(&windows, 138), (38, 158));
    }

    #[test]
    fn test_window_parameters() {
        let wide = WindowConfig::default().with_max_window(200);
        let windows = compute_windows(&PEAKS, &wide).unwrap();
        assert_eq!(bounds(&windows, 1138), (1033, 1338));

        let min = WindowConfig::default().with_min_window(25);
        let windows = compute_windows(&PEAKS, &min).unwrap();
        assert_eq!(bounds(&windows, 210), (185, 276));

        let width = WindowConfig::default().with_peak_width(25);
        let windows = compute_windows(&PEAKS, &width).unwrap();
        assert_eq!(bounds(&windows, 210), (190, 266));
    }

    #[test]
    fn test_isolated_peak() {
        let config = WindowConfig::default();
        let windows = compute_windows(&[500], &config).unwrap();
        assert_eq!(bounds(&windows, 500), (400, 600));
        assert_eq!(windows[&500].len(), 201);
        assert!(windows[&500].contains(400) && !windows[&500].contains(601));
        assert!(compute_windows(&[], &config).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_input() {
        let config = WindowConfig::default();
        let err = compute_windows(&[10, 5], &config).unwrap_err();
        assert!(err.is_invalid_parameter());
        assert!(compute_windows(&[10, 10], &config).is_err());

        let degenerate = config.clone().with_min_window(0);
        assert!(compute_windows(&[10], &degenerate).is_err());
        assert!(compute_windows(&[10], &config.with_max_window(5)).is_err());
    }
}
