//! Gamma spectra as handed over by the spectrum readers.

use chrono::NaiveDateTime;

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Quadratic energy calibration `E = a·ch² + b·ch + c` (keV).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnergyCalibration {
    /// Quadratic term.
    pub a: f64,
    /// Linear term.
    pub b: f64,
    /// Offset.
    pub c: f64,
}

impl Default for EnergyCalibration {
    fn default() -> Self {
        Self {
            a: 0.0,
            b: 1.0,
            c: 0.0,
        }
    }
}

impl EnergyCalibration {
    /// Creates a calibration from its three terms.
    #[must_use]
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    /// Energy of a (possibly fractional) channel.
    #[must_use]
    pub fn energy(&self, channel: f64) -> f64 {
        (self.a * channel + self.b) * channel + self.c
    }
}

/// A digitised gamma spectrum.
///
/// `channels` and `counts` are parallel; channels are strictly increasing.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Spectrum {
    /// Channel numbers.
    pub channels: Vec<u32>,
    /// Counts per channel.
    pub counts: Vec<f64>,
    /// Energy calibration.
    pub calibration: EnergyCalibration,
    /// Live time in seconds.
    pub live_time: f64,
    /// Real (clock) time in seconds.
    pub real_time: f64,
    /// Start of the acquisition.
    pub timestamp: Option<NaiveDateTime>,
}

impl Spectrum {
    /// Creates a spectrum with channels numbered from zero.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn from_counts(counts: Vec<f64>) -> Self {
        Self {
            channels: (0..counts.len() as u32).collect(),
            counts,
            ..Self::default()
        }
    }

    /// Creates a spectrum from parallel arrays.
    ///
    /// # Errors
    /// Returns `InvalidParameter` if lengths differ, channels are not strictly
    /// increasing, or a count is negative.
    pub fn new(channels: Vec<u32>, counts: Vec<f64>) -> Result<Self> {
        Error::ensure(
            channels.len() == counts.len(),
            "counts",
            format!("{} counts for {} channels", counts.len(), channels.len()),
        )?;
        Error::ensure(
            channels.windows(2).all(|w| w[0] < w[1]),
            "channels",
            "must be strictly increasing",
        )?;
        Error::ensure(
            counts.iter().all(|c| c.is_finite() && *c >= 0.0),
            "counts",
            "must be finite and non-negative",
        )?;
        Ok(Self {
            channels,
            counts,
            ..Self::default()
        })
    }

    /// Sets the calibration.
    #[must_use]
    pub fn with_calibration(mut self, calibration: EnergyCalibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Sets live and real time.
    #[must_use]
    pub fn with_times(mut self, live_time: f64, real_time: f64) -> Self {
        self.live_time = live_time;
        self.real_time = real_time;
        self
    }

    /// Sets the acquisition timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if the spectrum has no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total counts.
    #[must_use]
    pub fn total_counts(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Energy of a channel number.
    #[must_use]
    pub fn energy(&self, channel: f64) -> f64 {
        self.calibration.energy(channel)
    }

    /// Index range covering channels `low..=high`, clipped to the spectrum.
    #[must_use]
    pub fn index_range(&self, low: i64, high: i64) -> std::ops::Range<usize> {
        let lo = self.channels.partition_point(|&ch| i64::from(ch) < low);
        let hi = self.channels.partition_point(|&ch| i64::from(ch) <= high);
        lo..hi.max(lo)
    }

    /// Channels (as `f64`) and counts for channels `low..=high`.
    #[must_use]
    pub fn slice(&self, low: i64, high: i64) -> (Vec<f64>, Vec<f64>) {
        let range = self.index_range(low, high);
        let x = self.channels[range.clone()]
            .iter()
            .map(|&ch| f64::from(ch))
            .collect();
        (x, self.counts[range].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration() {
        let cal = EnergyCalibration::new(3.468_863e-8, 0.383_891_8, 0.187_410_5);
        let e = cal.energy(1000.0);
        assert!((e - (3.468_863e-2 + 383.8918 + 0.187_410_5)).abs() < 1e-9);
        let identity = EnergyCalibration::default().energy(42.0);
        assert!((identity - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_new_validates() {
        assert!(Spectrum::new(vec![0, 1, 2], vec![1.0, 2.0]).is_err());
        assert!(Spectrum::new(vec![0, 2, 1], vec![1.0, 2.0, 3.0]).is_err());
        assert!(Spectrum::new(vec![0, 1], vec![1.0, -2.0]).is_err());
        let spectrum = Spectrum::new(vec![1, 2, 3], vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(spectrum.len(), 3);
        assert!((spectrum.total_counts() - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_slice_clips_to_spectrum() {
        let spectrum = Spectrum::from_counts((0..100).map(f64::from).collect());
        let (x, y) = spectrum.slice(-20, 4);
        assert_eq!(x, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(y, vec![0.0, 1.0, 2.0, 3.0, 4.0]);

        let (x, _) = spectrum.slice(95, 300);
        assert_eq!(x.len(), 5);

        assert!(spectrum.index_range(200, 300).is_empty());
        assert_eq!(spectrum.index_range(10, 19), 10..20);
    }
}
