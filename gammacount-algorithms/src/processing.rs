//! Spectrum-level analysis: detect peaks, size their windows, fit each one.
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

use gammacount_core::{Result, Spectrum};
use rayon::prelude::*;

use crate::peak_find::find_peaks;
use crate::peak_fit::{FitResult, PeakFitConfig, PeakFitter};
use crate::windows::{compute_windows, PeakWindow, WindowConfig};

/// Settings for [`analyze_spectrum`].
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisConfig {
    /// Channels below this are ignored by peak detection.
    pub cut_channel: u32,
    /// Detection threshold, relative to the counts range above the cut.
    pub threshold: f64,
    /// Minimum separation of detected peaks, in channels.
    pub min_distance: usize,
    pub windows: WindowConfig,
    pub fit: PeakFitConfig,
    /// Fit windows on the rayon pool.
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cut_channel: 0,
            threshold: 0.5,
            min_distance: 10,
            windows: WindowConfig::default(),
            fit: PeakFitConfig::default(),
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    #[must_use]
    pub fn with_cut_channel(mut self, channel: u32) -> Self {
        self.cut_channel = channel;
        self
    }

    #[must_use]
    pub fn with_detection(mut self, threshold: f64, min_distance: usize) -> Self {
        self.threshold = threshold;
        self.min_distance = min_distance;
        self
    }

    #[must_use]
    pub fn with_windows(mut self, windows: WindowConfig) -> Self {
        self.windows = windows;
        self
    }

    #[must_use]
    pub fn with_fit(mut self, fit: PeakFitConfig) -> Self {
        self.fit = fit;
        self
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Fit outcome for one detected peak.
#[derive(Clone, Debug, PartialEq)]
pub struct PeakReport {
    /// Peak channel number.
    pub peak: i64,
    /// Calibrated energy of the peak channel (keV).
    pub energy: f64,
    pub window: PeakWindow,
    pub outcome: Result<FitResult>,
}

impl PeakReport {
    /// The fit, if it succeeded.
    #[must_use]
    pub fn fit(&self) -> Option<&FitResult> {
        self.outcome.as_ref().ok()
    }
}

/// Channel numbers of the peaks detected at or above `config.cut_channel`.
#[must_use]
pub fn detect_peaks(spectrum: &Spectrum, config: &AnalysisConfig) -> Vec<i64> {
    let start = spectrum
        .channels
        .partition_point(|&ch| ch < config.cut_channel);
    let counts = &spectrum.counts[start..];
    find_peaks(counts, config.threshold, config.min_distance)
        .into_iter()
        .map(|i| i64::from(spectrum.channels[start + i]))
        .collect()
}

/// Detects peaks in `spectrum` and fits each one within its window.
///
/// A failed fit does not stop the analysis; it is reported in that peak's
/// [`PeakReport::outcome`]. Reports are in ascending peak order whether or
/// not the fits run in parallel.
///
/// # Errors
/// Returns `InvalidParameter` if the window configuration is invalid.
pub fn analyze_spectrum(spectrum: &Spectrum, config: &AnalysisConfig) -> Result<Vec<PeakReport>> {
    let peaks = detect_peaks(spectrum, config);
    let windows: Vec<PeakWindow> = compute_windows(&peaks, &config.windows)?
        .into_values()
        .collect();
    log::info!("fitting {} peaks", windows.len());

    let fitter = PeakFitter::new(config.fit.clone());
    let fit_one = |window: &PeakWindow| {
        let outcome = fitter.fit_window(spectrum, window);
        if let Err(e) = &outcome {
            log::warn!("peak at channel {}: {e}", window.peak);
        }
        let energy = u32::try_from(window.peak)
            .map_or(f64::NAN, |ch| spectrum.energy(f64::from(ch)));
        PeakReport {
            peak: window.peak,
            energy,
            window: *window,
            outcome,
        }
    };

    let reports = if config.parallel {
        windows.par_iter().map(fit_one).collect()
    } else {
        windows.iter().map(fit_one).collect()
    };
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_model::LineShape;

    fn two_peak_spectrum() -> Spectrum {
        let peak = |amplitude, centroid| LineShape {
            amplitude,
            centroid,
            width: 3.0,
            skew_amplitude: amplitude / 25.0,
            skew_range: 1.5,
            ..LineShape::default()
        };
        let (a, b) = (peak(1200.0, 300.0), peak(900.0, 700.0));
        let counts = (0..1024)
            .map(|ch| {
                let x = f64::from(ch);
                (a.peak(x) + b.peak(x) + 20.0).round()
            })
            .collect();
        Spectrum::from_counts(counts)
    }

    #[test]
    fn test_detects_and_fits_every_peak() {
        let spectrum = two_peak_spectrum();
        let config = AnalysisConfig::default();
        assert_eq!(detect_peaks(&spectrum, &config), vec![300, 700]);

        let reports = analyze_spectrum(&spectrum, &config).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!((reports[0].window.low, reports[0].window.high), (200, 400));
        for (report, centroid) in reports.iter().zip([300.0, 700.0]) {
            let fit = report.fit().unwrap();
            assert!((fit.shape.centroid - centroid).abs() < 0.5);
        }
    }

    #[test]
    fn test_parallel_matches_serial() {
        let spectrum = two_peak_spectrum();
        let config = AnalysisConfig::default();
        let parallel = analyze_spectrum(&spectrum, &config).unwrap();
        let serial = config.with_parallel(false);
        assert_eq!(parallel, analyze_spectrum(&spectrum, &serial).unwrap());
    }

    #[test]
    fn test_cut_channel_skips_low_peaks() {
        let spectrum = two_peak_spectrum();
        let config = AnalysisConfig::default().with_cut_channel(500);
        assert_eq!(detect_peaks(&spectrum, &config), vec![700]);
    }

    #[test]
    fn test_empty_spectrum() {
        let config = AnalysisConfig::default();
        let reports = analyze_spectrum(&Spectrum::default(), &config).unwrap();
        assert!(reports.is_empty());
    }
}
