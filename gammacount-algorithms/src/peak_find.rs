//! Threshold peak detection on a counts vector.
#![allow(clippy::must_use_candidate, clippy::float_cmp)]

/// Indices of local maxima above a threshold.
///
/// `threshold` is relative to the data range: a point must exceed
/// `min + threshold·(max − min)`. A flat top counts as one peak at its
/// first point. Peaks within `min_distance` of a higher one are dropped.
/// The result is sorted by index.
pub fn find_peaks(y: &[f64], threshold: f64, min_distance: usize) -> Vec<usize> {
    if y.len() < 3 {
        return Vec::new();
    }
    let min = y.iter().copied().fold(f64::INFINITY, f64::min);
    let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let level = min + threshold * (max - min);

    let slopes = plateau_resolved_slopes(y);
    if slopes.iter().all(|&s| s == 0.0) {
        return Vec::new();
    }

    let mut peaks: Vec<usize> = (1..y.len() - 1)
        .filter(|&i| slopes[i - 1] > 0.0 && slopes[i] < 0.0 && y[i] > level)
        .collect();

    if peaks.len() > 1 && min_distance > 1 {
        peaks.sort_by(|&a, &b| y[b].total_cmp(&y[a]).then(a.cmp(&b)));
        let mut suppressed = vec![false; y.len()];
        let mut kept = Vec::with_capacity(peaks.len());
        for peak in peaks {
            if suppressed[peak] {
                continue;
            }
            kept.push(peak);
            let lo = peak.saturating_sub(min_distance);
            let hi = (peak + min_distance).min(y.len() - 1);
            suppressed[lo..=hi].fill(true);
        }
        kept.sort_unstable();
        return kept;
    }
    peaks
}

/// First differences with zero slopes replaced by the nearest non-zero slope
/// to the right (or, failing that, to the left), so that a plateau reads as
/// a single rise or fall.
fn plateau_resolved_slopes(y: &[f64]) -> Vec<f64> {
    let mut slopes: Vec<f64> = y.windows(2).map(|w| w[1] - w[0]).collect();
    let mut next_nonzero = 0.0;
    for s in slopes.iter_mut().rev() {
        if *s == 0.0 {
            *s = next_nonzero;
        } else {
            next_nonzero = *s;
        }
    }
    let mut previous_nonzero = 0.0;
    for s in &mut slopes {
        if *s == 0.0 {
            *s = previous_nonzero;
        } else {
            previous_nonzero = *s;
        }
    }
    slopes
}
