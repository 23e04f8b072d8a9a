use gammacount_algorithms::{compute_windows, WindowConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_peaks(rng: &mut StdRng) -> Vec<i64> {
    let mut peak = rng.gen_range(0..200);
    (0..rng.gen_range(1..30))
        .map(|_| {
            peak += rng.gen_range(1..250);
            peak
        })
        .collect()
}

#[test]
fn test_windows_keep_clear_of_neighbours() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let configs = [
        WindowConfig::default(),
        WindowConfig::default().with_max_window(200),
        WindowConfig::default()
            .with_peak_width(25)
            .with_min_window(5),
    ];
    for _ in 0..200 {
        let peaks = random_peaks(&mut rng);
        for config in &configs {
            let windows = compute_windows(&peaks, config).unwrap();
            assert_eq!(windows.len(), peaks.len());

            for (i, &peak) in peaks.iter().enumerate() {
                let w = windows[&peak];
                assert!(w.low < peak && peak < w.high, "{w:?}");
                let (low, high) = (w.low_side(), w.high_side());
                let (min, max) = (config.min_window, config.max_window);
                assert!(low <= max && high <= max, "{w:?}");
                assert!(low >= min && high >= min, "{w:?}");

                let next = peaks.get(i + 1).map(|&next| next - w.high);
                assert!(side_is_valid(high, next, config), "{w:?}");
                let previous = i.checked_sub(1).map(|j| w.low - peaks[j]);
                assert!(side_is_valid(low, previous, config), "{w:?}");
            }
        }
    }
}

/// A side with no neighbour spans `max_window`. Otherwise it is untouched,
/// clear of the neighbour by `peak_width`, or held at `min_window`.
fn side_is_valid(side: i64, gap: Option<i64>, config: &WindowConfig) -> bool {
    match gap {
        None => side == config.max_window,
        Some(gap) => {
            side == config.max_window || gap == config.peak_width || side == config.min_window
        }
    }
}

#[test]
fn test_distant_peaks_get_full_windows() {
    let config = WindowConfig::default();
    let peaks = [100, 400, 700];
    let windows = compute_windows(&peaks, &config).unwrap();
    for peak in peaks {
        assert_eq!(windows[&peak].low_side(), 100);
        assert_eq!(windows[&peak].high_side(), 100);
    }
}
