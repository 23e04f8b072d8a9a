//! gammacount-algorithms: Counting schedules and photopeak fits.
//!
//! This crate provides the numerical kernel:
//! - **Count time** - Knoll fixed point for the live time reaching a precision target
//! - **Schedule** - exhaustive search over foil-group counting orders
//! - **Windows** - fitting windows around detected peaks
//! - **Peak fit** - two-stage bounded Levenberg-Marquardt fit of a nine-parameter line shape
//!

pub mod count_time;
pub mod line_model;
pub mod lm;
mod peak_find;
pub mod peak_fit;
mod permutations;
mod processing;
pub mod schedule;
pub mod special;
mod stats;
pub mod windows;

pub use count_time::{
    foil_count_time, CountTimeConfig, CountTimeRequest, CountTimeSolution, CountTimeSolver,
};
pub use line_model::{LineShape, PeakArea};
pub use lm::{Bounds, LeastSquaresProblem, LevenbergMarquardt, LmConfig, LmReport, Termination};
pub use peak_find::find_peaks;
pub use peak_fit::{FitResult, PeakFitConfig, PeakFitter};
pub use permutations::{factorial, nth_permutation, LexicographicPermutations};
pub use processing::{analyze_spectrum, detect_peaks, AnalysisConfig, PeakReport};
pub use schedule::{ChannelAssignment, GroupSlot, Schedule, ScheduleConfig, ScheduleOptimizer};
pub use stats::reduced_chi_square;
pub use windows::{compute_windows, PeakWindow, WindowConfig};
