//! gammacount-core: Core types for gamma counting analysis.
//!
//! This crate provides the physical building blocks shared by the
//! counting-schedule optimiser and the photopeak fitting engine:
//! radioactive decay, detector geometry, efficiency curves, reaction
//! channels and spectra.
//!

pub mod channel;
pub mod decay;
pub mod diagnostics;
pub mod efficiency;
pub mod error;
pub mod geometry;
pub mod spectrum;
pub mod units;

pub use channel::ReactionChannel;
pub use decay::{activity, decay, decay_constant, half_life, production_decay};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use efficiency::{EfficiencyModel, EfficiencyTable};
pub use error::{Error, Result};
pub use geometry::{
    fractional_solid_angle, solid_angle, solid_angle_correction, volume_solid_angle,
};
pub use spectrum::{EnergyCalibration, Spectrum};
pub use units::{ActivityUnit, CURIE_IN_BECQUEREL};

/// Count time reported for a channel that cannot reach its precision target
/// in finite time.
pub const INFEASIBLE_TIME: f64 = 1e99;
