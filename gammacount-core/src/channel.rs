//! Reaction channels: countable gamma lines of activated samples.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One countable gamma line of one sample.
///
/// Channels sharing a `foil_group` sit on the detector together and are
/// counted simultaneously.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReactionChannel {
    /// Label for reports, e.g. `"Al27(n,a)Na24"`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    /// Identifier shared by channels counted together.
    pub foil_group: String,
    /// Gamma energy in keV.
    pub gamma_energy: f64,
    /// Half-life in seconds.
    pub half_life: f64,
    /// Activity at the start of counting.
    pub init_activity: f64,
    /// One-sigma uncertainty of `init_activity`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub activity_uncertainty: f64,
    /// Foil radius in cm.
    #[cfg_attr(feature = "serde", serde(default))]
    pub foil_radius: f64,
    /// Source-detector distance in cm; also selects the efficiency curve.
    #[cfg_attr(feature = "serde", serde(default = "default_distance"))]
    pub detector_distance: f64,
    /// Target relative counting uncertainty, e.g. 0.01 for 1%.
    #[cfg_attr(feature = "serde", serde(default = "default_rel_stat"))]
    pub rel_stat_target: f64,
}

#[cfg(feature = "serde")]
fn default_distance() -> f64 {
    ReactionChannel::DEFAULT_DISTANCE
}

#[cfg(feature = "serde")]
fn default_rel_stat() -> f64 {
    ReactionChannel::DEFAULT_REL_STAT
}

impl ReactionChannel {
    /// Default counting distance (cm).
    pub const DEFAULT_DISTANCE: f64 = 100.0;
    /// Default relative statistics target.
    pub const DEFAULT_REL_STAT: f64 = 0.01;

    /// Creates a point-like channel at the default distance with a 1% target.
    pub fn new(
        foil_group: impl Into<String>,
        gamma_energy: f64,
        half_life: f64,
        init_activity: f64,
    ) -> Self {
        let foil_group = foil_group.into();
        Self {
            name: foil_group.clone(),
            foil_group,
            gamma_energy,
            half_life,
            init_activity,
            activity_uncertainty: 0.0,
            foil_radius: 0.0,
            detector_distance: Self::DEFAULT_DISTANCE,
            rel_stat_target: Self::DEFAULT_REL_STAT,
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the activity uncertainty.
    #[must_use]
    pub fn with_uncertainty(mut self, sigma: f64) -> Self {
        self.activity_uncertainty = sigma;
        self
    }

    /// Sets the foil radius.
    #[must_use]
    pub fn with_foil_radius(mut self, radius: f64) -> Self {
        self.foil_radius = radius;
        self
    }

    /// Sets the counting distance.
    #[must_use]
    pub fn with_distance(mut self, distance: f64) -> Self {
        self.detector_distance = distance;
        self
    }

    /// Sets the relative statistics target.
    #[must_use]
    pub fn with_rel_stat(mut self, target: f64) -> Self {
        self.rel_stat_target = target;
        self
    }

    /// Checks the physical invariants of the channel.
    ///
    /// # Errors
    /// Returns `InvalidParameter` naming the first violated field.
    pub fn validate(&self) -> Result<()> {
        Error::ensure(
            self.half_life.is_finite() && self.half_life > 0.0,
            "half_life",
            format!("{}: must be greater than zero", self.name),
        )?;
        Error::ensure(
            self.gamma_energy.is_finite() && self.gamma_energy > 0.0,
            "gamma_energy",
            format!("{}: must be greater than zero", self.name),
        )?;
        Error::ensure(
            self.init_activity.is_finite() && self.init_activity >= 0.0,
            "init_activity",
            format!("{}: must be non-negative", self.name),
        )?;
        Error::ensure(
            self.activity_uncertainty.is_finite() && self.activity_uncertainty >= 0.0,
            "activity_uncertainty",
            format!("{}: must be non-negative", self.name),
        )?;
        Error::ensure(
            self.foil_radius.is_finite() && self.foil_radius >= 0.0,
            "foil_radius",
            format!("{}: must be non-negative", self.name),
        )?;
        Error::ensure(
            self.rel_stat_target > 0.0 && self.rel_stat_target <= 1.0,
            "rel_stat_target",
            format!("{}: must lie in (0, 1]", self.name),
        )
    }
}
