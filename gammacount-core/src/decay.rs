//! Radioactive decay.
//!
//! Pure functions over half-lives in seconds. Every function validates its
//! physical inputs and returns [`Error::InvalidParameter`] instead of
//! clamping them.

use std::f64::consts::LN_2;

use crate::error::{Error, Result};
use crate::units::ActivityUnit;

fn check_half_life(half_life: f64) -> Result<()> {
    Error::ensure(
        half_life.is_finite() && half_life > 0.0,
        "half_life",
        format!("must be greater than zero, got {half_life}"),
    )
}

fn check_population(n: f64) -> Result<()> {
    Error::ensure(
        n.is_finite() && n >= 0.0,
        "n",
        format!("must be greater than or equal to zero, got {n}"),
    )
}

fn check_non_negative(name: &'static str, value: f64) -> Result<()> {
    Error::ensure(
        value.is_finite() && value >= 0.0,
        name,
        format!("must be greater than or equal to zero, got {value}"),
    )
}

/// Decay constant `λ = ln 2 / half_life` in 1/s.
///
/// # Errors
/// Returns `InvalidParameter` if `half_life <= 0`.
pub fn decay_constant(half_life: f64) -> Result<f64> {
    check_half_life(half_life)?;
    Ok(LN_2 / half_life)
}

/// Half-life for a decay constant.
///
/// # Errors
/// Returns `InvalidParameter` if `decay_constant <= 0`.
pub fn half_life(decay_constant: f64) -> Result<f64> {
    Error::ensure(
        decay_constant.is_finite() && decay_constant > 0.0,
        "decay_constant",
        format!("must be greater than zero, got {decay_constant}"),
    )?;
    Ok(LN_2 / decay_constant)
}

/// Activity `λ·n·e^{-λt}` of `n` atoms after `t` seconds.
///
/// # Errors
/// Returns `InvalidParameter` for a non-positive half-life or negative `n`/`t`.
pub fn activity(half_life: f64, n: f64, t: f64) -> Result<f64> {
    check_population(n)?;
    check_non_negative("t", t)?;
    let lambda = decay_constant(half_life)?;
    Ok(lambda * n * (-lambda * t).exp())
}

/// Decays `n0` (given in `units`) for `t` seconds.
///
/// The result is in the base unit: Bq for activity units, atoms for
/// [`ActivityUnit::Atoms`]. Unrecognised units are tolerated with a logged
/// warning and treated as already being in the base unit.
///
/// # Errors
/// Returns `InvalidParameter` for a non-positive half-life or negative `n0`/`t`.
pub fn decay(half_life: f64, n0: f64, t: f64, units: &ActivityUnit) -> Result<f64> {
    check_population(n0)?;
    check_non_negative("t", t)?;
    let lambda = decay_constant(half_life)?;
    units.warn_if_unrecognized();
    Ok(n0 * units.to_base_factor() * (-lambda * t).exp())
}

/// Atoms present after irradiating for `t_irr` seconds and cooling for
/// `cooling` seconds.
///
/// Production is `rate · volume · source` atoms per second (reaction rate per
/// source particle per unit volume, times source strength and volume);
/// `n` atoms already present decay alongside.
///
/// # Errors
/// Returns `InvalidParameter` if any input is out of range (`volume` must be
/// strictly positive, all others non-negative).
pub fn production_decay(
    half_life: f64,
    n: f64,
    t_irr: f64,
    rate: f64,
    source: f64,
    volume: f64,
    cooling: f64,
) -> Result<f64> {
    check_population(n)?;
    check_non_negative("t_irr", t_irr)?;
    check_non_negative("cooling", cooling)?;
    check_non_negative("rate", rate)?;
    check_non_negative("source", source)?;
    Error::ensure(
        volume.is_finite() && volume > 0.0,
        "volume",
        format!("must be greater than zero, got {volume}"),
    )?;
    let lambda = decay_constant(half_life)?;

    let survive = (-lambda * t_irr).exp();
    let produced = rate * volume * source / lambda * -(-lambda * t_irr).exp_m1();
    let n0 = produced + n * survive;
    Ok(n0 * (-lambda * cooling).exp())
}
