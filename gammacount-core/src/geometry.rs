//! Source/detector geometry.
//!
//! Point-source solid angles (Knoll eq. 4.21) and the series expansion for a
//! disk source coaxial with a disk detector (Knoll, ch. 4) used to correct
//! efficiencies measured with point sources for large activation foils.
//! Lengths are in cm.

use std::f64::consts::PI;

use crate::error::{Error, Result};

/// Solid angle (sr) subtended by a disk detector of radius `a` seen from a
/// point source on its axis at distance `d`.
///
/// # Errors
/// Returns `InvalidParameter` for negative inputs.
pub fn solid_angle(a: f64, d: f64) -> Result<f64> {
    Error::ensure(a >= 0.0, "detector_radius", "must be non-negative")?;
    Error::ensure(d >= 0.0, "distance", "must be non-negative")?;
    if a == 0.0 {
        return Ok(0.0);
    }
    Ok(2.0 * PI * (1.0 - d / d.hypot(a)))
}

/// Fraction of 4π subtended by the detector for a point source.
///
/// # Errors
/// Returns `InvalidParameter` for negative inputs.
pub fn fractional_solid_angle(a: f64, d: f64) -> Result<f64> {
    Ok(solid_angle(a, d)? / 4.0 / PI)
}

/// Fractional solid angle for a disk source of radius `r_src` coaxial with a
/// detector of radius `r_det` at distance `d`.
///
/// Valid for sources that are large but not too close: `d` must be at least
/// 1 cm.
///
/// # Errors
/// Returns `InvalidParameter` if `d < 1` or a radius is negative.
#[allow(clippy::suboptimal_flops)]
pub fn volume_solid_angle(r_src: f64, r_det: f64, d: f64) -> Result<f64> {
    Error::ensure(
        d >= 1.0,
        "distance",
        format!("source-detector distance must be at least 1.0 cm, got {d}"),
    )?;
    Error::ensure(
        r_src >= 0.0 && r_det >= 0.0,
        "radius",
        "source and detector radii cannot be negative",
    )?;

    let alpha = (r_src / d).powi(2);
    let beta = (r_det / d).powi(2);
    let b1 = 1.0 + beta;

    let point = 1.0 - 1.0 / b1.sqrt();
    let f0 = 3.0 / 8.0 * beta / b1.powf(2.5);
    let f1 = 5.0 / 16.0 * beta / b1.powf(3.5) - 35.0 / 64.0 * beta.powi(2) / b1.powf(4.5);
    // Knoll's 1155/1024 for the cubic term.
    let f2 = 35.0 / 128.0 * beta / b1.powf(4.5)
        - 315.0 / 256.0 * beta.powi(2) / b1.powf(5.5)
        + 1155.0 / 1024.0 * beta.powi(3) / b1.powf(6.5);

    let series = point - alpha * f0 + alpha.powi(2) * f1 - alpha.powi(3) * f2;
    Ok(0.5 * series)
}

/// Ratio of the disk-source to point-source fractional solid angle.
///
/// Multiplying a point-source efficiency by this factor gives the efficiency
/// for a foil of radius `r_src`.
///
/// # Errors
/// Returns `InvalidParameter` if the geometry is invalid or the detector
/// radius is zero (no point-source reference).
pub fn solid_angle_correction(r_src: f64, r_det: f64, d: f64) -> Result<f64> {
    let point = fractional_solid_angle(r_det, d)?;
    Error::ensure(point > 0.0, "detector_radius", "must be greater than zero")?;
    Ok(volume_solid_angle(r_src, r_det, d)? / point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_point_source() {
        // Detector infinitely large relative to distance: half of 4π.
        let wide = fractional_solid_angle(1e9, 1.0).unwrap();
        assert_abs_diff_eq!(wide, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(solid_angle(0.0, 3.0).unwrap(), 0.0);
        assert!(solid_angle(-1.0, 3.0).is_err());
    }

    #[test]
    fn test_volume_solid_angle_reference_values() {
        let cases = [
            ((1.0, 0.5, 1.0), 0.0343),
            ((1.0, 4.0, 1.0), 0.3761),
            ((0.3, 2.54, 20.0), 0.0040),
            ((2.0, 2.54, 5.0), 0.0501),
        ];
        for ((r_src, r_det, d), expected) in cases {
            let omega = volume_solid_angle(r_src, r_det, d).unwrap();
            assert_abs_diff_eq!(omega, expected, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_volume_solid_angle_cubic_coefficient() {
        // Large, close foil where the alpha³ term matters. 1155/1028 in place
        // of 1155/1024 would give 0.265255.
        let omega = volume_solid_angle(3.0, 3.0, 1.0).unwrap();
        assert_abs_diff_eq!(omega, 0.264_886, epsilon = 1e-6);
    }

    #[test]
    fn test_volume_solid_angle_limits() {
        assert_abs_diff_eq!(volume_solid_angle(2.0, 0.0, 3.0).unwrap(), 0.0);
        assert_abs_diff_eq!(
            volume_solid_angle(0.0, 2.0, 3.0).unwrap(),
            fractional_solid_angle(2.0, 3.0).unwrap(),
            epsilon = 1e-5
        );
        assert_abs_diff_eq!(
            volume_solid_angle(0.1, 10.0, 3.0).unwrap(),
            fractional_solid_angle(10.0, 3.0).unwrap(),
            epsilon = 1e-5
        );
        assert_abs_diff_eq!(
            volume_solid_angle(2.54, 2.54, 300.0).unwrap(),
            fractional_solid_angle(2.54, 300.0).unwrap(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_volume_solid_angle_rejects_close_sources() {
        let err = volume_solid_angle(2.54, 2.54, 0.0).unwrap_err();
        assert!(err.is_invalid_parameter());
        assert!(volume_solid_angle(-1.0, 2.54, 5.0).is_err());
    }

    #[test]
    fn test_solid_angle_correction() {
        // Point-like foil: no correction.
        let point_like = solid_angle_correction(0.0, 2.54, 10.0).unwrap();
        assert_abs_diff_eq!(point_like, 1.0, epsilon = 1e-12);
        // Larger foils see a smaller solid angle.
        assert!(solid_angle_correction(2.0, 2.54, 5.0).unwrap() < 1.0);
        assert!(solid_angle_correction(1.0, 0.0, 5.0).is_err());
    }
}
