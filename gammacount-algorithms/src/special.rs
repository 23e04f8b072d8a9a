//! Gamma function (Lanczos approximation, g = 7).
#![allow(
    clippy::unreadable_literal,
    clippy::excessive_precision,
    clippy::float_cmp
)]

use std::f64::consts::PI;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Γ(x) for real `x`.
///
/// Uses the reflection formula below 0.5. Poles (non-positive integers)
/// give a non-finite result, and the value overflows to infinity above
/// roughly 171.
#[must_use]
pub fn gamma(x: f64) -> f64 {
    if x.is_nan() || (x <= 0.0 && x == x.floor()) {
        return f64::NAN;
    }
    if x < 0.5 {
        return PI / ((PI * x).sin() * gamma(1.0 - x));
    }
    let x = x - 1.0;
    let t = x + LANCZOS_G + 0.5;
    let series: f64 = LANCZOS_COEFFICIENTS[1..]
        .iter()
        .zip(1_u32..)
        .map(|(&c, i)| c / (x + f64::from(i)))
        .sum();
    let series = LANCZOS_COEFFICIENTS[0] + series;
    (2.0 * PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * series
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gamma_integers() {
        let mut factorial = 1.0;
        for n in 1..15 {
            assert_relative_eq!(gamma(f64::from(n)), factorial, max_relative = 1e-12);
            factorial *= f64::from(n);
        }
    }

    #[test]
    fn test_gamma_half_integers() {
        assert_relative_eq!(gamma(0.5), PI.sqrt(), max_relative = 1e-13);
        assert_relative_eq!(gamma(1.5), PI.sqrt() / 2.0, max_relative = 1e-13);
        assert_relative_eq!(gamma(-0.5), -2.0 * PI.sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn test_gamma_poles_and_overflow() {
        assert!(!gamma(0.0).is_finite());
        assert!(!gamma(-3.0).is_finite());
        assert!(gamma(200.0).is_infinite());
    }
}
