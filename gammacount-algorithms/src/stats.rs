//! Goodness-of-fit statistics.

use gammacount_core::{Error, Result};

/// Reduced chi-square `Σ((data − model)/σ)² / (N − free_params)`.
///
/// Without `std` every point has unit weight.
///
/// # Errors
/// Returns `InvalidParameter` if the slices differ in length, a σ is not
/// strictly positive, or there are no degrees of freedom left.
pub fn reduced_chi_square(
    data: &[f64],
    model: &[f64],
    std: Option<&[f64]>,
    free_params: usize,
) -> Result<f64> {
    Error::ensure(
        data.len() == model.len(),
        "model",
        format!("{} model points for {} data", model.len(), data.len()),
    )?;
    Error::ensure(
        data.len() > free_params,
        "data",
        format!(
            "{} points leave no degrees of freedom for {free_params} parameters",
            data.len()
        ),
    )?;

    let chi_square: f64 = match std {
        Some(std) => {
            Error::ensure(
                std.len() == data.len(),
                "std",
                format!("{} uncertainties for {} points", std.len(), data.len()),
            )?;
            Error::ensure(
                std.iter().all(|s| *s > 0.0),
                "std",
                "uncertainties must be greater than zero",
            )?;
            data.iter()
                .zip(model)
                .zip(std)
                .map(|((d, m), s)| ((d - m) / s).powi(2))
                .sum()
        }
        None => data.iter().zip(model).map(|(d, m)| (d - m).powi(2)).sum(),
    };

    #[allow(clippy::cast_precision_loss)]
    let dof = (data.len() - free_params) as f64;
    Ok(chi_square / dof)
}
