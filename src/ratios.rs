use log::{debug, info};

use crate::error::{PartitionError, Result};

/// Decimal places kept by [`ratios_from_parts`].
pub const DEFAULT_RATIO_PRECISION: u32 = 4;

// Beyond this f64 rounding stops being meaningful
const MAX_RATIO_PRECISION: u32 = 15;

/// Allowed drift of a ratio set from 1.0.
pub const RATIO_EPSILON: f64 = 1e-3;

fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round() / scale
}

/// Turn a number of parts into `n` equal ratios rounded to four decimals.
///
/// The last ratio absorbs the rounding error so the set sums to one,
/// e.g. three parts give `[0.3333, 0.3333, 0.3334]`.
pub fn ratios_from_parts(parts: usize) -> Result<Vec<f64>> {
    ratios_from_parts_with_precision(parts, DEFAULT_RATIO_PRECISION)
}

/// Same as [`ratios_from_parts`] starting from `precision` decimals.
///
/// When the rounded share leaves a last ratio outside `(0, 2 * share]`
/// (190 parts at four decimals would leave a negative remainder), one more
/// decimal is used until the shares fit.
pub fn ratios_from_parts_with_precision(parts: usize, precision: u32) -> Result<Vec<f64>> {
    if parts == 0 {
        return Err(PartitionError::invalid_argument(
            "number of parts must be greater than zero",
        ));
    }
    info!(
        "Turning {} parts into ratios with precision {}",
        parts, precision
    );

    for digits in precision..=MAX_RATIO_PRECISION.max(precision) {
        let share = round_to(1.0 / parts as f64, digits);
        let last = round_to(1.0 - share * (parts - 1) as f64, digits);
        if share > 0.0 && last > 0.0 && last <= 2.0 * share {
            if digits != precision {
                debug!("Raised ratio precision to {} for {} parts", digits, parts);
            }
            let mut ratios = vec![share; parts - 1];
            ratios.push(last);
            return Ok(ratios);
        }
    }
    Err(PartitionError::invalid_argument(format!(
        "{} parts cannot be expressed as ratios",
        parts
    )))
}

/// Turn a target bucket size into ratios: `total / size` full buckets of
/// `size / total`, followed by the remainder `1 - full * size / total`.
///
/// The trailing remainder may be zero or marginally negative through float
/// truncation; [`size_ratios_for_split`] clamps it for splitting.
pub fn ratios_from_size(total: usize, size: usize) -> Result<Vec<f64>> {
    if total == 0 {
        return Err(PartitionError::invalid_argument(
            "total size must be greater than zero",
        ));
    }
    if size == 0 {
        return Err(PartitionError::invalid_argument(
            "bucket size must be greater than zero",
        ));
    }

    let size_ratio = size as f64 / total as f64;
    let full = total / size;
    let mut ratios = vec![size_ratio; full];
    ratios.push(1.0 - full as f64 * size_ratio);
    Ok(ratios)
}

/// Size-derived ratios ready for [`crate::split::split_by_ratios`]: a
/// degenerate trailing remainder (less than half an item) is dropped.
/// A size larger than the total leaves the remainder as the single bucket.
pub fn size_ratios_for_split(total: usize, size: usize) -> Result<Vec<f64>> {
    let mut ratios = ratios_from_size(total, size)?;
    let degenerate = 0.5 / total as f64;
    if ratios.len() > 1 && ratios.last().is_some_and(|r| *r < degenerate) {
        ratios.pop();
    }
    for r in ratios.iter_mut() {
        *r = r.clamp(0.0, 1.0);
    }
    Ok(ratios)
}

/// Check the splitter precondition: every ratio in (0, 1] and the set sums
/// to one within [`RATIO_EPSILON`].
pub fn validate_ratios(ratios: &[f64]) -> Result<()> {
    if ratios.is_empty() {
        return Err(PartitionError::invalid_argument("ratio set is empty"));
    }
    if let Some(bad) = ratios.iter().find(|r| !(**r > 0.0 && **r <= 1.0)) {
        return Err(PartitionError::invalid_argument(format!(
            "ratio {} is outside (0, 1]",
            bad
        )));
    }
    let sum: f64 = ratios.iter().sum();
    if (sum - 1.0).abs() >= RATIO_EPSILON {
        return Err(PartitionError::invalid_argument(format!(
            "the sum of the ratios must be 1, got {}",
            sum
        )));
    }
    Ok(())
}
