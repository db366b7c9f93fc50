//! Linear rescale between numeric ranges.

/// Input range was empty (`in_min == in_max`).
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("input range is empty: in_min == in_max == {0}")]
pub struct InvalidRangeError(pub f64);

/// Map `value` from `[in_min, in_max]` onto `[out_min, out_max]`. No clamping.
/// An empty input range yields IEEE infinity or NaN; use `try_map` to reject it.
pub fn map(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// Checked form of `map`.
pub fn try_map(
    value: f64,
    in_min: f64,
    in_max: f64,
    out_min: f64,
    out_max: f64,
) -> Result<f64, InvalidRangeError> {
    if in_max == in_min {
        return Err(InvalidRangeError(in_min));
    }
    Ok(map(value, in_min, in_max, out_min, out_max))
}
