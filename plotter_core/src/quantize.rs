//! Millimeters to motor steps.
//!
//! Conversion truncates toward zero. The dropped sub-step remainder is not
//! carried to the next point, so long paths built from many short segments
//! can drift by up to one step per segment and axis.

/// Convert a length in millimeters to whole motor steps, truncating toward zero.
///
/// Non-finite products map to 0; results are clamped to the `i32` range.
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub fn to_steps(mm: f64, steps_per_mm: f64) -> i32 {
    let raw = (mm * steps_per_mm).trunc();
    if !raw.is_finite() {
        return 0;
    }
    if raw >= f64::from(i32::MAX) {
        i32::MAX
    } else if raw <= f64::from(i32::MIN) {
        i32::MIN
    } else {
        raw as i32
    }
}

/// Relative move from `current` to `target`, in steps.
///
/// Callers must not emit a motion command for a zero result.
#[inline]
pub fn delta(target: i32, current: i32) -> i32 {
    target.saturating_sub(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_instead_of_rounding() {
        assert_eq!(to_steps(9.99, 10.0), 99);
        assert_eq!(to_steps(10.0, 51.2), 512);
        assert_eq!(to_steps(0.019, 51.2), 0);
    }

    #[test]
    fn truncates_toward_zero_for_negatives() {
        assert_eq!(to_steps(-9.99, 10.0), -99);
        assert_eq!(to_steps(-0.01, 51.2), 0);
    }

    #[test]
    fn saturates_and_handles_non_finite() {
        assert_eq!(to_steps(f64::NAN, 51.2), 0);
        assert_eq!(to_steps(f64::INFINITY, 51.2), 0);
        assert_eq!(to_steps(1e12, 51.2), i32::MAX);
        assert_eq!(to_steps(-1e12, 51.2), i32::MIN);
    }

    #[test]
    fn delta_is_plain_difference() {
        assert_eq!(delta(512, 0), 512);
        assert_eq!(delta(120, 120), 0);
        assert_eq!(delta(-40, 100), -140);
        assert_eq!(delta(i32::MIN, 1), i32::MIN);
    }
}
