//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
///
/// The value is not clamped, so values outside the source range map to values outside the target
/// range.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Clamp a value between `min` and `max` (inclusive).
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T 
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Returns `true` if `value` lies in the closed range `[min, max]`.
///
/// NaN is never in range.
pub fn in_range<T>(value: T, min: T, max: T) -> bool
where
    T: Float
{
    value >= min && value <= max
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0f64, 180f64), (2.5f64, 12.5f64), 0f64), 2.5);
        assert_eq!(lin_map((0f64, 180f64), (2.5f64, 12.5f64), 90f64), 7.5);
        assert_eq!(lin_map((0f64, 180f64), (2.5f64, 12.5f64), 180f64), 12.5);
        assert_eq!(lin_map((0f64, 10f64), (0f64, 100f64), 20f64), 200f64);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&-1f64, &0f64, &127f64), 0f64);
        assert_eq!(clamp(&64f64, &0f64, &127f64), 64f64);
        assert_eq!(clamp(&300f64, &0f64, &127f64), 127f64);
    }

    #[test]
    fn test_in_range() {
        assert!(in_range(0f64, 0f64, 1f64));
        assert!(in_range(1f64, 0f64, 1f64));
        assert!(!in_range(1.0001f64, 0f64, 1f64));
        assert!(!in_range(f64::NAN, 0f64, 1f64));
    }
}
