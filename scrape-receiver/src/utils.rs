/// Bit pattern of the NaN value Prometheus uses to mark a series as stale.
pub const STALE_NAN_BITS: u64 = 0x7ff0_0000_0000_0002;

/// Returns `true` if the value is a Prometheus staleness marker.
pub fn is_stale_marker(value: f64) -> bool {
    value.to_bits() == STALE_NAN_BITS
}

/// Converts a millisecond UNIX timestamp to nanoseconds.
///
/// Timestamps before the epoch are clamped to zero.
pub fn millis_to_nanos(millis: i64) -> u64 {
    u64::try_from(millis)
        .unwrap_or_default()
        .saturating_mul(1_000_000)
}

/// Converts a fractional UNIX timestamp in seconds to nanoseconds.
///
/// Whole seconds and the fraction are converted separately to avoid losing precision on large
/// timestamps. Negative and non-finite values are clamped to zero.
pub fn seconds_to_nanos(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }

    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9) as u64;
    (whole as u64).saturating_mul(1_000_000_000).saturating_add(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_marker() {
        assert!(is_stale_marker(f64::from_bits(STALE_NAN_BITS)));
        assert!(!is_stale_marker(f64::NAN));
        assert!(!is_stale_marker(1.0));
    }

    #[test]
    fn test_millis_to_nanos() {
        assert_eq!(millis_to_nanos(1_660_233_371_385), 1_660_233_371_385_000_000);
        assert_eq!(millis_to_nanos(-5), 0);
    }

    #[test]
    fn test_seconds_to_nanos() {
        assert_eq!(seconds_to_nanos(1.5), 1_500_000_000);
        assert_eq!(seconds_to_nanos(0.0), 0);
        assert_eq!(seconds_to_nanos(f64::NAN), 0);
    }
}
