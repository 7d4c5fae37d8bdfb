//! Time helpers shared by the battle protocol state machines.

use std::time::Duration;

/// Scale a delay by the battle speed multiplier.
///
/// A speed of 2.0 halves every delay. Non-finite or non-positive speeds leave
/// the delay untouched.
pub fn scaled(delay: Duration, speed: f32) -> Duration {
    if !speed.is_finite() || speed <= 0.0 {
        return delay;
    }
    delay.div_f64(f64::from(speed))
}

/// Wall-clock milliseconds since the UNIX epoch, as carried on the wire.
pub fn wall_clock_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Milliseconds in a duration, saturating.
pub fn as_millis_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_by_speed() {
        let base = Duration::from_millis(5000);
        assert_eq!(scaled(base, 1.0), base);
        assert_eq!(scaled(base, 2.0), Duration::from_millis(2500));
        assert_eq!(scaled(base, 0.5), Duration::from_millis(10_000));
    }

    #[test]
    fn test_scaled_ignores_invalid_speed() {
        let base = Duration::from_millis(300);
        assert_eq!(scaled(base, 0.0), base);
        assert_eq!(scaled(base, -1.0), base);
        assert_eq!(scaled(base, f32::NAN), base);
    }
}
