//! Bounded measurement error applied to telemetry before it leaves the imitator.

use rand::Rng;

/// Relative deviation applied to UPS-level electrical readings.
pub const ELECTRICAL_DEVIATION: f32 = 0.02;

/// Relative deviation applied to every per-battery reading.
pub const BATTERY_DEVIATION: f32 = 0.04;

/// Adds a symmetric random error of at most `value * deviation` to `value`.
///
/// Uses the thread-local generator; see [`simulate_measurement_error_with`]
/// for a seedable variant.
///
/// # Examples
///
/// ```
/// use ups_imitator::ups::jitter::simulate_measurement_error;
///
/// let measured = simulate_measurement_error(0.02, 220.0);
/// assert!((measured - 220.0).abs() <= 220.0 * 0.02 + 1e-3);
/// ```
pub fn simulate_measurement_error(deviation: f32, value: f32) -> f32 {
    simulate_measurement_error_with(&mut rand::rng(), deviation, value)
}

/// Same as [`simulate_measurement_error`] but draws from `rng`.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `deviation` - Relative deviation, e.g. `0.02` for ±2%
/// * `value` - True reading
pub fn simulate_measurement_error_with<R: Rng + ?Sized>(
    rng: &mut R,
    deviation: f32,
    value: f32,
) -> f32 {
    let coefficient: f32 = rng.random_range(-1.0..=1.0);
    value + coefficient * (value * deviation)
}
