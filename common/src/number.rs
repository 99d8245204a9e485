pub const SECONDS_PER_DAY: i64 = 86_400;
pub const DAYS_PER_YEAR: f64 = 365.0;

/// `a / b`, or `0.0` when `b` is zero, matching the source's
/// divide-by-zero-is-silently-zero convention used throughout the metrics
/// and fee-model code.
#[must_use]
pub fn safe_divide(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        0.0
    } else {
        a / b
    }
}

/// Whole days between two unix timestamps, order-independent.
#[must_use]
pub fn get_days_between_unix_timestamps(a: i64, b: i64) -> i64 {
    (b - a).abs() / SECONDS_PER_DAY
}

/// Replaces an exact zero with a small epsilon, used to guard divisors in
/// the Black-Scholes formula.
#[must_use]
pub fn guard_zero(x: f64) -> f64 {
    if x == 0.0 {
        1e-10
    } else {
        x
    }
}

/// Standard normal cumulative distribution function, via the Abramowitz &
/// Stegun 7.1.26 erf approximation. No crate in this workspace's dependency
/// tree provides one, and pulling in a statistics crate for a single
/// function would be overkill.
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let a1 = 0.254_829_592;
    let a2 = -0.284_496_736;
    let a3 = 1.421_413_741;
    let a4 = -1.453_152_027;
    let a5 = 1.061_405_429;
    let p = 0.327_591_1;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn safe_divide_zero_denominator() {
        assert_eq!(safe_divide(5.0, 0.0), 0.0);
        assert_eq!(safe_divide(5.0, 2.0), 2.5);
    }

    #[test]
    fn days_between_is_symmetric_and_truncating() {
        let now = 1_700_000_000_i64;
        assert_eq!(get_days_between_unix_timestamps(now, now - 2 * 86_400), 2);
        assert_eq!(get_days_between_unix_timestamps(now - 2 * 86_400, now), 2);
    }

    #[test]
    fn normal_cdf_matches_known_points() {
        assert_relative_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-6);
        assert_relative_eq!(normal_cdf(1.959_964), 0.975, epsilon = 1e-4);
    }
}
