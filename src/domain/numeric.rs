//! Arithmetic helpers that never produce NaN or infinity.

pub fn is_valid_number(value: f64) -> bool {
    value.is_finite()
}

/// `numerator / denominator`, or `default` when the divisor is zero or
/// either side (or the result) is not finite.
pub fn safe_divide(numerator: f64, denominator: f64, default: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return default;
    }
    let result = numerator / denominator;
    if result.is_finite() { result } else { default }
}

/// `(value - base) / base`, or `default` when `base` is zero or not finite.
pub fn safe_percentage(value: f64, base: f64, default: f64) -> f64 {
    safe_divide(value - base, base, default)
}

/// Clamps to `[min, max]`; NaN maps to `min`.
pub fn clip_value(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

/// Clamps a score to `[0, 100]`.
pub fn clamp_score(score: f64) -> f64 {
    clip_value(score, 0.0, 100.0)
}

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

pub fn median(data: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
