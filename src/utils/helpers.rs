/// Rounds a float to a specified number of decimal places
pub fn round_to_decimal_places(value: f64, decimal_places: u32) -> f64 {
    let multiplier = 10_f64.powi(decimal_places as i32);
    (value * multiplier).round() / multiplier
}

/// Relative change from `old` to `new`, in percent. Zero when `old` is zero.
pub fn percentage_change(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        0.0
    } else {
        (new - old) / old * 100.0
    }
}

/// Division that yields `default` instead of NaN/inf for a zero denominator.
pub fn safe_ratio(numerator: f64, denominator: f64, default: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        default
    } else {
        numerator / denominator
    }
}

/// Truncates `value` to at most `max_chars` characters, appending `marker`
/// when anything was cut. Never splits a UTF-8 code point.
pub fn truncate_with_marker(value: &str, max_chars: usize, marker: &str) -> String {
    match value.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &value[..byte_idx], marker),
        None => value.to_string(),
    }
}
