//! Display formatting for scorecard numbers.

/// `(13, 2)` → `"13.2"`. Missing progress reads as `"0.0"`.
pub fn format_overs(overs: Option<(u32, u32)>) -> String {
    match overs {
        Some((whole, balls)) => format!("{}.{}", whole, balls),
        None => "0.0".to_string(),
    }
}

/// Two-decimal rate; missing or non-finite reads as `"0.00"`.
pub fn format_rate(rate: Option<f64>) -> String {
    match rate.filter(|r| r.is_finite()) {
        Some(r) => format!("{:.2}", r),
        None => "0.00".to_string(),
    }
}

/// Legal deliveries bowled for an overs pair.
pub fn balls_from_overs(overs: Option<(u32, u32)>) -> u32 {
    overs
        .map(|(whole, balls)| whole.saturating_mul(6).saturating_add(balls))
        .unwrap_or(0)
}

/// Runs per six balls.
pub fn run_rate(runs: u32, balls: u32) -> Option<f64> {
    (balls > 0).then(|| runs as f64 * 6.0 / balls as f64)
}
