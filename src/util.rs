pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

/// Folds `value` into a mean over `count` samples, `count` including `value`.
pub fn running_mean(previous: f64, count: u64, value: f64) -> f64 {
    match count {
        0 => previous,
        n => (previous * (n - 1) as f64 + value) / n as f64,
    }
}

/// `round(part / whole * 100)` with an empty whole counting as zero.
pub fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u32
}
