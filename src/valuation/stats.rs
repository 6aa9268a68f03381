//! Order statistics over price-per-square-foot samples.

/// Sorted copy of the finite values in `values`.
fn sorted(values: &[f64]) -> Vec<f64> {
    let mut arr: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    arr.sort_by(|a, b| a.total_cmp(b));
    arr
}

/// Standard median: middle value for odd counts, mean of the two middle
/// values for even counts. `None` for an empty sample.
pub fn median(values: &[f64]) -> Option<f64> {
    let arr = sorted(values);
    let n = arr.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    if n % 2 == 1 {
        Some(arr[mid])
    } else {
        Some((arr[mid - 1] + arr[mid]) / 2.0)
    }
}

/// Percentile `p` ∈ [0, 1] with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let arr = sorted(values);
    let n = arr.len();
    if n == 0 {
        return None;
    }
    let rank = (n - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(arr[lo]);
    }
    let frac = rank - lo as f64;
    Some(arr[lo] + (arr[hi] - arr[lo]) * frac)
}

/// Interquartile range (P75 − P25). Zero for a single value.
pub fn iqr(values: &[f64]) -> Option<f64> {
    let q1 = percentile(values, 0.25)?;
    let q3 = percentile(values, 0.75)?;
    Some((q3 - q1).max(0.0))
}
