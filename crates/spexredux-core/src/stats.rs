//! NaN-ignoring scalar statistics over pixel buffers.

/// Median of the non-NaN values, averaging the two middle values for even
/// counts. Reorders `values` in place. Returns NaN when no value remains.
pub fn nan_median(values: &mut Vec<f64>) -> f64 {
    values.retain(|v| !v.is_nan());
    median_in_place(values)
}

/// Median of a NaN-free slice. Reorders the slice.
pub fn median_in_place(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let upper = *upper;
    if n % 2 == 1 {
        upper
    } else {
        let lower_max = lower
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        (lower_max + upper) / 2.0
    }
}

/// Mean of the non-NaN values; NaN if none.
pub fn nan_mean<'a>(values: impl IntoIterator<Item = &'a f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Population standard deviation of the non-NaN values; NaN if none.
pub fn nan_std<'a>(values: impl IntoIterator<Item = &'a f64> + Clone) -> f64 {
    let mean = nan_mean(values.clone());
    if mean.is_nan() {
        return f64::NAN;
    }
    let (sum_sq, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), &v| (s + (v - mean) * (v - mean), c + 1));
    (sum_sq / count as f64).sqrt()
}

/// Sum of the non-NaN values (zero if none).
pub fn nan_sum<'a>(values: impl IntoIterator<Item = &'a f64>) -> f64 {
    values.into_iter().filter(|v| !v.is_nan()).sum()
}

/// Most frequent non-NaN value; ties go to the smallest value.
///
/// Returns `None` when no value occurs more than once, since the mode of
/// continuous data carries no information.
pub fn mode(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        let run = j - i;
        if best.map_or(true, |(_, count)| run > count) {
            best = Some((sorted[i], run));
        }
        i = j;
    }

    best.filter(|&(_, count)| count > 1).map(|(v, _)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median_in_place(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_in_place(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_nan_median_skips_nan() {
        let mut v = vec![f64::NAN, 5.0, 1.0, 3.0];
        assert_eq!(nan_median(&mut v), 3.0);
        let mut all_nan = vec![f64::NAN];
        assert!(nan_median(&mut all_nan).is_nan());
    }

    #[test]
    fn test_nan_mean_std() {
        let v = [1.0, f64::NAN, 3.0];
        assert_eq!(nan_mean(&v), 2.0);
        assert_eq!(nan_std(&v), 1.0);
    }

    #[test]
    fn test_mode_prefers_smallest_on_tie() {
        assert_eq!(mode(&[2.0, 2.0, 1.0, 1.0, 5.0]), Some(1.0));
        assert_eq!(mode(&[7.0, 7.0, 7.0, 1.0, 1.0]), Some(7.0));
        assert_eq!(mode(&[1.0, 2.0, 3.0]), None);
    }
}
