//! Small numeric and grouping helpers shared by the pipeline stages

use std::collections::HashMap;
use std::hash::Hash;

/// Linear-interpolated percentile (`q` in 0..=1) over unsorted values
///
/// Returns 0.0 for an empty slice and the single value for a one-element slice.
/// `q` outside 0..=1 (or NaN) is clamped to the nearest end.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    if sorted.len() == 1 {
        return sorted[0];
    }

    let q = if q.is_nan() { 1.0 } else { q.clamp(0.0, 1.0) };
    let pos = (sorted.len() - 1) as f64 * q;
    let lower = pos.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let weight = pos - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

/// Calculate median of a slice
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0.0 below two values
pub fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Least-squares slope over x = 0..n
pub fn linear_trend(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let mut numer = 0.0;
    let mut denom = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numer += dx * (y - y_mean);
        denom += dx * dx;
    }

    if denom == 0.0 {
        0.0
    } else {
        numer / denom
    }
}

/// Trailing moving average; the first `window - 1` points are undefined
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    (0..values.len())
        .map(|idx| {
            if idx + 1 < window {
                None
            } else {
                Some(values[idx + 1 - window..=idx].iter().sum::<f64>() / window as f64)
            }
        })
        .collect()
}

/// Relative change from `prev` to `curr`; undefined when `prev` is zero
pub fn pct_change(curr: f64, prev: f64) -> Option<f64> {
    if prev == 0.0 {
        None
    } else {
        Some((curr - prev) / prev)
    }
}

/// Round to the nearest multiple of 5 (ties to even)
pub fn round_to_nearest_5(value: f64) -> f64 {
    (value / 5.0).round_ties_even() * 5.0
}

/// Group items by key, keeping groups (and items within them) in first-seen order
pub fn group_first_seen<K, T, I, F>(items: I, key: F) -> Vec<(K, Vec<T>)>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<T>)> = Vec::new();
    for item in items {
        let k = key(&item);
        match index.get(&k) {
            Some(&pos) => groups[pos].1.push(item),
            None => {
                index.insert(k.clone(), groups.len());
                groups.push((k, vec![item]));
            }
        }
    }
    groups
}

/// Most frequent value; ties go to the value seen first
pub fn most_common<T, I>(items: I) -> Option<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let counted = group_first_seen(items, |item| item.clone());
    let mut best: Option<(T, usize)> = None;
    for (value, group) in counted {
        if best.as_ref().map_or(true, |(_, count)| group.len() > *count) {
            best = Some((value, group.len()));
        }
    }
    best.map(|(value, _)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.5), 3.0);
        assert!((percentile(&values, 0.99) - 4.96).abs() < 1e-9);
        assert_eq!(percentile(&[7.0], 0.99), 7.0);
        assert_eq!(percentile(&[], 0.99), 0.0);
    }

    #[test]
    fn test_percentile_clamps_q() {
        let values = [3.0, 1.0, 2.0];
        assert_eq!(percentile(&values, 1.5), 3.0);
        assert_eq!(percentile(&values, -1.0), 1.0);
        assert_eq!(percentile(&values, f64::NAN), 3.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_sample_stdev() {
        let values = [100.0, 100.0, 100.0, 100.0, 100.0, 300.0];
        assert!((sample_stdev(&values) - 81.6497).abs() < 1e-3);
        assert_eq!(sample_stdev(&[5.0]), 0.0);
    }

    #[test]
    fn test_linear_trend() {
        assert!((linear_trend(&[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-12);
        assert!((linear_trend(&[10.0, 8.0, 6.0, 4.0]) + 2.0).abs() < 1e-12);
        assert_eq!(linear_trend(&[42.0]), 0.0);
    }

    #[test]
    fn test_rolling_mean() {
        let result = rolling_mean(&[3.0, 6.0, 9.0, 12.0], 3);
        assert_eq!(result, vec![None, None, Some(6.0), Some(9.0)]);
    }

    #[test]
    fn test_pct_change() {
        assert_eq!(pct_change(150.0, 100.0), Some(0.5));
        assert_eq!(pct_change(10.0, 0.0), None);
    }

    #[test]
    fn test_round_to_nearest_5() {
        assert_eq!(round_to_nearest_5(21.0), 20.0);
        assert_eq!(round_to_nearest_5(23.0), 25.0);
        // 12.5 / 5 = 2.5 rounds to even
        assert_eq!(round_to_nearest_5(12.5), 10.0);
    }

    #[test]
    fn test_group_first_seen_preserves_order() {
        let groups = group_first_seen(vec!["b1", "a1", "b2", "c1", "a2"], |s| &s[..1]);
        let keys: Vec<&str> = groups.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(groups[0].1, vec!["b1", "b2"]);
    }

    #[test]
    fn test_most_common_tie_goes_to_first_seen() {
        assert_eq!(most_common(vec!["x", "y", "y", "x"]), Some("x"));
        assert_eq!(most_common(vec!["x", "y", "y"]), Some("y"));
        assert_eq!(most_common(Vec::<&str>::new()), None);
    }
}
