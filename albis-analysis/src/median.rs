//! Selection-based median.

/// Place the `k`-th smallest element of `values` at index `k` and return it.
///
/// Hoare partitioning around the middle element; average O(n), no
/// allocation. NaN entries compare as neither smaller nor larger and end up
/// wherever partitioning leaves them, so callers filter them first.
///
/// # Panics
///
/// Panics if `k >= values.len()`.
pub fn quick_select(values: &mut [f64], k: usize) -> f64 {
    let mut left = 0usize;
    let mut right = values.len() - 1;
    while left < right {
        let pivot = values[(left + right) / 2];
        let mut i = left;
        let mut j = right;
        loop {
            while values[i] < pivot {
                i += 1;
            }
            while values[j] > pivot {
                j -= 1;
            }
            if i <= j {
                values.swap(i, j);
                i += 1;
                if j == 0 {
                    break;
                }
                j -= 1;
            }
            if i > j {
                break;
            }
        }
        if k <= j {
            right = j;
        } else if k >= i {
            left = i;
        } else {
            break;
        }
    }
    values[k]
}

/// Median of `values`; NaN when empty. The input is not reordered.
#[must_use]
pub fn compute_median(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    let mut work = values.to_vec();
    let mid = n / 2;
    if n % 2 == 1 {
        return quick_select(&mut work, mid);
    }
    let lower = quick_select(&mut work, mid - 1);
    let upper = quick_select(&mut work, mid);
    (lower + upper) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_even() {
        assert_eq!(compute_median(&[5.0, 3.0, 8.0, 1.0]), 4.0);
    }

    #[test]
    fn test_median_single() {
        assert_eq!(compute_median(&[7.0]), 7.0);
    }

    #[test]
    fn test_median_empty_is_nan() {
        assert!(compute_median(&[]).is_nan());
    }

    #[test]
    fn test_quick_select_matches_sort() {
        let data: Vec<f64> = (0..101).map(|i| f64::from((i * 37) % 101)).collect();
        let mut sorted = data.clone();
        sorted.sort_by(f64::total_cmp);
        for k in [0, 1, 50, 99, 100] {
            let mut work = data.clone();
            assert_eq!(quick_select(&mut work, k), sorted[k]);
        }
    }

    #[test]
    fn test_quick_select_duplicates() {
        let mut data = vec![2.0, 2.0, 2.0, 1.0, 2.0, 3.0, 2.0];
        assert_eq!(quick_select(&mut data, 0), 1.0);
        let mut data = vec![2.0, 2.0, 2.0, 1.0, 2.0, 3.0, 2.0];
        assert_eq!(quick_select(&mut data, 6), 3.0);
        let mut data = vec![2.0, 2.0, 2.0, 1.0, 2.0, 3.0, 2.0];
        assert_eq!(quick_select(&mut data, 3), 2.0);
    }
}
