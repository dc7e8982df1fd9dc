//! Pure array transforms used by the refinement driver. No communication.

use num_traits::Bounded;

/// Indices of the nonzero entries of a flag array.
pub fn collect_marked(flags: &[i8]) -> Vec<usize> {
    flags
        .iter()
        .enumerate()
        .filter_map(|(i, &f)| (f != 0).then_some(i))
        .collect()
}

/// Scatter `values` (`ncomps` per item) into a full-width array of `n` rows
/// at positions `items2rows`; untouched rows are `default`.
pub fn map_onto<T: Copy>(
    values: &[T],
    items2rows: &[usize],
    n: usize,
    default: T,
    ncomps: usize,
) -> Vec<T> {
    debug_assert_eq!(values.len(), items2rows.len() * ncomps);
    let mut out = vec![default; n * ncomps];
    for (item, &row) in items2rows.iter().enumerate() {
        out[row * ncomps..(row + 1) * ncomps]
            .copy_from_slice(&values[item * ncomps..(item + 1) * ncomps]);
    }
    out
}

/// Gather the rows `items2rows` of `values` (`ncomps` per row).
pub fn unmap<T: Copy>(items2rows: &[usize], values: &[T], ncomps: usize) -> Vec<T> {
    items2rows
        .iter()
        .flat_map(|&r| values[r * ncomps..(r + 1) * ncomps].iter().copied())
        .collect()
}

/// `1` where `a[i] >= b`.
pub fn each_geq_to<T: PartialOrd + Copy>(a: &[T], b: T) -> Vec<i8> {
    a.iter().map(|&x| i8::from(x >= b)).collect()
}

/// `1` where `a[i] > b`.
pub fn each_gt<T: PartialOrd + Copy>(a: &[T], b: T) -> Vec<i8> {
    a.iter().map(|&x| i8::from(x > b)).collect()
}

/// Largest entry, or the type's minimum for an empty array.
pub fn max<T: PartialOrd + Copy + Bounded>(a: &[T]) -> T {
    a.iter()
        .copied()
        .fold(T::min_value(), |m, x| if x > m { x } else { m })
}

/// Exclusive prefix sum; the result has one more entry than `counts`.
pub fn offset_scan(counts: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(counts.len() + 1);
    out.push(0);
    for &c in counts {
        out.push(out[out.len() - 1] + c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marked_and_scattered() {
        let flags = [0i8, 1, 0, 1];
        let marked = collect_marked(&flags);
        assert_eq!(marked, vec![1, 3]);
        let full = map_onto(&[2.5, 7.0], &marked, 4, 0.0, 1);
        assert_eq!(full, vec![0.0, 2.5, 0.0, 7.0]);
        assert_eq!(unmap(&marked, &full, 1), vec![2.5, 7.0]);
    }

    #[test]
    fn comparisons_and_max() {
        assert_eq!(each_gt(&[1.0, 2.0, 1.5], 1.5), vec![0, 1, 0]);
        assert_eq!(each_geq_to(&[1.0, 2.0, 1.5], 1.5), vec![0, 1, 1]);
        assert_eq!(max::<i8>(&[]), i8::MIN);
        assert_eq!(max(&[0i8, 1, 0]), 1);
        assert_eq!(offset_scan(&[2, 0, 3]), vec![0, 2, 2, 5]);
    }
}
