//! Built-in sort algorithms and the per-type registry.
//!
//! Every algorithm sorts in place, ascending, through the element's total
//! order. The registry is rebuilt per run; plugin entries are appended by
//! [`crate::plugin`].

use std::sync::Arc;

use crate::elem::Element;

/// A registered algorithm: name plus an in-place ascending sort.
pub(crate) struct Algo<T> {
    pub name: String,
    pub run: Arc<dyn Fn(&mut Vec<T>) + Send + Sync>,
}

/// Builds the built-in registry for one element type.
pub(crate) fn built_in<T: Element>() -> Vec<Algo<T>> {
    let mut regs: Vec<Algo<T>> = vec![
        algo("std_sort", |v| v.sort_unstable_by(T::cmp_elems)),
        algo("std_stable_sort", |v| v.sort_by(T::cmp_elems)),
        algo("heap_sort", |v| heap_sort::<T>(v)),
        algo("merge_sort_opt", |v| merge_sort_opt::<T>(v)),
        algo("timsort", |v| timsort::<T>(v)),
        algo("quicksort_hybrid", |v| quicksort_hybrid::<T>(v)),
    ];
    if T::RADIX_BYTES.is_some() {
        regs.push(algo("radix_sort_lsd", |v| radix_sort_lsd::<T>(v)));
    }
    regs
}

fn algo<T>(name: &str, f: impl Fn(&mut Vec<T>) + Send + Sync + 'static) -> Algo<T> {
    Algo {
        name: name.to_string(),
        run: Arc::new(f),
    }
}

const INSERTION_THRESHOLD: usize = 64;

fn insertion_sort<T: Element>(v: &mut [T]) {
    for i in 1..v.len() {
        let mut j = i;
        while j > 0 && T::cmp_elems(&v[j - 1], &v[j]).is_gt() {
            v.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Heap sort via explicit sift-down (std's `BinaryHeap` needs `Ord`).
fn heap_sort<T: Element>(v: &mut [T]) {
    let n = v.len();
    if n < 2 {
        return;
    }
    for i in (0..n / 2).rev() {
        sift_down::<T>(v, i, n);
    }
    for end in (1..n).rev() {
        v.swap(0, end);
        sift_down::<T>(v, 0, end);
    }
}

fn sift_down<T: Element>(v: &mut [T], mut root: usize, end: usize) {
    loop {
        let left = 2 * root + 1;
        if left >= end {
            return;
        }
        let mut largest = root;
        if T::cmp_elems(&v[left], &v[largest]).is_gt() {
            largest = left;
        }
        let right = left + 1;
        if right < end && T::cmp_elems(&v[right], &v[largest]).is_gt() {
            largest = right;
        }
        if largest == root {
            return;
        }
        v.swap(root, largest);
        root = largest;
    }
}

/// Bottom-up merge sort with a single scratch buffer.
fn merge_sort_opt<T: Element>(v: &mut Vec<T>) {
    let n = v.len();
    if n < 2 {
        return;
    }
    let mut buf = v.clone();
    let mut width = 1;
    while width < n {
        let mut i = 0;
        while i < n {
            let mid = (i + width).min(n);
            let right = (i + 2 * width).min(n);
            if mid < right {
                merge_into::<T>(&v[i..mid], &v[mid..right], &mut buf[i..right]);
                v[i..right].clone_from_slice(&buf[i..right]);
            }
            i += 2 * width;
        }
        width <<= 1;
    }
}

fn merge_into<T: Element>(a: &[T], b: &[T], out: &mut [T]) {
    let (mut i, mut j) = (0, 0);
    for slot in out.iter_mut() {
        if i < a.len() && (j >= b.len() || T::cmp_elems(&a[i], &b[j]).is_le()) {
            *slot = a[i].clone();
            i += 1;
        } else {
            *slot = b[j].clone();
            j += 1;
        }
    }
}

/// Simplified timsort: detect (and reverse) natural runs, extend short runs
/// with binary insertion, then merge pairwise.
fn timsort<T: Element>(v: &mut Vec<T>) {
    const MINRUN: usize = 32;
    let n = v.len();
    if n < 2 {
        return;
    }
    let mut buf = v.clone();
    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut i = 0;
    while i < n {
        let mut j = next_run::<T>(v, i);
        if j - i < MINRUN {
            let hi = (i + MINRUN).min(n);
            binary_insertion::<T>(v, i, hi);
            j = hi;
        }
        runs.push((i, j));
        i = j;
    }
    while runs.len() > 1 {
        let mut merged = Vec::with_capacity(runs.len() / 2 + 1);
        let mut k = 0;
        while k + 1 < runs.len() {
            let (a, b) = runs[k];
            let (_, d) = runs[k + 1];
            merge_into::<T>(&v[a..b], &v[b..d], &mut buf[a..d]);
            v[a..d].clone_from_slice(&buf[a..d]);
            merged.push((a, d));
            k += 2;
        }
        if runs.len() % 2 == 1 {
            merged.push(*runs.last().expect("non-empty run stack"));
        }
        runs = merged;
    }
}

/// Finds the end of the maximal run starting at `i`, reversing it when
/// strictly descending.
fn next_run<T: Element>(v: &mut [T], i: usize) -> usize {
    let n = v.len();
    let mut j = i + 1;
    if j >= n {
        return n;
    }
    if T::cmp_elems(&v[j], &v[i]).is_lt() {
        while j < n && T::cmp_elems(&v[j], &v[j - 1]).is_lt() {
            j += 1;
        }
        v[i..j].reverse();
    } else {
        while j < n && !T::cmp_elems(&v[j], &v[j - 1]).is_lt() {
            j += 1;
        }
    }
    j
}

fn binary_insertion<T: Element>(v: &mut [T], lo: usize, hi: usize) {
    for i in lo + 1..hi {
        let target =
            lo + v[lo..i].partition_point(|x| !T::cmp_elems(&v[i], x).is_lt());
        v[target..=i].rotate_right(1);
    }
}

/// Median-of-three quicksort recursing into the smaller side, with an
/// insertion-sort cutoff for short ranges.
fn quicksort_hybrid<T: Element>(v: &mut [T]) {
    if !v.is_empty() {
        quicksort_range::<T>(v, 0, v.len());
    }
}

fn quicksort_range<T: Element>(v: &mut [T], mut lo: usize, mut hi: usize) {
    while hi - lo > INSERTION_THRESHOLD {
        let mid = lo + (hi - lo) / 2;
        if T::cmp_elems(&v[mid], &v[lo]).is_lt() {
            v.swap(mid, lo);
        }
        if T::cmp_elems(&v[hi - 1], &v[mid]).is_lt() {
            v.swap(hi - 1, mid);
        }
        if T::cmp_elems(&v[mid], &v[lo]).is_lt() {
            v.swap(mid, lo);
        }
        let pivot = v[mid].clone();

        // Hoare partition.
        let mut i = lo;
        let mut j = hi - 1;
        loop {
            while T::cmp_elems(&v[i], &pivot).is_lt() {
                i += 1;
            }
            while T::cmp_elems(&pivot, &v[j]).is_lt() {
                j -= 1;
            }
            if i >= j {
                break;
            }
            v.swap(i, j);
            i += 1;
            j -= 1;
        }

        // Recurse into the smaller side, loop on the larger.
        if j + 1 - lo < hi - (j + 1) {
            quicksort_range::<T>(v, lo, j + 1);
            lo = j + 1;
        } else {
            quicksort_range::<T>(v, j + 1, hi);
            hi = j + 1;
        }
    }
    insertion_sort::<T>(&mut v[lo..hi]);
}

/// LSD radix sort over the element's order-preserving u64 key, one byte per
/// pass. Only registered for integral types.
fn radix_sort_lsd<T: Element>(v: &mut Vec<T>) {
    let Some(bytes) = T::RADIX_BYTES else {
        return;
    };
    let n = v.len();
    if n < 2 {
        return;
    }
    let mut tmp = v.clone();
    for pass in 0..bytes {
        let shift = pass * 8;
        let mut counts = [0usize; 256];
        for x in v.iter() {
            counts[((x.radix_key() >> shift) & 0xFF) as usize] += 1;
        }
        let mut positions = [0usize; 256];
        let mut run = 0;
        for (pos, count) in positions.iter_mut().zip(counts.iter()) {
            *pos = run;
            run += count;
        }
        for x in v.iter() {
            let idx = ((x.radix_key() >> shift) & 0xFF) as usize;
            tmp[positions[idx]] = x.clone();
            positions[idx] += 1;
        }
        std::mem::swap(v, &mut tmp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn is_sorted<T: Element>(v: &[T]) -> bool {
        v.windows(2).all(|w| T::cmp_elems(&w[0], &w[1]).is_le())
    }

    fn random_i32(n: usize, seed: u64) -> Vec<i32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen()).collect()
    }

    #[test]
    fn every_builtin_sorts_random_i32() {
        let original = random_i32(5000, 17);
        let mut expected = original.clone();
        expected.sort_unstable();
        for algo in built_in::<i32>() {
            let mut work = original.clone();
            (algo.run)(&mut work);
            assert_eq!(work, expected, "algo {} mis-sorted", algo.name);
        }
    }

    #[test]
    fn every_builtin_handles_empty_and_single() {
        for algo in built_in::<i32>() {
            let mut empty: Vec<i32> = vec![];
            (algo.run)(&mut empty);
            assert!(empty.is_empty());

            let mut one = vec![42];
            (algo.run)(&mut one);
            assert_eq!(one, vec![42]);
        }
    }

    #[test]
    fn builtins_sort_floats_with_total_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let original: Vec<f64> = (0..2000).map(|_| rng.gen::<f64>() - 0.5).collect();
        for algo in built_in::<f64>() {
            let mut work = original.clone();
            (algo.run)(&mut work);
            assert!(is_sorted::<f64>(&work), "algo {} mis-sorted", algo.name);
        }
    }

    #[test]
    fn builtins_sort_strings() {
        let words: Vec<String> = ["pear", "apple", "fig", "date", "plum", "kiwi"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for algo in built_in::<String>() {
            let mut work = words.clone();
            (algo.run)(&mut work);
            assert!(is_sorted::<String>(&work), "algo {} mis-sorted", algo.name);
        }
    }

    #[test]
    fn radix_registered_for_ints_only() {
        let int_names: Vec<String> = built_in::<i64>().into_iter().map(|a| a.name).collect();
        assert!(int_names.contains(&"radix_sort_lsd".to_string()));
        let float_names: Vec<String> = built_in::<f32>().into_iter().map(|a| a.name).collect();
        assert!(!float_names.contains(&"radix_sort_lsd".to_string()));
        let str_names: Vec<String> = built_in::<String>().into_iter().map(|a| a.name).collect();
        assert!(!str_names.contains(&"radix_sort_lsd".to_string()));
    }

    #[test]
    fn radix_sorts_negative_values() {
        let original = vec![5i32, -3, 0, i32::MIN, i32::MAX, -3, 7];
        let mut expected = original.clone();
        expected.sort_unstable();
        let mut work = original;
        radix_sort_lsd::<i32>(&mut work);
        assert_eq!(work, expected);
    }

    #[test]
    fn quicksort_handles_all_equal() {
        let mut v = vec![9i32; 1000];
        quicksort_hybrid::<i32>(&mut v);
        assert_eq!(v, vec![9i32; 1000]);
    }

    #[test]
    fn timsort_exploits_presorted_input() {
        let mut v: Vec<i32> = (0..10_000).collect();
        timsort::<i32>(&mut v);
        assert!(is_sorted::<i32>(&v));

        let mut rev: Vec<i32> = (0..10_000).rev().collect();
        timsort::<i32>(&mut rev);
        assert!(is_sorted::<i32>(&rev));
    }
}
