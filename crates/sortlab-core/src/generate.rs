//! Input data generation, one strategy per distribution.
//!
//! Generation is deterministic for a fixed `(seed, config)`: the RNG is
//! seeded once per run and every distribution draws from it in a fixed
//! order.

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Pareto, Zipf};

use crate::elem::Element;
use crate::types::{BenchConfig, Dist};

/// Longest sorted run produced by the `runs` distribution.
const RUNS_MAX_LEN: usize = 2048;
/// Cap on heavy-tailed run lengths so a single run cannot swallow the array.
const RUNS_HT_MAX_LEN: usize = 8192;
/// Saw tooth period cap.
const SAW_MAX_PERIOD: usize = 1024;

pub(crate) fn generate<T: Element>(cfg: &BenchConfig, rng: &mut StdRng) -> Vec<T> {
    let n = cfg.n;

    if T::STRINGY {
        // Strings are random words regardless of distribution; the ordered
        // distributions only arrange them.
        let mut v: Vec<T> = (0..n).map(|_| T::uniform(rng)).collect();
        match cfg.dist {
            Dist::Sorted => v.sort_unstable_by(T::cmp_elems),
            Dist::Reverse => {
                v.sort_unstable_by(T::cmp_elems);
                v.reverse();
            }
            _ => {}
        }
        return v;
    }

    match cfg.dist {
        Dist::Random => (0..n).map(|_| T::uniform(rng)).collect(),
        Dist::Partial => {
            let mut v: Vec<T> = (0..n).map(|_| T::uniform(rng)).collect();
            shuffle_fraction(&mut v, cfg.partial_shuffle_pct, rng);
            v
        }
        Dist::Dups => {
            let k = cfg.dup_values.max(1);
            (0..n).map(|_| T::small(rng.gen_range(0..k))).collect()
        }
        Dist::Reverse => (0..n).map(|i| T::ramp(n - 1 - i)).collect(),
        Dist::Sorted => (0..n).map(T::ramp).collect(),
        Dist::Saw => {
            let period = n.clamp(1, SAW_MAX_PERIOD);
            (0..n).map(|i| T::small((i % period) as u64)).collect()
        }
        Dist::Runs => {
            let mut v: Vec<T> = (0..n).map(|_| T::uniform(rng)).collect();
            let run_len = n.clamp(1, RUNS_MAX_LEN);
            for chunk in v.chunks_mut(run_len) {
                chunk.sort_unstable_by(T::cmp_elems);
            }
            v
        }
        Dist::Gauss => (0..n).map(|_| T::gauss(rng)).collect(),
        Dist::Exp => (0..n).map(|_| T::exponential(rng)).collect(),
        Dist::Zipf => {
            let k = cfg.dup_values.max(1);
            let zipf = Zipf::new(k, cfg.zipf_s.max(1.0 + f64::EPSILON))
                .expect("zipf parameters validated upstream");
            (0..n)
                .map(|_| T::small(zipf.sample(rng) as u64 - 1))
                .collect()
        }
        Dist::Organpipe => {
            let half = n.div_ceil(2);
            (0..n)
                .map(|i| T::ramp(if i < half { i } else { n - 1 - i }))
                .collect()
        }
        Dist::Staggered => {
            let block = cfg.stagger_block.max(1);
            let blocks = n.div_ceil(block) as u64;
            (0..n)
                .map(|i| T::small((i % block) as u64 * blocks + (i / block) as u64))
                .collect()
        }
        Dist::RunsHt => {
            let mut v: Vec<T> = (0..n).map(|_| T::uniform(rng)).collect();
            let pareto = Pareto::new(1.0, cfg.runs_alpha.max(0.05))
                .expect("pareto parameters validated upstream");
            let mut i = 0;
            while i < n {
                let draw = (pareto.sample(rng) * 16.0) as usize;
                let run_len = draw.clamp(1, RUNS_HT_MAX_LEN).min(n - i);
                v[i..i + run_len].sort_unstable_by(T::cmp_elems);
                i += run_len;
            }
            v
        }
    }
}

/// Randomly swaps `pct`% of positions, leaving the rest in place.
fn shuffle_fraction<T>(v: &mut [T], pct: u32, rng: &mut StdRng) {
    let n = v.len();
    if n == 0 {
        return;
    }
    let to_shuffle = n * (pct.min(100) as usize) / 100;
    for _ in 0..to_shuffle {
        let a = rng.gen_range(0..n);
        let b = rng.gen_range(0..n);
        v.swap(a, b);
    }
}
