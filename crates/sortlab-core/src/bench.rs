//! The timing loop: generate once, run each selected algorithm, emit stats.

use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::algos::{self, Algo};
use crate::cancel::CancelFlag;
use crate::elem::Element;
use crate::error::{EngineError, EngineResult};
use crate::generate;
use crate::plugin::{self, Retention};
use crate::types::{
    BenchConfig, DEFAULT_SEED, ElemType, ResultRow, RunResult, TimingStats,
};

/// Executes one benchmark run.
///
/// Deterministic for a fixed `(seed, config)`. Polls `cancel` between
/// passes and returns [`EngineError::Canceled`] at the next boundary.
pub fn run_benchmark(cfg: &BenchConfig, cancel: &CancelFlag) -> EngineResult<RunResult> {
    if cfg.n == 0 {
        return Err(EngineError::InvalidConfig("N must be positive".to_string()));
    }
    match cfg.elem_type {
        ElemType::I32 => run_typed::<i32>(cfg, cancel),
        ElemType::U32 => run_typed::<u32>(cfg, cancel),
        ElemType::I64 => run_typed::<i64>(cfg, cancel),
        ElemType::U64 => run_typed::<u64>(cfg, cancel),
        ElemType::F32 => run_typed::<f32>(cfg, cancel),
        ElemType::F64 => run_typed::<f64>(cfg, cancel),
        ElemType::Str => run_typed::<String>(cfg, cancel),
    }
}

/// Lists algorithm names available for one element type, including plugin
/// contributions. Plugin handles opened here are closed before returning.
pub fn list_algorithms(elem_type: ElemType, plugin_paths: &[String]) -> Vec<String> {
    fn names<T: Element>(plugin_paths: &[String]) -> Vec<String> {
        let mut regs = algos::built_in::<T>();
        if !plugin_paths.is_empty() && !T::STRINGY {
            plugin::load_for_type::<T>(plugin_paths, &mut regs, Retention::Transient);
        }
        regs.into_iter().map(|a| a.name).collect()
    }

    match elem_type {
        ElemType::I32 => names::<i32>(plugin_paths),
        ElemType::U32 => names::<u32>(plugin_paths),
        ElemType::I64 => names::<i64>(plugin_paths),
        ElemType::U64 => names::<u64>(plugin_paths),
        ElemType::F32 => names::<f32>(plugin_paths),
        ElemType::F64 => names::<f64>(plugin_paths),
        ElemType::Str => names::<String>(plugin_paths),
    }
}

fn run_typed<T: Element>(cfg: &BenchConfig, cancel: &CancelFlag) -> EngineResult<RunResult> {
    let mut regs = algos::built_in::<T>();
    if !cfg.plugin_paths.is_empty() && !T::STRINGY {
        plugin::load_for_type::<T>(&cfg.plugin_paths, &mut regs, Retention::Process);
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed.unwrap_or(DEFAULT_SEED));
    let original: Vec<T> = generate::generate(cfg, &mut rng);
    let selected: Vec<&Algo<T>> = regs
        .iter()
        .filter(|a| name_selected(&cfg.algos, &a.name))
        .collect();

    if cfg.verify {
        verify_against_reference(cfg, &original, &selected)?;
    }

    let timed_passes = cfg.repeats.max(1);
    let mut raw: Vec<(String, Vec<f64>)> = Vec::with_capacity(selected.len());
    let mut work: Vec<T> = Vec::with_capacity(original.len());

    for &algo in &selected {
        for _ in 0..cfg.warmup {
            check_cancel(cancel)?;
            let _ = timed_pass(algo, &original, &mut work, cfg.assert_sorted)?;
        }
        let mut times = Vec::with_capacity(timed_passes as usize);
        for _ in 0..timed_passes {
            check_cancel(cancel)?;
            times.push(timed_pass(algo, &original, &mut work, cfg.assert_sorted)?);
        }
        raw.push((algo.name.clone(), times));
    }

    let baseline_median = cfg.baseline.as_deref().and_then(|b| {
        raw.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(b))
            .map(|(_, times)| compute_stats(times).median_ms)
    });

    let dist_name = cfg.dist.name().to_string();
    let rows = raw
        .iter()
        .map(|(name, times)| {
            let stats = compute_stats(times);
            let speedup = baseline_median
                .map(|base| round3(base / stats.median_ms.max(1e-12)));
            ResultRow {
                algo: name.clone(),
                n: cfg.n,
                dist: dist_name.clone(),
                stats: round_stats(stats),
                speedup_vs_baseline: speedup,
            }
        })
        .collect();

    Ok(RunResult {
        elem_type: cfg.elem_type,
        n: cfg.n,
        dist: cfg.dist,
        repeats: timed_passes,
        seed: cfg.seed,
        baseline: cfg.baseline.clone(),
        rows,
    })
}

fn check_cancel(cancel: &CancelFlag) -> EngineResult<()> {
    if cancel.is_canceled() {
        return Err(EngineError::Canceled);
    }
    Ok(())
}

/// Empty selection means "all"; otherwise case-insensitive exact match.
fn name_selected(selected: &[String], name: &str) -> bool {
    selected.is_empty() || selected.iter().any(|s| s.eq_ignore_ascii_case(name))
}

fn timed_pass<T: Element>(
    algo: &Algo<T>,
    original: &[T],
    work: &mut Vec<T>,
    assert_sorted: bool,
) -> EngineResult<f64> {
    work.clear();
    work.extend_from_slice(original);
    let start = Instant::now();
    (algo.run)(work);
    let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;
    if assert_sorted && !is_sorted::<T>(work) {
        return Err(EngineError::SortAssertion(format!(
            "output not sorted (algo={})",
            algo.name
        )));
    }
    Ok(elapsed_ms)
}

fn verify_against_reference<T: Element>(
    cfg: &BenchConfig,
    original: &[T],
    selected: &[&Algo<T>],
) -> EngineResult<()> {
    let mut reference = original.to_vec();
    reference.sort_by(T::cmp_elems);
    for algo in selected {
        let mut work = original.to_vec();
        (algo.run)(&mut work);
        if !is_sorted::<T>(&work) {
            return Err(EngineError::SortAssertion(format!(
                "verification failed, not sorted: {}",
                algo.name
            )));
        }
        let matches = work.len() == reference.len()
            && work
                .iter()
                .zip(reference.iter())
                .all(|(a, b)| T::cmp_elems(a, b).is_eq());
        if !matches {
            return Err(EngineError::SortAssertion(format!(
                "verification mismatch vs reference sort: {}",
                algo.name
            )));
        }
    }
    // The reference covers ordering for all selected algorithms; nothing to
    // report on success.
    tracing::debug!(n = cfg.n, dist = %cfg.dist, "verification passed");
    Ok(())
}

fn is_sorted<T: Element>(v: &[T]) -> bool {
    v.windows(2).all(|w| T::cmp_elems(&w[0], &w[1]).is_le())
}

fn compute_stats(times: &[f64]) -> TimingStats {
    if times.is_empty() {
        return TimingStats {
            median_ms: 0.0,
            mean_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
            stddev_ms: 0.0,
        };
    }
    let mut sorted = times.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        0.5 * (sorted[mid - 1] + sorted[mid])
    };
    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    let stddev = if sorted.len() >= 2 {
        let var = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
            / sorted.len() as f64;
        var.sqrt()
    } else {
        0.0
    };
    TimingStats {
        median_ms: median,
        mean_ms: mean,
        min_ms: sorted[0],
        max_ms: sorted[sorted.len() - 1],
        stddev_ms: stddev,
    }
}

fn round_stats(s: TimingStats) -> TimingStats {
    TimingStats {
        median_ms: round3(s.median_ms),
        mean_ms: round3(s.mean_ms),
        min_ms: round3(s.min_ms),
        max_ms: round3(s.max_ms),
        stddev_ms: round3(s.stddev_ms),
    }
}

/// Rounds to the 3-decimal precision the wire format promises.
fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dist;

    fn small_cfg() -> BenchConfig {
        BenchConfig {
            n: 256,
            dist: Dist::Runs,
            elem_type: ElemType::I32,
            repeats: 1,
            algos: vec!["std_sort".to_string()],
            assert_sorted: true,
            ..BenchConfig::default()
        }
    }

    #[test]
    fn small_run_produces_one_row() {
        let result = run_benchmark(&small_cfg(), &CancelFlag::new()).unwrap();
        assert_eq!(result.rows.len(), 1);
        let row = &result.rows[0];
        assert_eq!(row.algo, "std_sort");
        assert_eq!(row.n, 256);
        assert_eq!(row.dist, "runs");
        assert!(row.stats.median_ms >= 0.0);
        assert!(row.speedup_vs_baseline.is_none());
    }

    #[test]
    fn zero_repeats_still_times_one_pass() {
        let mut cfg = small_cfg();
        cfg.repeats = 0;
        let result = run_benchmark(&cfg, &CancelFlag::new()).unwrap();
        assert_eq!(result.repeats, 1);
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn empty_selection_runs_full_builtin_set() {
        let mut cfg = small_cfg();
        cfg.algos.clear();
        let result = run_benchmark(&cfg, &CancelFlag::new()).unwrap();
        let names = list_algorithms(ElemType::I32, &[]);
        assert_eq!(result.rows.len(), names.len());
    }

    #[test]
    fn unknown_algorithm_produces_no_row() {
        let mut cfg = small_cfg();
        cfg.algos = vec!["definitely_not_real".to_string()];
        let result = run_benchmark(&cfg, &CancelFlag::new()).unwrap();
        assert!(result.rows.is_empty());
    }

    #[test]
    fn baseline_speedup_present_on_every_row() {
        let mut cfg = small_cfg();
        cfg.algos = vec!["std_sort".to_string(), "heap_sort".to_string()];
        cfg.baseline = Some("std_sort".to_string());
        let result = run_benchmark(&cfg, &CancelFlag::new()).unwrap();
        assert_eq!(result.rows.len(), 2);
        assert!(result.rows.iter().all(|r| r.speedup_vs_baseline.is_some()));
    }

    #[test]
    fn canceled_before_start_returns_canceled() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = run_benchmark(&small_cfg(), &cancel).unwrap_err();
        assert!(matches!(err, EngineError::Canceled));
    }

    #[test]
    fn zero_n_is_invalid_config() {
        let mut cfg = small_cfg();
        cfg.n = 0;
        let err = run_benchmark(&cfg, &CancelFlag::new()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn identical_seed_and_config_give_identical_input_ordering() {
        // Same (seed, request) must sort the same data: compare the sorted
        // outputs via a verify run, twice.
        let mut cfg = small_cfg();
        cfg.verify = true;
        cfg.seed = Some(99);
        assert!(run_benchmark(&cfg, &CancelFlag::new()).is_ok());
        assert!(run_benchmark(&cfg, &CancelFlag::new()).is_ok());
    }

    #[test]
    fn every_type_runs_the_full_set_sorted() {
        for elem_type in ElemType::ALL {
            let cfg = BenchConfig {
                n: 512,
                dist: Dist::Random,
                elem_type,
                repeats: 1,
                verify: true,
                assert_sorted: true,
                ..BenchConfig::default()
            };
            let result = run_benchmark(&cfg, &CancelFlag::new()).unwrap();
            assert!(!result.rows.is_empty(), "no rows for {elem_type}");
        }
    }

    #[test]
    fn stats_math_on_known_vector() {
        let stats = compute_stats(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(stats.median_ms, 2.5);
        assert_eq!(stats.mean_ms, 2.5);
        assert_eq!(stats.min_ms, 1.0);
        assert_eq!(stats.max_ms, 4.0);
        // Population stddev of 1..4 is sqrt(1.25).
        assert!((stats.stddev_ms - 1.25f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn median_of_odd_count_is_middle() {
        let stats = compute_stats(&[9.0, 1.0, 5.0]);
        assert_eq!(stats.median_ms, 5.0);
    }
}
