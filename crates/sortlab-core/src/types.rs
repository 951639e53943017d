//! Core value types: element types, input distributions, benchmark
//! configuration, and result rows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element type of the array being sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemType {
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Str,
}

impl ElemType {
    /// All supported element types, in canonical order.
    pub const ALL: [ElemType; 7] = [
        ElemType::I32,
        ElemType::U32,
        ElemType::I64,
        ElemType::U64,
        ElemType::F32,
        ElemType::F64,
        ElemType::Str,
    ];

    /// Stable wire name (`i32`, `u32`, ...).
    pub fn name(self) -> &'static str {
        match self {
            ElemType::I32 => "i32",
            ElemType::U32 => "u32",
            ElemType::I64 => "i64",
            ElemType::U64 => "u64",
            ElemType::F32 => "f32",
            ElemType::F64 => "f64",
            ElemType::Str => "str",
        }
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ElemType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        ElemType::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or(())
    }
}

/// Input distribution used to generate the array to sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dist {
    Random,
    Partial,
    Dups,
    Reverse,
    Sorted,
    Saw,
    Runs,
    Gauss,
    Exp,
    Zipf,
    Organpipe,
    Staggered,
    RunsHt,
}

impl Dist {
    /// All distributions, in canonical order.
    pub const ALL: [Dist; 13] = [
        Dist::Random,
        Dist::Partial,
        Dist::Dups,
        Dist::Reverse,
        Dist::Sorted,
        Dist::Saw,
        Dist::Runs,
        Dist::Gauss,
        Dist::Exp,
        Dist::Zipf,
        Dist::Organpipe,
        Dist::Staggered,
        Dist::RunsHt,
    ];

    /// Stable wire name.
    pub fn name(self) -> &'static str {
        match self {
            Dist::Random => "random",
            Dist::Partial => "partial",
            Dist::Dups => "dups",
            Dist::Reverse => "reverse",
            Dist::Sorted => "sorted",
            Dist::Saw => "saw",
            Dist::Runs => "runs",
            Dist::Gauss => "gauss",
            Dist::Exp => "exp",
            Dist::Zipf => "zipf",
            Dist::Organpipe => "organpipe",
            Dist::Staggered => "staggered",
            Dist::RunsHt => "runs_ht",
        }
    }
}

impl fmt::Display for Dist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dist {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        if s == "organ-pipe" {
            return Ok(Dist::Organpipe);
        }
        Dist::ALL.into_iter().find(|d| d.name() == s).ok_or(())
    }
}

/// Seed used when the caller does not supply one. Fixed so that identical
/// requests produce identical inputs across processes.
pub const DEFAULT_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// A single validated benchmark invocation.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub n: usize,
    pub dist: Dist,
    pub elem_type: ElemType,
    /// Timed passes per algorithm; `0` still runs one timed pass.
    pub repeats: u32,
    /// Untimed passes before measurement.
    pub warmup: u32,
    pub seed: Option<u64>,
    /// Exact algorithm names to run (case-insensitive); empty selects all.
    pub algos: Vec<String>,
    /// Advisory thread cap, recorded but unused by the built-in set.
    pub threads: u32,
    /// Verify each timed pass left the array sorted.
    pub assert_sorted: bool,
    /// Cross-check every selected algorithm against the reference sort.
    pub verify: bool,
    pub baseline: Option<String>,
    pub plugin_paths: Vec<String>,
    pub partial_shuffle_pct: u32,
    pub dup_values: u64,
    pub zipf_s: f64,
    pub runs_alpha: f64,
    pub stagger_block: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            n: 100_000,
            dist: Dist::Random,
            elem_type: ElemType::I32,
            repeats: 5,
            warmup: 0,
            seed: None,
            algos: Vec::new(),
            threads: 0,
            assert_sorted: false,
            verify: false,
            baseline: None,
            plugin_paths: Vec::new(),
            partial_shuffle_pct: 10,
            dup_values: 100,
            zipf_s: 1.2,
            runs_alpha: 1.5,
            stagger_block: 32,
        }
    }
}

/// Timing statistics over the timed passes of one algorithm, milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    pub median_ms: f64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub stddev_ms: f64,
}

/// One result row per selected algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub algo: String,
    #[serde(rename = "N")]
    pub n: usize,
    pub dist: String,
    #[serde(flatten)]
    pub stats: TimingStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speedup_vs_baseline: Option<f64>,
}

/// Outcome of a full benchmark run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub elem_type: ElemType,
    pub n: usize,
    pub dist: Dist,
    pub repeats: u32,
    pub seed: Option<u64>,
    pub baseline: Option<String>,
    pub rows: Vec<ResultRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elem_type_round_trip() {
        for t in ElemType::ALL {
            assert_eq!(t.name().parse::<ElemType>(), Ok(t));
        }
        assert!("i128".parse::<ElemType>().is_err());
    }

    #[test]
    fn dist_round_trip() {
        for d in Dist::ALL {
            assert_eq!(d.name().parse::<Dist>(), Ok(d));
        }
        assert_eq!("organ-pipe".parse::<Dist>(), Ok(Dist::Organpipe));
        assert!("swirl".parse::<Dist>().is_err());
    }

    #[test]
    fn result_row_serializes_wire_names() {
        let row = ResultRow {
            algo: "std_sort".to_string(),
            n: 256,
            dist: "runs".to_string(),
            stats: TimingStats {
                median_ms: 1.5,
                mean_ms: 1.6,
                min_ms: 1.0,
                max_ms: 2.0,
                stddev_ms: 0.3,
            },
            speedup_vs_baseline: None,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["N"], 256);
        assert_eq!(json["median_ms"], 1.5);
        assert!(json.get("speedup_vs_baseline").is_none());
    }
}
