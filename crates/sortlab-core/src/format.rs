//! Result formatting helpers. Pure; no file I/O.

use crate::types::RunResult;

/// Renders the rows as a JSON array, the service wire format.
pub fn to_json(result: &RunResult) -> String {
    serde_json::to_string_pretty(&result.rows).expect("rows serialize infallibly")
}

/// Renders the rows as CSV for the CLI.
pub fn to_csv(result: &RunResult, with_header: bool) -> String {
    let speedup = result.baseline.is_some();
    let mut out = String::new();
    if with_header {
        out.push_str("algo,N,dist,median_ms,mean_ms,min_ms,max_ms,stddev_ms");
        if speedup {
            out.push_str(",speedup_vs_baseline");
        }
        out.push('\n');
    }
    for row in &result.rows {
        out.push_str(&format!(
            "{},{},{},{:.3},{:.3},{:.3},{:.3},{:.3}",
            row.algo,
            row.n,
            row.dist,
            row.stats.median_ms,
            row.stats.mean_ms,
            row.stats.min_ms,
            row.stats.max_ms,
            row.stats.stddev_ms,
        ));
        if speedup {
            out.push_str(&format!(
                ",{:.3}",
                row.speedup_vs_baseline.unwrap_or(1.0)
            ));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dist, ElemType, ResultRow, TimingStats};

    fn sample() -> RunResult {
        RunResult {
            elem_type: ElemType::I32,
            n: 10,
            dist: Dist::Runs,
            repeats: 1,
            seed: None,
            baseline: None,
            rows: vec![ResultRow {
                algo: "std_sort".to_string(),
                n: 10,
                dist: "runs".to_string(),
                stats: TimingStats {
                    median_ms: 0.1,
                    mean_ms: 0.1,
                    min_ms: 0.1,
                    max_ms: 0.1,
                    stddev_ms: 0.0,
                },
                speedup_vs_baseline: None,
            }],
        }
    }

    #[test]
    fn json_is_an_array_of_rows() {
        let parsed: serde_json::Value = serde_json::from_str(&to_json(&sample())).unwrap();
        let rows = parsed.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["algo"], "std_sort");
        assert_eq!(rows[0]["N"], 10);
    }

    #[test]
    fn csv_header_omits_speedup_without_baseline() {
        let csv = to_csv(&sample(), true);
        let header = csv.lines().next().unwrap();
        assert!(!header.contains("speedup"));
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn csv_includes_speedup_with_baseline() {
        let mut result = sample();
        result.baseline = Some("std_sort".to_string());
        result.rows[0].speedup_vs_baseline = Some(1.0);
        let csv = to_csv(&result, true);
        assert!(csv.lines().next().unwrap().ends_with("speedup_vs_baseline"));
        assert!(csv.lines().nth(1).unwrap().ends_with("1.000"));
    }
}
