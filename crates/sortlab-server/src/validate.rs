//! Request validation and engine-call construction.
//!
//! Validation is the only place request bounds are enforced; nothing
//! downstream re-checks. `build_engine_call` is total and deterministic: a
//! validated request always maps to the same invocation.

use serde::{Deserialize, Serialize};

use sortlab_core::{BenchConfig, Dist, ElemType, list_algorithms};

use crate::config::ServerConfig;

/// Benchmark request body. Unknown fields are ignored. `Serialize` is for
/// the durable store's `request_json` column.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunRequest {
    #[serde(rename = "N", default)]
    pub n: i64,
    #[serde(default)]
    pub dist: String,
    #[serde(rename = "type", default)]
    pub elem_type: String,
    #[serde(default)]
    pub repeats: i64,
    #[serde(default)]
    pub warmup: i64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub algos: Vec<String>,
    #[serde(default)]
    pub threads: i64,
    #[serde(default)]
    pub assert_sorted: bool,
    #[serde(default)]
    pub baseline: Option<String>,
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub timeout_ms: i64,
    #[serde(default)]
    pub partial_shuffle_pct: Option<i64>,
    #[serde(default)]
    pub dup_values: Option<i64>,
    #[serde(default)]
    pub zipf_s: Option<f64>,
    #[serde(default)]
    pub runs_alpha: Option<f64>,
    #[serde(default)]
    pub stagger_block: Option<i64>,
}

/// A canonical engine invocation: the in-process configuration plus the
/// equivalent child-process argv.
#[derive(Debug, Clone)]
pub struct EngineCall {
    pub config: BenchConfig,
    pub argv: Vec<String>,
}

/// Bounds- and membership-checks a request against the server caps.
///
/// Returns a single-line message on the first violation; no partial
/// configuration escapes.
pub fn validate(req: &RunRequest, caps: &ServerConfig) -> Result<(), String> {
    if req.n <= 0 || req.n as u64 > caps.max_n {
        return Err(format!("N must be in [1,{}]", caps.max_n));
    }
    if req.repeats < 0 || req.repeats > i64::from(caps.max_repeats) {
        return Err(format!("repeats must be in [0,{}]", caps.max_repeats));
    }
    if req.warmup < 0 {
        return Err("warmup must be non-negative".to_string());
    }
    if req.threads < 0 || req.threads > i64::from(caps.max_threads) {
        return Err(format!("threads must be in [0,{}]", caps.max_threads));
    }
    if req.timeout_ms < 0 {
        return Err("timeout_ms must be non-negative".to_string());
    }
    if req.dist.parse::<Dist>().is_err() {
        return Err("invalid dist".to_string());
    }
    let Ok(elem_type) = req.elem_type.parse::<ElemType>() else {
        return Err("invalid type".to_string());
    };

    if let Some(pct) = req.partial_shuffle_pct {
        if !(0..=100).contains(&pct) {
            return Err("partial_shuffle_pct must be in [0,100]".to_string());
        }
    }
    if let Some(k) = req.dup_values {
        if k < 1 {
            return Err("dup_values must be positive".to_string());
        }
    }
    if let Some(s) = req.zipf_s {
        if !(s > 1.0) {
            return Err("zipf_s must be greater than 1".to_string());
        }
    }
    if let Some(a) = req.runs_alpha {
        if !(a > 0.0) {
            return Err("runs_alpha must be positive".to_string());
        }
    }
    if let Some(b) = req.stagger_block {
        if b < 1 {
            return Err("stagger_block must be positive".to_string());
        }
    }

    if caps.strict_algos {
        let known = list_algorithms(elem_type, &[]);
        let unknown = req
            .algos
            .iter()
            .chain(req.baseline.iter())
            .find(|name| !known.iter().any(|k| k.eq_ignore_ascii_case(name)));
        if let Some(name) = unknown {
            return Err(format!("unknown algorithm: {name}"));
        }
    }

    Ok(())
}

/// Translates a validated request into a canonical engine invocation.
pub fn build_engine_call(req: &RunRequest) -> EngineCall {
    let defaults = BenchConfig::default();
    let config = BenchConfig {
        n: req.n as usize,
        dist: req.dist.parse().expect("dist validated"),
        elem_type: req.elem_type.parse().expect("type validated"),
        repeats: req.repeats as u32,
        warmup: req.warmup as u32,
        seed: req.seed,
        algos: req.algos.clone(),
        threads: req.threads as u32,
        assert_sorted: req.assert_sorted,
        verify: false,
        baseline: req.baseline.clone().filter(|b| !b.is_empty()),
        plugin_paths: req.plugins.iter().filter(|p| !p.is_empty()).cloned().collect(),
        partial_shuffle_pct: req
            .partial_shuffle_pct
            .map_or(defaults.partial_shuffle_pct, |v| v as u32),
        dup_values: req.dup_values.map_or(defaults.dup_values, |v| v as u64),
        zipf_s: req.zipf_s.unwrap_or(defaults.zipf_s),
        runs_alpha: req.runs_alpha.unwrap_or(defaults.runs_alpha),
        stagger_block: req
            .stagger_block
            .map_or(defaults.stagger_block, |v| v as usize),
    };
    let argv = argv_for(&config);
    EngineCall { config, argv }
}

/// The `sortlab` CLI argv equivalent of an in-process configuration.
fn argv_for(cfg: &BenchConfig) -> Vec<String> {
    let mut argv = vec![
        "--n".to_string(),
        cfg.n.to_string(),
        "--dist".to_string(),
        cfg.dist.name().to_string(),
        "--elem".to_string(),
        cfg.elem_type.name().to_string(),
        "--format".to_string(),
        "json".to_string(),
        "--repeats".to_string(),
        cfg.repeats.to_string(),
    ];
    if cfg.warmup > 0 {
        argv.push("--warmup".to_string());
        argv.push(cfg.warmup.to_string());
    }
    if let Some(seed) = cfg.seed {
        argv.push("--seed".to_string());
        argv.push(seed.to_string());
    }
    if !cfg.algos.is_empty() {
        argv.push("--algo".to_string());
        argv.push(cfg.algos.join(","));
    }
    if cfg.threads > 0 {
        argv.push("--threads".to_string());
        argv.push(cfg.threads.to_string());
    }
    if cfg.assert_sorted {
        argv.push("--assert-sorted".to_string());
    }
    if let Some(baseline) = &cfg.baseline {
        argv.push("--baseline".to_string());
        argv.push(baseline.clone());
    }
    for plugin in &cfg.plugin_paths {
        argv.push("--plugin".to_string());
        argv.push(plugin.clone());
    }
    let defaults = BenchConfig::default();
    if cfg.partial_shuffle_pct != defaults.partial_shuffle_pct {
        argv.push("--partial-shuffle-pct".to_string());
        argv.push(cfg.partial_shuffle_pct.to_string());
    }
    if cfg.dup_values != defaults.dup_values {
        argv.push("--dup-values".to_string());
        argv.push(cfg.dup_values.to_string());
    }
    if cfg.zipf_s != defaults.zipf_s {
        argv.push("--zipf-s".to_string());
        argv.push(cfg.zipf_s.to_string());
    }
    if cfg.runs_alpha != defaults.runs_alpha {
        argv.push("--runs-alpha".to_string());
        argv.push(cfg.runs_alpha.to_string());
    }
    if cfg.stagger_block != defaults.stagger_block {
        argv.push("--stagger-block".to_string());
        argv.push(cfg.stagger_block.to_string());
    }
    argv
}
