//! Command-line front end for the benchmark engine.
//!
//! Prints result rows to stdout as JSON (default) or CSV. This binary is
//! also what the service's child-process execution mode spawns.

use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use sortlab_core::{
    BenchConfig, CancelFlag, Dist, ElemType, list_algorithms, run_benchmark, to_csv,
    to_json,
};

/// sortlab - benchmark sorting algorithms over generated inputs.
#[derive(Parser)]
#[command(name = "sortlab")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of elements to sort.
    #[arg(long, default_value_t = 100_000)]
    n: u64,

    /// Input distribution.
    #[arg(long, default_value = "random")]
    dist: String,

    /// Element type (i32|u32|i64|u64|f32|f64|str).
    #[arg(long, default_value = "i32")]
    elem: String,

    /// Timed passes per algorithm (0 still runs one).
    #[arg(long, default_value_t = 5)]
    repeats: u32,

    /// Untimed warmup passes per algorithm.
    #[arg(long, default_value_t = 0)]
    warmup: u32,

    /// RNG seed; fixed default when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Comma-separated algorithm names (empty = all).
    #[arg(long)]
    algo: Option<String>,

    /// Advisory thread cap.
    #[arg(long, default_value_t = 0)]
    threads: u32,

    /// Assert each pass left the array sorted.
    #[arg(long)]
    assert_sorted: bool,

    /// Cross-check every algorithm against the reference sort first.
    #[arg(long)]
    verify: bool,

    /// Baseline algorithm for speedup columns.
    #[arg(long)]
    baseline: Option<String>,

    /// Plugin shared object; may be repeated.
    #[arg(long = "plugin")]
    plugins: Vec<String>,

    /// List available algorithms for --elem and exit.
    #[arg(long)]
    list: bool,

    /// Output format.
    #[arg(long, value_enum, default_value = "json")]
    format: Format,

    /// Percentage of positions shuffled by the `partial` distribution.
    #[arg(long, default_value_t = 10)]
    partial_shuffle_pct: u32,

    /// Distinct values for `dups` and `zipf`.
    #[arg(long, default_value_t = 100)]
    dup_values: u64,

    /// Zipf skew parameter.
    #[arg(long, default_value_t = 1.2)]
    zipf_s: f64,

    /// Heavy-tail shape for `runs_ht`.
    #[arg(long, default_value_t = 1.5)]
    runs_alpha: f64,

    /// Block size for `staggered`.
    #[arg(long, default_value_t = 32)]
    stagger_block: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let Ok(elem_type) = cli.elem.parse::<ElemType>() else {
        eprintln!("invalid type");
        return ExitCode::FAILURE;
    };

    if cli.list {
        for name in list_algorithms(elem_type, &cli.plugins) {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    let Ok(dist) = cli.dist.parse::<Dist>() else {
        eprintln!("invalid dist");
        return ExitCode::FAILURE;
    };

    let algos = cli
        .algo
        .as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let cfg = BenchConfig {
        n: cli.n as usize,
        dist,
        elem_type,
        repeats: cli.repeats,
        warmup: cli.warmup,
        seed: cli.seed,
        algos,
        threads: cli.threads,
        assert_sorted: cli.assert_sorted,
        verify: cli.verify,
        baseline: cli.baseline,
        plugin_paths: cli.plugins,
        partial_shuffle_pct: cli.partial_shuffle_pct,
        dup_values: cli.dup_values,
        zipf_s: cli.zipf_s,
        runs_alpha: cli.runs_alpha,
        stagger_block: cli.stagger_block,
    };

    match run_benchmark(&cfg, &CancelFlag::new()) {
        Ok(result) => {
            match cli.format {
                Format::Json => println!("{}", to_json(&result)),
                Format::Csv => print!("{}", to_csv(&result, true)),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
