//! # sortlab-core: the sort-benchmarking engine
//!
//! Generates typed input arrays under a chosen distribution, runs each
//! selected sorting algorithm over identical copies, and reports timing
//! statistics per algorithm. Algorithms come from a built-in registry plus
//! optional dynamically loaded plugins speaking a stable C ABI.
//!
//! The engine is synchronous and deterministic for a fixed `(seed, config)`.
//! Callers that need cancellation hand in a [`CancelFlag`] and flip it from
//! another thread; the engine polls it between passes.
//!
//! ## Usage
//!
//! ```
//! use sortlab_core::{BenchConfig, CancelFlag, run_benchmark};
//!
//! let cfg = BenchConfig {
//!     n: 1024,
//!     repeats: 3,
//!     ..BenchConfig::default()
//! };
//! let result = run_benchmark(&cfg, &CancelFlag::new()).unwrap();
//! assert!(!result.rows.is_empty());
//! ```

mod algos;
mod bench;
mod cancel;
mod elem;
mod error;
mod format;
mod generate;
pub mod plugin;
mod types;

pub use bench::{list_algorithms, run_benchmark};
pub use cancel::CancelFlag;
pub use error::{EngineError, EngineResult};
pub use format::{to_csv, to_json};
pub use types::{
    BenchConfig, DEFAULT_SEED, Dist, ElemType, ResultRow, RunResult, TimingStats,
};
