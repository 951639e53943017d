//! Engine error kinds.

use thiserror::Error;

/// Errors produced by a benchmark run or algorithm discovery.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or out-of-range configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A timed pass left the array out of order.
    #[error("sort assertion failed: {0}")]
    SortAssertion(String),

    /// A plugin library could not be loaded or exposed a broken table.
    #[error("plugin load failed: {0}")]
    PluginLoad(String),

    /// The run was canceled between passes.
    #[error("run canceled")]
    Canceled,

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
