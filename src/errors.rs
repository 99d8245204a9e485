use lendsim_common::errors::{ConfigError, FeeModelError, PoolError, PriceDataError};
use thiserror::Error;

/// Top-level error for a single engine run. Everything that isn't one of
/// the named domain errors (I/O failures reading the price cache or
/// strategy file, primarily) propagates here; per the error-handling
/// design, `run_simulations` catches this, records the run as failed, and
/// continues with the next seed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    FeeModel(#[from] FeeModelError),
    #[error(transparent)]
    PriceData(#[from] PriceDataError),
    #[error("failed to read or write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("price fetch failed: {0}")]
    Http(String),
    #[error("run name '{0}' must not contain '-'")]
    InvalidRunName(String),
}
