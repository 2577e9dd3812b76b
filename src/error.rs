use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the aggregation engine and the rendering glue.
///
/// `PeriodNotFound` is the only recoverable kind: months with no qualifying
/// transactions are expected in the data and callers skip them. Everything
/// else aborts the run; nothing is retried.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed data at line {line}: {detail}")]
    MalformedData { line: u64, detail: String },

    #[error("no aggregated data for period {year}-{month}")]
    PeriodNotFound { year: i32, month: u32 },

    #[error("cache file {path} is inconsistent: {detail}")]
    CacheMismatch { path: PathBuf, detail: String },
}

impl Error {
    pub(crate) fn malformed(line: u64, detail: impl Into<String>) -> Self {
        Error::MalformedData {
            line,
            detail: detail.into(),
        }
    }

    pub(crate) fn cache_mismatch(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Error::CacheMismatch {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
