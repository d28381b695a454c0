use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a merge run. Per-file and per-value problems never surface
/// here; they are logged and reported instead.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("reading mapping specification {path:?}: {source}")]
    MappingRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing mapping specification {path:?}: {message}")]
    MappingParse { path: PathBuf, message: String },
    #[error("creating output directory {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("merge did not finish within {0:?}")]
    TimedOut(std::time::Duration),
    #[error("merge worker panicked")]
    Worker,
    #[error("merge failed: {0:#}")]
    Failed(#[from] anyhow::Error),
}

pub type MergeResult<T> = std::result::Result<T, MergeError>;
