use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request for {key} failed: {source}")]
    Transport {
        key: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("rendering service failed for {key}: {message}")]
    Rendered { key: String, message: String },

    #[error("record sink {path:?}: {source}")]
    Sink {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("checkpoint {path:?}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("merge output {path:?}: {source}")]
    Merge {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("writing {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid record key {0:?}")]
    InvalidKey(String),

    #[error("configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn sink(path: impl Into<PathBuf>, source: impl Into<csv::Error>) -> Self {
        Error::Sink {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn merge(path: impl Into<PathBuf>, source: impl Into<csv::Error>) -> Self {
        Error::Merge {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn checkpoint(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Checkpoint {
            path: path.into(),
            source,
        }
    }
}
