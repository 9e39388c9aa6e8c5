//! Error type shared by every pipeline stage.

use std::path::{Path, PathBuf};

/// Errors raised while loading, transforming or exporting topology and traffic data
#[derive(Debug, thiserror::Error)]
pub enum LnError {
    /// Reading or writing a file failed
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A CSV file could not be parsed or written
    #[error("csv error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    /// A JSON document (graph dump or hyperjson) could not be parsed or written
    #[error("json error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A YAML parameter or scenario file could not be parsed
    #[error("yaml error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// A zipped snapshot could not be opened
    #[error("zip archive {path}: {source}")]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    /// The archive holds no `.json` or `.csv` entry
    #[error("no json or csv entry in archive {0}")]
    EmptyArchive(PathBuf),

    /// A required column is missing from a tabular input
    #[error("column `{column}` not found in {path}")]
    MissingColumn { path: PathBuf, column: String },

    /// Parameters failed validation
    #[error("invalid parameter: {0}")]
    InvalidParams(String),

    /// Nothing left to work with after loading or filtering
    #[error("topology is empty: {0}")]
    EmptyTopology(String),

    /// Merchant targets were requested but none of them occur in the topology
    #[error("no merchant from the allowlist occurs in the topology")]
    NoActiveMerchants,

    /// Clique expansion refused because a hyperedge is too large
    #[error("hyperedge of size {size} exceeds clique limit {limit}")]
    CliqueTooLarge { size: usize, limit: usize },

    /// A hyperjson document is structurally wrong
    #[error("malformed hyperjson: {0}")]
    Hyperjson(String),

    /// A hex seed could not be decoded
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// The external traffic simulator exited unsuccessfully
    #[error("external simulator `{program}` failed: {status}")]
    External { program: String, status: String },
}

impl LnError {
    /// Adapter for `map_err` that attaches the path to an I/O error
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> LnError + '_ {
        move |source| LnError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path) -> impl FnOnce(csv::Error) -> LnError + '_ {
        move |source| LnError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path) -> impl FnOnce(serde_json::Error) -> LnError + '_ {
        move |source| LnError::Json {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn yaml(path: &Path) -> impl FnOnce(serde_yaml::Error) -> LnError + '_ {
        move |source| LnError::Yaml {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LnError>;
