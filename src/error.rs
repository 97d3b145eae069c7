//! Error types for the decompiler.
//!
//! Each subsystem owns one enum. Only a page without a usable webpack
//! runtime (`ManifestNotFound`, `NoChunks`) ends a run early; everything
//! else is logged and skipped at the unit (chunk, module, transform) that
//! raised it.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O failed at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("failed to parse HTML document: {0}")]
    Html(#[from] io::Error),

    #[error("chunk table literal is not valid JSON: {0}")]
    TableLiteral(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("module '{module}' appears twice in chunk '{chunk}'")]
    DuplicateModule { module: String, chunk: String },

    #[error("chunk '{0}' is not registered")]
    UnknownChunk(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("module does not parse: {0}")]
    Syntax(String),

    #[error("embedded JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("asset URL is invalid: {0}")]
    AssetUrl(#[from] url::ParseError),
}

#[derive(Error, Debug)]
pub enum DecompilerError {
    #[error("no webpack manifest script found at {0}")]
    ManifestNotFound(String),

    #[error("the webpack manifest at {0} lists no chunks")]
    NoChunks(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to write {path}: {source}")]
    Output { path: PathBuf, source: io::Error },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = DecompilerError> = std::result::Result<T, E>;
