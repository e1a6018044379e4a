// src/error.rs

//! Crate-wide error type.
//!
//! Low-level failures are wrapped once with domain context (what operation,
//! which artifact) and propagated to the caller. Nothing is swallowed except
//! best-effort cleanup of scratch files.

use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the derivation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file could not be downloaded. Wraps the offending URI and a
    /// human-readable cause.
    #[error("failed to download {uri}: {message}")]
    Download {
        uri: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Several downloads in a scope failed.
    #[error("{} download(s) failed: {}", errors.len(), first_message(errors))]
    DownloadScope { errors: Vec<Error> },

    /// A downloaded or cached file did not match its expected checksum.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The client and server archives disagree in a way the splitter cannot
    /// classify. Retrying cannot fix this; the inputs themselves are wrong.
    #[error("inconsistent archives: {0}")]
    InconsistentArchives(String),

    /// A mapping, manifest or rule file could not be parsed.
    #[error("cannot parse {path}: {message}")]
    MalformedFile { path: PathBuf, message: String },

    /// A mapping visitor was driven outside its call-order contract, or
    /// layered sources disagree structurally.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// A class file could not be parsed or rewritten.
    #[error("malformed class file {name}: {message}")]
    MalformedClass { name: String, message: String },

    /// The requested game version does not exist in the manifest.
    #[error("cannot find game version {0}")]
    UnknownVersion(String),

    /// Filesystem failure while creating scratch files, directories or cache
    /// entries.
    #[error("{context}: {source}")]
    Cache {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an I/O error with the operation that failed.
    pub fn cache(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Cache {
            context: context.into(),
            source,
        }
    }

    /// Build a download error for `uri` with no underlying cause.
    pub fn download(uri: &url::Url, message: impl Into<String>) -> Self {
        Error::Download {
            uri: uri.to_string(),
            message: message.into(),
            source: None,
        }
    }

    /// Build a download error for `uri` wrapping an underlying cause.
    pub fn download_caused(
        uri: &url::Url,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Download {
            uri: uri.to_string(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build a malformed-file error, naming the offending path.
    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::MalformedFile {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn first_message(errors: &[Error]) -> String {
    match errors.first() {
        Some(e) => e.to_string(),
        None => "no errors recorded".to_string(),
    }
}
