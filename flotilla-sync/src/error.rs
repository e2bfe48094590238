//! Error types for flotilla-sync.

use std::path::PathBuf;

use thiserror::Error;

use flotilla_core::ConfigError;
use flotilla_remote::RemoteError;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A remote failure outside the per-instance boundary (template fetch, search).
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("search returned cursor '{cursor}' twice; aborting pagination")]
    Pagination { cursor: String },

    #[error("fleet worker panicked: {0}")]
    WorkerPanic(String),
}

/// Transform hook failures; recorded against the instance being mutated.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("script did not return a specification")]
    NoSpecification,

    #[error("script did not return content for {path}")]
    NoContent { path: String },

    #[error("{path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("specification could not be converted: {0}")]
    Convert(#[from] serde_json::Error),

    #[error("hook `{hook}` failed: {message}")]
    Failed { hook: String, message: String },

    #[error("failed to run hook `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read hooks file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse hooks file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("hook for {target} has an empty command")]
    EmptyCommand { target: String },
}

/// Per-instance failure, caught at the fleet executor boundary.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("build did not complete within {waited_ms} ms")]
    TimedOut { waited_ms: u64 },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
