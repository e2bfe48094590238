//! Error types for flotilla-core.

use std::path::PathBuf;

use thiserror::Error;

/// Operator input that cannot describe a valid run.
///
/// Always raised before any remote call is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("subscription '{0}' is not in the right format (expected sub-XXXXXXXXXXXXXXXX)")]
    InvalidSubscription(String),

    #[error("function '{0}' is not in the form <boundary>/<function>")]
    InvalidInstance(String),

    #[error("search criteria '{0}' is not in the form key=value")]
    InvalidCriteria(String),

    #[error("one of [template] or [--path] must be specified")]
    NoTemplateSource,

    #[error("[template] and [--path] are mutually exclusive")]
    AmbiguousTemplateSource,

    #[error(
        "criteria or function must be specified when using {mode}, for example: \"-c template.id=sample-slack-addon\""
    )]
    MissingTargets { mode: &'static str },

    #[error("search criteria must not be empty")]
    EmptyCriteria,

    #[error("{flag} needs a template; it cannot be used with only hooks")]
    HooksOnlyFlag { flag: &'static str },
}

/// Failures loading `~/.flotilla/config.yaml`.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Includes file path and line context from serde_yaml.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid settings at {path}: {field} must be greater than zero")]
    Zero { path: PathBuf, field: &'static str },

    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
