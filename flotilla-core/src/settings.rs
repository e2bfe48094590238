//! Operator settings.
//!
//! # Storage layout
//!
//! ```text
//! ~/.flotilla/
//!   config.yaml   (optional; every field has a default)
//! ```
//!
//! As with the rest of the workspace, every loader has two forms:
//! `load_at(home)` for tests with a `TempDir`, and `load()` which derives home
//! from `dirs::home_dir()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_POLL_ATTEMPTS: u32 = 10;
pub const DEFAULT_POLL_DELAY_MS: u64 = 5_000;
pub const DEFAULT_TOKEN_REFRESH_SECS: u64 = 60 * 60;
pub const DEFAULT_CREDENTIAL_BINARY: &str = "fuse";
pub const DEFAULT_INCLUDE: &str = "template/";

/// Tunables for a run. Command-line flags take precedence over these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Concurrent workers for `update` and `migrate`.
    pub workers: usize,
    pub build_poll_attempts: u32,
    pub build_poll_delay_ms: u64,
    pub token_refresh_secs: u64,
    /// Program used to resolve tokens and profiles.
    pub credential_binary: String,
    /// Include prefix applied to a remote template when none is given.
    pub default_include: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            build_poll_attempts: DEFAULT_POLL_ATTEMPTS,
            build_poll_delay_ms: DEFAULT_POLL_DELAY_MS,
            token_refresh_secs: DEFAULT_TOKEN_REFRESH_SECS,
            credential_binary: DEFAULT_CREDENTIAL_BINARY.to_string(),
            default_include: DEFAULT_INCLUDE.to_string(),
        }
    }
}

impl Settings {
    pub fn build_poll_delay(&self) -> Duration {
        Duration::from_millis(self.build_poll_delay_ms)
    }

    pub fn token_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.token_refresh_secs)
    }

    /// The first count or interval that must not be zero but is.
    fn zero_field(&self) -> Option<&'static str> {
        [
            ("workers", self.workers as u64),
            ("build_poll_attempts", u64::from(self.build_poll_attempts)),
            ("token_refresh_secs", self.token_refresh_secs),
        ]
        .into_iter()
        .find_map(|(field, value)| (value == 0).then_some(field))
    }
}

/// `<home>/.flotilla/config.yaml`. Pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    home.join(".flotilla").join("config.yaml")
}

/// Load settings, falling back to defaults when the file is absent.
pub fn load_at(home: &Path) -> Result<Settings, SettingsError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|source| SettingsError::Io {
        path: path.clone(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    let settings: Settings = serde_yaml::from_str(&contents).map_err(|source| {
        SettingsError::Parse {
            path: path.clone(),
            source,
        }
    })?;
    match settings.zero_field() {
        Some(field) => Err(SettingsError::Zero { path, field }),
        None => Ok(settings),
    }
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, SettingsError> {
    load_at(&home()?)
}

fn home() -> Result<PathBuf, SettingsError> {
    dirs::home_dir().ok_or(SettingsError::HomeNotFound)
}
