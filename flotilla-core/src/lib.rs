//! Flotilla core library: domain types, operator settings, errors.
//!
//! - [`types`]: identifiers, file sets and remote documents
//! - [`settings`]: optional `~/.flotilla/config.yaml`
//! - [`error`]: [`ConfigError`], [`SettingsError`]

pub mod error;
pub mod settings;
pub mod types;

pub use error::{ConfigError, SettingsError};
pub use settings::Settings;
pub use types::{
    BuildHandle, FileSet, InstanceRef, InstanceSpec, NodeSection, SearchCriteria, SubscriptionId,
    METADATA_FILE,
};
