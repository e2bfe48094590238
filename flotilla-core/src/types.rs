//! Domain types for the Flotilla fleet engine.
//!
//! Identifiers are validated newtypes; [`InstanceSpec`] keeps every field the
//! remote platform sends so a fetch → mutate → put cycle never drops metadata.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Relative file path (forward-slash separated) → file content.
pub type FileSet = BTreeMap<String, String>;

/// File name reserved for platform metadata; never part of a template.
pub const METADATA_FILE: &str = "fusebit.json";

const SUBSCRIPTION_PREFIX: &str = "sub-";
const SUBSCRIPTION_LEN: usize = "sub-0000000000000000".len();

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A validated subscription identifier, e.g. `sub-0123456789abcdef`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SubscriptionId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != SUBSCRIPTION_LEN || !s.starts_with(SUBSCRIPTION_PREFIX) {
            return Err(ConfigError::InvalidSubscription(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for SubscriptionId {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SubscriptionId> for String {
    fn from(id: SubscriptionId) -> Self {
        id.0
    }
}

/// `(boundaryId, functionId)`: one remote function instance in a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRef {
    pub boundary_id: String,
    pub function_id: String,
}

impl InstanceRef {
    pub fn new(boundary_id: impl Into<String>, function_id: impl Into<String>) -> Self {
        Self {
            boundary_id: boundary_id.into(),
            function_id: function_id.into(),
        }
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.boundary_id, self.function_id)
    }
}

impl FromStr for InstanceRef {
    type Err = ConfigError;

    /// Parses `boundary/function`. Both halves must be non-empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((boundary, function))
                if !boundary.is_empty() && !function.is_empty() && !function.contains('/') =>
            {
                Ok(Self::new(boundary, function))
            }
            _ => Err(ConfigError::InvalidInstance(s.to_string())),
        }
    }
}

/// Ordered `key=value` clauses, ANDed by the remote search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria(Vec<String>);

impl SearchCriteria {
    /// Validate each clause; an empty list is accepted here and rejected by
    /// the locator when no explicit instance is supplied.
    pub fn new<I, S>(clauses: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let clauses: Vec<String> = clauses.into_iter().map(Into::into).collect();
        for clause in &clauses {
            match clause.split_once('=') {
                Some((key, _)) if !key.trim().is_empty() => {}
                _ => return Err(ConfigError::InvalidCriteria(clause.clone())),
            }
        }
        Ok(Self(clauses))
    }

    /// `template.id=<function_id>`, the default when propagating a remote template.
    pub fn template_children(template: &InstanceRef) -> Self {
        Self(vec![format!("template.id={}", template.function_id)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clauses(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for SearchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" & "))
    }
}

// ---------------------------------------------------------------------------
// Remote documents
// ---------------------------------------------------------------------------

/// The `nodejs` section of a function specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSection {
    #[serde(default)]
    pub files: FileSet,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A full remote function specification.
///
/// Only `nodejs.files` is interpreted; everything else round-trips untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    #[serde(default)]
    pub nodejs: NodeSection,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl InstanceSpec {
    pub fn with_files(files: FileSet) -> Self {
        Self {
            nodejs: NodeSection {
                files,
                extra: Map::new(),
            },
            metadata: Map::new(),
        }
    }

    pub fn files(&self) -> &FileSet {
        &self.nodejs.files
    }

    pub fn files_mut(&mut self) -> &mut FileSet {
        &mut self.nodejs.files
    }

    /// Drop account-scoped identifiers so the spec can be written elsewhere.
    pub fn strip_account_identity(&mut self) {
        self.metadata.remove("subscriptionId");
        self.metadata.remove("accountId");
    }
}

/// Returned by a write that starts an asynchronous build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildHandle {
    pub subscription_id: String,
    pub boundary_id: String,
    pub function_id: String,
    pub build_id: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
