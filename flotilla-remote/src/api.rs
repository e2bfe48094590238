//! Remote access port, the only seam between the engine and the platform.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use flotilla_core::{BuildHandle, InstanceRef, InstanceSpec, SearchCriteria, SubscriptionId};

use crate::error::RemoteError;
use crate::session::Session;

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub items: Vec<InstanceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Result of writing a function specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// `200`: persisted, no build triggered.
    Applied,
    /// `201`: accepted; a build is running.
    Building(BuildHandle),
}

/// Result of one build-status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// `201`: still building.
    Pending,
    /// Any other status; the build has left its pending state.
    Resolved(u16),
}

/// Typed calls against the function-hosting platform.
///
/// Every call takes the [`Session`] explicitly; adapters hold no credentials.
#[async_trait]
pub trait RemoteApi: Send + Sync + 'static {
    async fn search(
        &self,
        session: &Session,
        subscription: &SubscriptionId,
        criteria: &SearchCriteria,
        next: Option<&str>,
    ) -> Result<SearchPage, RemoteError>;

    async fn get_function(
        &self,
        session: &Session,
        subscription: &SubscriptionId,
        instance: &InstanceRef,
    ) -> Result<InstanceSpec, RemoteError>;

    async fn put_function(
        &self,
        session: &Session,
        subscription: &SubscriptionId,
        instance: &InstanceRef,
        spec: &InstanceSpec,
    ) -> Result<PutOutcome, RemoteError>;

    async fn build_status(
        &self,
        session: &Session,
        build: &BuildHandle,
    ) -> Result<BuildStatus, RemoteError>;
}
