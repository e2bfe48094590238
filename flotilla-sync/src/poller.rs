//! Build-Completion Poller.
//!
//! Writes a specification and, when the platform answers that a build was
//! started, polls the build until it leaves the pending state or the attempt
//! budget runs out.

use std::time::Duration;

use flotilla_core::{BuildHandle, InstanceRef, InstanceSpec, Settings, SubscriptionId};
use flotilla_remote::{BuildStatus, PutOutcome, RemoteApi, Session};

use crate::error::ApplyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildPolicy {
    /// Number of status polls before giving up.
    pub attempts: u32,
    /// Sleep after each pending answer.
    pub delay: Duration,
}

impl Default for BuildPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(5000),
        }
    }
}

impl BuildPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            attempts: settings.build_poll_attempts,
            delay: settings.build_poll_delay(),
        }
    }

    /// Longest time a build is waited for.
    pub fn ceiling_ms(&self) -> u64 {
        u64::from(self.attempts).saturating_mul(self.delay.as_millis() as u64)
    }
}

/// Lifecycle of one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Submitted,
    Building { attempt: u32 },
    Done { polls: u32 },
    TimedOut,
    Rejected,
}

fn transition(instance: &InstanceRef, from: &BuildState, to: BuildState) -> BuildState {
    tracing::debug!(instance = %instance, from = ?from, to = ?to, "build state");
    to
}

/// Write `spec` to `instance` and wait for any resulting build.
///
/// Returns the terminal `Done` state. A rejected write or a build still
/// pending after the last attempt is an error.
pub async fn submit(
    remote: &dyn RemoteApi,
    session: &Session,
    subscription: &SubscriptionId,
    instance: &InstanceRef,
    spec: &InstanceSpec,
    policy: BuildPolicy,
) -> Result<BuildState, ApplyError> {
    let state = transition(instance, &BuildState::Idle, BuildState::Submitted);
    let outcome = match remote
        .put_function(session, subscription, instance, spec)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            transition(instance, &state, BuildState::Rejected);
            return Err(err.into());
        }
    };

    match outcome {
        PutOutcome::Applied => Ok(transition(instance, &state, BuildState::Done { polls: 0 })),
        PutOutcome::Building(handle) => {
            wait_for_build(remote, session, instance, &handle, policy).await
        }
    }
}

pub async fn wait_for_build(
    remote: &dyn RemoteApi,
    session: &Session,
    instance: &InstanceRef,
    handle: &BuildHandle,
    policy: BuildPolicy,
) -> Result<BuildState, ApplyError> {
    let mut state = BuildState::Submitted;
    for attempt in 1..=policy.attempts {
        state = transition(instance, &state, BuildState::Building { attempt });
        match remote.build_status(session, handle).await {
            Ok(BuildStatus::Pending) => tokio::time::sleep(policy.delay).await,
            Ok(BuildStatus::Resolved(status)) => {
                tracing::debug!(
                    instance = %instance,
                    build = %handle.build_id,
                    status,
                    "build finished",
                );
                return Ok(transition(
                    instance,
                    &state,
                    BuildState::Done { polls: attempt },
                ));
            }
            Err(err) => {
                transition(instance, &state, BuildState::Rejected);
                return Err(err.into());
            }
        }
    }
    transition(instance, &state, BuildState::TimedOut);
    Err(ApplyError::TimedOut {
        waited_ms: policy.ceiling_ms(),
    })
}
