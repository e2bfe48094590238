//! Session manager: per-profile credentials with background token refresh.
//!
//! A [`Session`] is an explicit value handed to every [`crate::RemoteApi`]
//! call. The manager resolves each distinct profile once per run and owns the
//! refresh tasks; [`SessionManager::close_all`] (or dropping the session)
//! cancels them unconditionally.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};
use tokio::task::AbortHandle;

use crate::error::SessionError;

// ---------------------------------------------------------------------------
// Profiles and credentials
// ---------------------------------------------------------------------------

/// Which credential profile to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProfileName {
    /// Whatever profile the credential tool considers current.
    Default,
    Named(String),
}

impl ProfileName {
    pub fn from_option(name: Option<String>) -> Self {
        match name {
            Some(name) => ProfileName::Named(name),
            None => ProfileName::Default,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ProfileName::Default => None,
            ProfileName::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileName::Default => f.write_str("default"),
            ProfileName::Named(name) => f.write_str(name),
        }
    }
}

/// Profile document as printed by `fuse profile get -o json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDescriptor {
    pub base_url: String,
    pub account: String,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub profile: ProfileDescriptor,
}

/// Source of bearer tokens and profile descriptors.
#[async_trait]
pub trait CredentialResolver: Send + Sync + 'static {
    async fn resolve(&self, profile: &ProfileName) -> Result<Credentials, SessionError>;
}

/// Resolves credentials by shelling out to the platform CLI.
#[derive(Debug, Clone)]
pub struct FuseCliResolver {
    program: String,
}

impl FuseCliResolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, SessionError> {
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SessionError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(SessionError::CommandFailed {
                command: format!("{} {}", self.program, args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl CredentialResolver for FuseCliResolver {
    async fn resolve(&self, profile: &ProfileName) -> Result<Credentials, SessionError> {
        let mut token_args = vec!["token", "-o", "raw"];
        let mut profile_args = vec!["profile", "get"];
        if let Some(name) = profile.name() {
            token_args.extend(["-p", name]);
            profile_args.push(name);
        }
        profile_args.extend(["-o", "json"]);

        let token = self.run(&token_args).await?.trim().to_string();
        if token.is_empty() {
            return Err(SessionError::EmptyToken {
                profile: profile.to_string(),
            });
        }
        let raw = self.run(&profile_args).await?;
        let descriptor =
            serde_json::from_str(&raw).map_err(|source| SessionError::Profile {
                profile: profile.to_string(),
                source,
            })?;
        Ok(Credentials {
            token,
            profile: descriptor,
        })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Credential and base-URL context for one profile.
pub struct Session {
    profile: ProfileName,
    descriptor: ProfileDescriptor,
    token: Arc<RwLock<String>>,
    refreshed_at: Arc<RwLock<DateTime<Utc>>>,
    refresh: Option<AbortHandle>,
}

impl Session {
    /// A session with a fixed token and no background refresh.
    pub fn new(profile: ProfileName, credentials: Credentials) -> Self {
        Self {
            profile,
            descriptor: credentials.profile,
            token: Arc::new(RwLock::new(credentials.token)),
            refreshed_at: Arc::new(RwLock::new(Utc::now())),
            refresh: None,
        }
    }

    pub fn profile(&self) -> &ProfileName {
        &self.profile
    }

    pub fn base_url(&self) -> &str {
        self.descriptor.base_url.trim_end_matches('/')
    }

    pub fn account_id(&self) -> &str {
        &self.descriptor.account
    }

    /// Subscription encoded in the profile, if any.
    pub fn default_subscription(&self) -> Option<&str> {
        self.descriptor.subscription.as_deref()
    }

    /// Current bearer token; reflects background refreshes.
    pub async fn token(&self) -> String {
        self.token.read().await.clone()
    }

    /// When the current token was obtained.
    pub async fn refreshed_at(&self) -> DateTime<Utc> {
        *self.refreshed_at.read().await
    }

    /// Cancel the refresh task. Idempotent.
    pub fn close(&self) {
        if let Some(handle) = &self.refresh {
            handle.abort();
        }
    }

    fn spawn_refresh(&mut self, resolver: Arc<dyn CredentialResolver>, interval: Duration) {
        let profile = self.profile.clone();
        let token = self.token.clone();
        let refreshed_at = self.refreshed_at.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match resolver.resolve(&profile).await {
                    Ok(credentials) => {
                        *token.write().await = credentials.token;
                        let now = Utc::now();
                        let previous = std::mem::replace(&mut *refreshed_at.write().await, now);
                        tracing::debug!(
                            profile = %profile,
                            refreshed_at = %now.to_rfc3339(),
                            token_age_secs = (now - previous).num_seconds(),
                            "refreshed session token",
                        );
                    }
                    Err(err) => {
                        tracing::warn!(
                            profile = %profile,
                            error = %err,
                            "token refresh failed; keeping previous token",
                        );
                    }
                }
            }
        });
        self.refresh = Some(task.abort_handle());
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("profile", &self.profile)
            .field("base_url", &self.descriptor.base_url)
            .field("account", &self.descriptor.account)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Opens at most one [`Session`] per distinct profile for the duration of a run.
pub struct SessionManager {
    resolver: Arc<dyn CredentialResolver>,
    refresh_interval: Duration,
    sessions: Mutex<HashMap<ProfileName, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(resolver: Arc<dyn CredentialResolver>, refresh_interval: Duration) -> Self {
        Self {
            resolver,
            refresh_interval,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `profile` on first use; later calls return the same session.
    ///
    /// A resolution failure leaves nothing cached.
    pub async fn open(&self, profile: &ProfileName) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(profile) {
            return Ok(session.clone());
        }

        let credentials = self.resolver.resolve(profile).await?;
        tracing::info!(
            profile = %profile,
            base_url = %credentials.profile.base_url,
            account = %credentials.profile.account,
            "opened session",
        );
        let mut session = Session::new(profile.clone(), credentials);
        session.spawn_refresh(self.resolver.clone(), self.refresh_interval);

        let session = Arc::new(session);
        sessions.insert(profile.clone(), session.clone());
        Ok(session)
    }

    /// Cancel every refresh task and forget all sessions.
    pub async fn close_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for (profile, session) in sessions.drain() {
            session.close();
            tracing::debug!(profile = %profile, "closed session");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const INTERVAL: Duration = Duration::from_secs(60 * 60);

    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
        fail_profile: Option<String>,
    }

    #[async_trait]
    impl CredentialResolver for CountingResolver {
        async fn resolve(&self, profile: &ProfileName) -> Result<Credentials, SessionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if profile.name() == self.fail_profile.as_deref() && self.fail_profile.is_some() {
                return Err(SessionError::EmptyToken {
                    profile: profile.to_string(),
                });
            }
            Ok(Credentials {
                token: format!("token-{n}"),
                profile: ProfileDescriptor {
                    base_url: format!("https://{profile}.example/"),
                    account: format!("acc-{profile}"),
                    subscription: None,
                },
            })
        }
    }

    fn manager(resolver: Arc<CountingResolver>) -> SessionManager {
        SessionManager::new(resolver, INTERVAL)
    }

    #[tokio::test]
    async fn same_profile_resolves_once() {
        let resolver = Arc::new(CountingResolver::default());
        let sessions = manager(resolver.clone());
        let profile = ProfileName::Named("src".to_string());

        let first = sessions.open(&profile).await.expect("open");
        let second = sessions.open(&profile).await.expect("open again");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.base_url(), "https://src.example");
        sessions.close_all().await;
    }

    #[tokio::test]
    async fn distinct_profiles_get_independent_sessions() {
        let resolver = Arc::new(CountingResolver::default());
        let sessions = manager(resolver.clone());

        let source = sessions
            .open(&ProfileName::Named("source".to_string()))
            .await
            .expect("source");
        let dest = sessions
            .open(&ProfileName::Named("dest".to_string()))
            .await
            .expect("dest");

        assert_eq!(source.account_id(), "acc-source");
        assert_eq!(dest.account_id(), "acc-dest");
        assert_ne!(source.token().await, dest.token().await);
        sessions.close_all().await;
    }

    #[tokio::test]
    async fn failed_resolution_caches_nothing() {
        let resolver = Arc::new(CountingResolver {
            fail_profile: Some("broken".to_string()),
            ..CountingResolver::default()
        });
        let sessions = manager(resolver.clone());
        let broken = ProfileName::Named("broken".to_string());

        assert!(sessions.open(&broken).await.is_err());
        assert!(sessions.open(&broken).await.is_err());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_swaps_token_after_interval() {
        let resolver = Arc::new(CountingResolver::default());
        let sessions = manager(resolver.clone());
        let session = sessions.open(&ProfileName::Default).await.expect("open");
        assert_eq!(session.token().await, "token-1");
        let opened_at = session.refreshed_at().await;

        tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;

        assert_eq!(session.token().await, "token-2");
        assert!(session.refreshed_at().await >= opened_at);
        sessions.close_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn close_all_cancels_refresh() {
        let resolver = Arc::new(CountingResolver::default());
        let sessions = manager(resolver.clone());
        let session = sessions.open(&ProfileName::Default).await.expect("open");

        sessions.close_all().await;
        tokio::time::sleep(INTERVAL * 3).await;

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.token().await, "token-1");
    }
}
