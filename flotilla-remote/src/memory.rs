//! In-process [`RemoteApi`] backed by a map of function specifications.
//!
//! Search matches `key=value` clauses against each function's flat `tags`
//! object. Page size, build duration and write rejections are scriptable so
//! pagination, polling and partial failure can be exercised without a network.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use flotilla_core::{BuildHandle, InstanceRef, InstanceSpec, SearchCriteria, SubscriptionId};

use crate::api::{BuildStatus, PutOutcome, RemoteApi, SearchPage};
use crate::error::RemoteError;
use crate::session::Session;

type FunctionKey = (String, InstanceRef);

#[derive(Debug, Default)]
struct MemoryState {
    functions: BTreeMap<FunctionKey, InstanceSpec>,
    page_size: Option<usize>,
    build_pending_polls: Option<u32>,
    builds: HashMap<String, u32>,
    build_counter: u64,
    put_failures: HashMap<InstanceRef, (u16, String)>,
    puts: Vec<FunctionKey>,
    search_calls: usize,
    status_polls: usize,
}

#[derive(Debug, Default)]
pub struct InMemoryRemote {
    state: Mutex<MemoryState>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(
        &self,
        subscription: &SubscriptionId,
        instance: InstanceRef,
        spec: InstanceSpec,
    ) {
        self.lock()
            .functions
            .insert((subscription.to_string(), instance), spec);
    }

    pub fn function(
        &self,
        subscription: &SubscriptionId,
        instance: &InstanceRef,
    ) -> Option<InstanceSpec> {
        self.lock()
            .functions
            .get(&(subscription.to_string(), instance.clone()))
            .cloned()
    }

    /// Split search results into pages of `size` items.
    pub fn set_page_size(&self, size: usize) {
        self.lock().page_size = Some(size.max(1));
    }

    /// `Some(n)`: every write answers `201` and the build reports pending for
    /// `n` polls. `None`: writes answer `200`.
    pub fn set_build_pending_polls(&self, polls: Option<u32>) {
        self.lock().build_pending_polls = polls;
    }

    /// Reject every write to `instance` with `status` and `message`.
    pub fn fail_put(&self, instance: InstanceRef, status: u16, message: impl Into<String>) {
        self.lock()
            .put_failures
            .insert(instance, (status, message.into()));
    }

    /// Successful writes, in the order they happened.
    pub fn puts(&self) -> Vec<(String, InstanceRef)> {
        self.lock().puts.clone()
    }

    pub fn search_calls(&self) -> usize {
        self.lock().search_calls
    }

    pub fn status_polls(&self) -> usize {
        self.lock().status_polls
    }
}

fn matches_criteria(spec: &InstanceSpec, criteria: &SearchCriteria) -> bool {
    let tags = spec.metadata.get("tags");
    criteria.clauses().iter().all(|clause| {
        let Some((key, value)) = clause.split_once('=') else {
            return false;
        };
        tags.and_then(|tags| tags.get(key))
            .and_then(Value::as_str)
            .is_some_and(|tag| tag == value)
    })
}

fn not_found(instance: &InstanceRef) -> RemoteError {
    RemoteError::Rejected {
        status: 404,
        message: format!("function {instance} not found"),
    }
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn search(
        &self,
        _session: &Session,
        subscription: &SubscriptionId,
        criteria: &SearchCriteria,
        next: Option<&str>,
    ) -> Result<SearchPage, RemoteError> {
        let mut state = self.lock();
        state.search_calls += 1;

        let matched: Vec<InstanceRef> = state
            .functions
            .iter()
            .filter(|((sub, _), spec)| {
                sub == subscription.as_str() && matches_criteria(spec, criteria)
            })
            .map(|((_, instance), _)| instance.clone())
            .collect();

        let offset = match next {
            Some(cursor) => cursor.parse::<usize>().map_err(|_| RemoteError::Rejected {
                status: 400,
                message: format!("invalid cursor '{cursor}'"),
            })?,
            None => 0,
        };
        let size = state.page_size.unwrap_or(matched.len().max(1));
        let end = (offset + size).min(matched.len());
        let items = matched.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next = (end < matched.len()).then(|| end.to_string());
        Ok(SearchPage { items, next })
    }

    async fn get_function(
        &self,
        _session: &Session,
        subscription: &SubscriptionId,
        instance: &InstanceRef,
    ) -> Result<InstanceSpec, RemoteError> {
        self.function(subscription, instance)
            .ok_or_else(|| not_found(instance))
    }

    async fn put_function(
        &self,
        _session: &Session,
        subscription: &SubscriptionId,
        instance: &InstanceRef,
        spec: &InstanceSpec,
    ) -> Result<PutOutcome, RemoteError> {
        let mut state = self.lock();
        if let Some((status, message)) = state.put_failures.get(instance) {
            return Err(RemoteError::Rejected {
                status: *status,
                message: message.clone(),
            });
        }

        let key = (subscription.to_string(), instance.clone());
        state.functions.insert(key.clone(), spec.clone());
        state.puts.push(key);

        let Some(pending) = state.build_pending_polls else {
            return Ok(PutOutcome::Applied);
        };
        state.build_counter += 1;
        let build_id = format!("build-{}", state.build_counter);
        state.builds.insert(build_id.clone(), pending);
        Ok(PutOutcome::Building(BuildHandle {
            subscription_id: subscription.to_string(),
            boundary_id: instance.boundary_id.clone(),
            function_id: instance.function_id.clone(),
            build_id,
        }))
    }

    async fn build_status(
        &self,
        _session: &Session,
        build: &BuildHandle,
    ) -> Result<BuildStatus, RemoteError> {
        let mut state = self.lock();
        state.status_polls += 1;
        let remaining = state.builds.get_mut(&build.build_id).ok_or_else(|| {
            RemoteError::Rejected {
                status: 404,
                message: format!("build {} not found", build.build_id),
            }
        })?;
        if *remaining == 0 {
            return Ok(BuildStatus::Resolved(200));
        }
        *remaining -= 1;
        Ok(BuildStatus::Pending)
    }
}
