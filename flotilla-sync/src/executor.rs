//! Fleet executor: bounded-concurrency processing of located instances.
//!
//! A shared FIFO queue is drained by `min(concurrency, len)` tokio tasks.
//! One instance failing never stops the others; every failure is captured in
//! the report together with its reason.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;

use flotilla_core::InstanceRef;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub concurrency: usize,
    /// Dry runs are processed by a single worker so output stays ordered.
    pub dry_run: bool,
}

impl ExecutorConfig {
    pub fn effective_workers(&self, items: usize) -> usize {
        if self.dry_run {
            return 1;
        }
        self.concurrency.min(items).max(1)
    }
}

/// An instance that could not be processed, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub instance: InstanceRef,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport<O> {
    pub total: usize,
    /// Successful outcomes in queue order.
    pub outcomes: Vec<(InstanceRef, O)>,
    /// Failures in queue order.
    pub failures: Vec<Failure>,
}

impl<O> ExecutionReport<O> {
    pub fn applied(&self) -> usize {
        self.outcomes.len()
    }
}

type Results<O> = Arc<Mutex<Vec<(usize, InstanceRef, Result<O, String>)>>>;

/// Process every instance with `work`, at most `config.concurrency` at once.
pub async fn run<O, E, F, Fut>(
    instances: Vec<InstanceRef>,
    config: ExecutorConfig,
    work: F,
) -> Result<ExecutionReport<O>, SyncError>
where
    O: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(InstanceRef) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
{
    let total = instances.len();
    let workers = config.effective_workers(total);
    tracing::info!(total, workers, dry_run = config.dry_run, "processing functions");

    let queue = Arc::new(Mutex::new(
        instances.into_iter().enumerate().collect::<VecDeque<_>>(),
    ));
    let results: Results<O> = Arc::new(Mutex::new(Vec::with_capacity(total)));
    let work = Arc::new(work);

    let mut set = JoinSet::new();
    for worker in 0..workers {
        let queue = Arc::clone(&queue);
        let results = Arc::clone(&results);
        let work = Arc::clone(&work);
        set.spawn(async move {
            loop {
                let Some((index, instance)) = queue.lock().await.pop_front() else {
                    break;
                };
                tracing::debug!(worker, instance = %instance, "processing function");
                let result = work(instance.clone()).await.map_err(|e| e.to_string());
                if let Err(reason) = &result {
                    tracing::warn!(instance = %instance, reason = %reason, "function failed");
                }
                results.lock().await.push((index, instance, result));
            }
        });
    }

    let mut panic = None;
    while let Some(joined) = set.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "fleet worker did not finish");
            panic.get_or_insert_with(|| panic_message(err));
        }
    }
    if let Some(message) = panic {
        return Err(SyncError::WorkerPanic(message));
    }

    let mut results = std::mem::take(&mut *results.lock().await);
    results.sort_by_key(|(index, _, _)| *index);

    let mut report = ExecutionReport {
        total,
        outcomes: Vec::new(),
        failures: Vec::new(),
    };
    for (_, instance, result) in results {
        match result {
            Ok(outcome) => report.outcomes.push((instance, outcome)),
            Err(reason) => report.failures.push(Failure { instance, reason }),
        }
    }
    Ok(report)
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
