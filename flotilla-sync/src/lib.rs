//! # flotilla-sync
//!
//! Fleet propagation engine: resolve a template, locate the instances it
//! applies to, and push changes across them with bounded concurrency.
//!
//! The entry points are [`run_update`], [`run_diff`] and [`run_migrate`].

pub mod diff;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod locator;
pub mod mutate;
pub mod pipeline;
pub mod poller;
pub mod template;

pub use diff::{render_patch, FilePatch};
pub use error::{ApplyError, HookError, SyncError};
pub use executor::{ExecutionReport, ExecutorConfig, Failure};
pub use hooks::{CommandHook, FnHook, HookTarget, Transform, TransformHooks};
pub use mutate::{DiffPlan, Mutation, PlanOptions};
pub use pipeline::{
    run_diff, run_migrate, run_update, DiffOutcome, DiffRequest, FleetRun, JobState,
    MigrateRequest, MigrationJob, UpdateOutcome, UpdateRequest,
};
pub use poller::{BuildPolicy, BuildState};
pub use template::{ResolvedTemplate, TemplateSource};
