//! The three operator pipelines: update, diff and migrate.
//!
//! Each one validates its request, resolves what it needs up front, locates
//! the target instances and hands per-instance work to the fleet executor.

use std::sync::Arc;

use flotilla_core::{
    ConfigError, FileSet, InstanceRef, InstanceSpec, SearchCriteria, SubscriptionId,
};
use flotilla_remote::{RemoteApi, Session};

use crate::diff::{render_patch, FilePatch};
use crate::error::{ApplyError, HookError, SyncError};
use crate::executor::{self, ExecutionReport, ExecutorConfig};
use crate::hooks::TransformHooks;
use crate::locator::locate;
use crate::mutate::{self, Mutation, PlanOptions};
use crate::poller::{submit, BuildPolicy};
use crate::template::{resolve, ResolvedTemplate, TemplateSource};

/// Result of a pipeline that got as far as locating targets.
#[derive(Debug, Clone, PartialEq)]
pub enum FleetRun<O> {
    /// The search matched nothing; no work was attempted.
    NoTargets,
    Completed(ExecutionReport<O>),
}

fn required_targets(
    source: &TemplateSource,
    instance: Option<&InstanceRef>,
    criteria: &SearchCriteria,
) -> Result<(), ConfigError> {
    if instance.is_some() || !criteria.is_empty() {
        return Ok(());
    }
    match source {
        TemplateSource::Local { .. } => Err(ConfigError::MissingTargets { mode: "--path" }),
        TemplateSource::HooksOnly => Err(ConfigError::MissingTargets { mode: "only hooks" }),
        TemplateSource::Remote { .. } => Ok(()),
    }
}

fn effective_criteria(source: &TemplateSource, criteria: &SearchCriteria) -> SearchCriteria {
    match source {
        TemplateSource::Remote { instance, .. } if criteria.is_empty() => {
            SearchCriteria::template_children(instance)
        }
        _ => criteria.clone(),
    }
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub subscription: SubscriptionId,
    pub source: TemplateSource,
    pub criteria: SearchCriteria,
    pub instance: Option<InstanceRef>,
    pub options: PlanOptions,
    pub dry_run: bool,
    pub hooks: TransformHooks,
    pub workers: usize,
    pub policy: BuildPolicy,
    /// Include prefix for remote templates when none was given.
    pub default_include: String,
}

impl UpdateRequest {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.source, TemplateSource::HooksOnly) {
            // An empty template would mark every instance file for removal.
            if self.options.delete {
                return Err(ConfigError::HooksOnlyFlag { flag: "--delete" });
            }
            if self.options.force {
                return Err(ConfigError::HooksOnlyFlag { flag: "--force" });
            }
        }
        required_targets(&self.source, self.instance.as_ref(), &self.criteria)
    }

    /// Operator criteria, or `template.id=<id>` for a remote template.
    pub fn effective_criteria(&self) -> SearchCriteria {
        effective_criteria(&self.source, &self.criteria)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate,
    /// Dry run: the paths that would change.
    WouldUpdate(Vec<String>),
    Updated(Vec<String>),
}

struct UpdateContext {
    remote: Arc<dyn RemoteApi>,
    session: Arc<Session>,
    subscription: SubscriptionId,
    template: Arc<FileSet>,
    options: PlanOptions,
    hooks: TransformHooks,
    dry_run: bool,
    policy: BuildPolicy,
}

impl UpdateContext {
    async fn update_one(&self, instance: InstanceRef) -> Result<UpdateOutcome, ApplyError> {
        let current = self
            .remote
            .get_function(&self.session, &self.subscription, &instance)
            .await?;
        let mutation = self.mutate(current).await?;

        if mutation.is_up_to_date() {
            tracing::debug!(instance = %instance, "function is up-to-date");
            return Ok(UpdateOutcome::UpToDate);
        }
        let changed: Vec<String> = mutation.changed.into_iter().collect();
        if self.dry_run {
            tracing::debug!(instance = %instance, files = ?changed, "would update function");
            return Ok(UpdateOutcome::WouldUpdate(changed));
        }

        submit(
            self.remote.as_ref(),
            &self.session,
            &self.subscription,
            &instance,
            &mutation.spec,
            self.policy,
        )
        .await?;
        tracing::debug!(instance = %instance, files = ?changed, "updated function");
        Ok(UpdateOutcome::Updated(changed))
    }

    /// Hooks may run external programs, so they are kept off the async workers.
    async fn mutate(&self, current: InstanceSpec) -> Result<Mutation, ApplyError> {
        let plan = mutate::plan(&self.template, &current, self.options);
        if self.hooks.is_empty() {
            return Ok(mutate::apply(&plan, &self.template, &current, &self.hooks)?);
        }
        let template = Arc::clone(&self.template);
        let hooks = self.hooks.clone();
        let mutation = tokio::task::spawn_blocking(move || {
            mutate::apply(&plan, &template, &current, &hooks)
        })
        .await
        .map_err(|err| HookError::Failed {
            hook: "transform hooks".to_string(),
            message: err.to_string(),
        })??;
        Ok(mutation)
    }
}

pub async fn run_update(
    remote: Arc<dyn RemoteApi>,
    session: Arc<Session>,
    req: UpdateRequest,
) -> Result<FleetRun<UpdateOutcome>, SyncError> {
    req.validate()?;
    let criteria = req.effective_criteria();
    let ResolvedTemplate { files, .. } = resolve(
        remote.as_ref(),
        &session,
        &req.subscription,
        &req.source,
        &req.default_include,
    )
    .await?;
    let targets = locate(
        remote.as_ref(),
        &session,
        &req.subscription,
        req.instance.as_ref(),
        &criteria,
    )
    .await?;
    if targets.is_empty() {
        tracing::info!(criteria = %criteria, "no matching functions found");
        return Ok(FleetRun::NoTargets);
    }

    let config = ExecutorConfig {
        concurrency: req.workers,
        dry_run: req.dry_run,
    };
    let ctx = Arc::new(UpdateContext {
        remote,
        session,
        subscription: req.subscription,
        template: Arc::new(files),
        options: req.options,
        hooks: req.hooks,
        dry_run: req.dry_run,
        policy: req.policy,
    });
    let report = executor::run(targets, config, move |instance| {
        let ctx = Arc::clone(&ctx);
        async move { ctx.update_one(instance).await }
    })
    .await?;
    Ok(FleetRun::Completed(report))
}

// ---------------------------------------------------------------------------
// diff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DiffRequest {
    pub subscription: SubscriptionId,
    pub source: TemplateSource,
    pub criteria: SearchCriteria,
    pub instance: Option<InstanceRef>,
    pub default_include: String,
}

impl DiffRequest {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.source, TemplateSource::HooksOnly) {
            return Err(ConfigError::NoTemplateSource);
        }
        required_targets(&self.source, self.instance.as_ref(), &self.criteria)
    }

    pub fn effective_criteria(&self) -> SearchCriteria {
        effective_criteria(&self.source, &self.criteria)
    }
}

/// Rendered patches for one instance, in template path order.
pub type DiffOutcome = Vec<FilePatch>;

pub async fn run_diff(
    remote: Arc<dyn RemoteApi>,
    session: Arc<Session>,
    req: DiffRequest,
) -> Result<FleetRun<DiffOutcome>, SyncError> {
    req.validate()?;
    let criteria = req.effective_criteria();
    let template = resolve(
        remote.as_ref(),
        &session,
        &req.subscription,
        &req.source,
        &req.default_include,
    )
    .await?;
    let targets = locate(
        remote.as_ref(),
        &session,
        &req.subscription,
        req.instance.as_ref(),
        &criteria,
    )
    .await?;
    if targets.is_empty() {
        tracing::info!(criteria = %criteria, "no matching functions found");
        return Ok(FleetRun::NoTargets);
    }

    let template_prefix = match req.source {
        TemplateSource::Local { .. } => template.label.clone(),
        _ => format!("{}/{}", req.subscription, template.label),
    };
    let template = Arc::new(template.files);
    let subscription = req.subscription;
    let config = ExecutorConfig {
        concurrency: 1,
        dry_run: true,
    };
    let report = executor::run(targets, config, move |instance| {
        let remote = Arc::clone(&remote);
        let session = Arc::clone(&session);
        let template = Arc::clone(&template);
        let template_prefix = template_prefix.clone();
        let subscription = subscription.clone();
        async move {
            let spec = remote
                .get_function(&session, &subscription, &instance)
                .await?;
            let instance_prefix = format!("{subscription}/{instance}");
            Ok::<_, ApplyError>(diff_files(
                &template,
                spec.files(),
                &template_prefix,
                &instance_prefix,
            ))
        }
    })
    .await?;
    Ok(FleetRun::Completed(report))
}

fn diff_files(
    template: &FileSet,
    instance: &FileSet,
    template_prefix: &str,
    instance_prefix: &str,
) -> Vec<FilePatch> {
    template
        .iter()
        .filter_map(|(path, content)| {
            let current = instance.get(path).map(String::as_str).unwrap_or("");
            let patch = render_patch(
                &format!("{template_prefix}/{path}"),
                &format!("{instance_prefix}/{path}"),
                content,
                current,
            )?;
            Some(FilePatch {
                path: path.clone(),
                patch,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// migrate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MigrateRequest {
    pub source_subscription: SubscriptionId,
    pub dest_subscription: SubscriptionId,
    pub criteria: SearchCriteria,
    pub workers: usize,
    pub dry_run: bool,
    pub policy: BuildPolicy,
}

impl MigrateRequest {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.criteria.is_empty() {
            return Err(ConfigError::EmptyCriteria);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Applied,
    SkippedDryRun,
}

/// One copied function. The snapshot is kept only for dry runs.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationJob {
    pub snapshot: Option<InstanceSpec>,
    pub state: JobState,
}

pub async fn run_migrate(
    remote: Arc<dyn RemoteApi>,
    source: Arc<Session>,
    dest: Arc<Session>,
    req: MigrateRequest,
) -> Result<FleetRun<MigrationJob>, SyncError> {
    req.validate()?;
    let targets = locate(
        remote.as_ref(),
        &source,
        &req.source_subscription,
        None,
        &req.criteria,
    )
    .await?;
    if targets.is_empty() {
        tracing::info!(criteria = %req.criteria, "no matching functions found");
        return Ok(FleetRun::NoTargets);
    }

    let config = ExecutorConfig {
        concurrency: req.workers,
        dry_run: req.dry_run,
    };
    let req = Arc::new(req);
    let report = executor::run(targets, config, move |instance| {
        let remote = Arc::clone(&remote);
        let source = Arc::clone(&source);
        let dest = Arc::clone(&dest);
        let req = Arc::clone(&req);
        async move {
            let mut spec = remote
                .get_function(&source, &req.source_subscription, &instance)
                .await?;
            spec.strip_account_identity();
            if req.dry_run {
                tracing::debug!(instance = %instance, "would migrate function");
                return Ok(MigrationJob {
                    snapshot: Some(spec),
                    state: JobState::SkippedDryRun,
                });
            }
            submit(
                remote.as_ref(),
                &dest,
                &req.dest_subscription,
                &instance,
                &spec,
                req.policy,
            )
            .await?;
            tracing::debug!(
                instance = %instance,
                to = %req.dest_subscription,
                "migrated function",
            );
            Ok::<_, ApplyError>(MigrationJob {
                snapshot: None,
                state: JobState::Applied,
            })
        }
    })
    .await?;
    Ok(FleetRun::Completed(report))
}
