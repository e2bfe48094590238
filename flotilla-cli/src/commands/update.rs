//! `flotilla update`: push template files into matching functions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use flotilla_remote::ProfileName;
use flotilla_sync::{
    run_update, BuildPolicy, FleetRun, PlanOptions, TransformHooks, UpdateOutcome, UpdateRequest,
};

use super::{print_no_targets, print_report, Runtime, TargetArgs};

/// Arguments for `flotilla update`.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Remove files that are not in the template.
    #[arg(short, long)]
    pub delete: bool,

    /// Write every template file even when unchanged.
    #[arg(short, long)]
    pub force: bool,

    /// Report what would change without writing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// YAML file naming transform hooks to run on each function.
    #[arg(short = 't', long = "hooks", value_name = "HOOKS_FILE")]
    pub hooks: Option<PathBuf>,

    /// Functions processed concurrently.
    #[arg(short, long)]
    pub workers: Option<usize>,
}

impl UpdateArgs {
    pub async fn run(self) -> Result<()> {
        let hooks = match &self.hooks {
            Some(path) => TransformHooks::load(path)
                .with_context(|| format!("failed to load hooks from {}", path.display()))?,
            None => TransformHooks::new(),
        };
        let source = self.target.source(!hooks.is_empty())?;
        let criteria = self.target.criteria()?;

        let rt = Runtime::load()?;
        let req = UpdateRequest {
            subscription: self.target.subscription.clone(),
            source,
            criteria,
            instance: self.target.function.clone(),
            options: PlanOptions {
                force: self.force,
                delete: self.delete,
            },
            dry_run: self.dry_run,
            hooks,
            workers: self.workers.unwrap_or(rt.settings.workers),
            policy: BuildPolicy::from_settings(&rt.settings),
            default_include: rt.settings.default_include.clone(),
        };
        req.validate()?;

        let profile = ProfileName::from_option(self.target.profile.clone());
        let result = async {
            let session = rt.sessions.open(&profile).await?;
            anyhow::Ok(run_update(rt.remote.clone(), session, req).await?)
        }
        .await;
        rt.sessions.close_all().await;

        let report = match result.context("update failed")? {
            FleetRun::NoTargets => {
                print_no_targets();
                return Ok(());
            }
            FleetRun::Completed(report) => report,
        };
        for (instance, outcome) in &report.outcomes {
            match outcome {
                UpdateOutcome::UpToDate => {
                    println!("{} {instance} is up-to-date.", "·".bright_black())
                }
                UpdateOutcome::WouldUpdate(files) => println!(
                    "{} Would update {instance}: {}",
                    "~".yellow(),
                    files.join(", ")
                ),
                UpdateOutcome::Updated(files) => {
                    println!("{} Updated {instance}: {}", "✎".green(), files.join(", "))
                }
            }
        }
        print_report(&self.target.subscription, &report)
    }
}
