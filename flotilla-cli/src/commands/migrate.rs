//! `flotilla migrate`: copy functions between profiles.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;

use flotilla_core::{ConfigError, SearchCriteria, SubscriptionId};
use flotilla_remote::{ProfileName, Session};
use flotilla_sync::{run_migrate, BuildPolicy, FleetRun, JobState, MigrateRequest};

use super::{print_no_targets, print_report, Runtime};

/// Arguments for `flotilla migrate`.
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Profile to read functions from.
    pub source_profile: String,

    /// Profile to write functions to.
    pub dest_profile: String,

    /// Source subscription; the source profile's own when omitted.
    #[arg(short = 's', long = "source-subscription", value_name = "SUBSCRIPTION")]
    pub source_subscription: Option<SubscriptionId>,

    /// Destination subscription; the destination profile's own when omitted.
    #[arg(short = 'd', long = "dest-subscription", value_name = "SUBSCRIPTION")]
    pub dest_subscription: Option<SubscriptionId>,

    /// Search criteria as key=value; at least one is required.
    #[arg(short, long = "criteria", value_name = "KEY=VALUE")]
    pub criteria: Vec<String>,

    /// Functions processed concurrently.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Report what would be copied without writing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

impl MigrateArgs {
    pub async fn run(self) -> Result<()> {
        let criteria = SearchCriteria::new(self.criteria.iter().cloned())?;
        if criteria.is_empty() {
            return Err(ConfigError::EmptyCriteria.into());
        }

        let rt = Runtime::load()?;
        let source_profile = ProfileName::Named(self.source_profile.clone());
        let dest_profile = ProfileName::Named(self.dest_profile.clone());
        let workers = self.workers.unwrap_or(rt.settings.workers);
        let policy = BuildPolicy::from_settings(&rt.settings);

        let result = async {
            let source = rt.sessions.open(&source_profile).await?;
            let dest = rt.sessions.open(&dest_profile).await?;
            let req = MigrateRequest {
                source_subscription: subscription_for(self.source_subscription.clone(), &source)?,
                dest_subscription: subscription_for(self.dest_subscription.clone(), &dest)?,
                criteria,
                workers,
                dry_run: self.dry_run,
                policy,
            };
            tracing::info!(
                from = %req.source_subscription,
                to = %req.dest_subscription,
                "migrating functions",
            );
            let run = run_migrate(rt.remote.clone(), source, dest, req.clone()).await?;
            anyhow::Ok((req.source_subscription, run))
        }
        .await;
        rt.sessions.close_all().await;

        let (source_subscription, run) = result.context("migrate failed")?;
        let report = match run {
            FleetRun::NoTargets => {
                print_no_targets();
                return Ok(());
            }
            FleetRun::Completed(report) => report,
        };
        for (instance, job) in &report.outcomes {
            match job.state {
                JobState::Applied => println!("{} Migrated {instance}", "✎".green()),
                JobState::SkippedDryRun => {
                    let files = job.snapshot.as_ref().map_or(0, |s| s.files().len());
                    println!("{} Would migrate {instance} ({files} files)", "~".yellow())
                }
            }
        }
        print_report(&source_subscription, &report)
    }
}

fn subscription_for(
    explicit: Option<SubscriptionId>,
    session: &Session,
) -> Result<SubscriptionId> {
    if let Some(subscription) = explicit {
        return Ok(subscription);
    }
    let from_profile = session.default_subscription().ok_or_else(|| {
        anyhow!(
            "no subscription given and profile '{}' does not name one",
            session.profile()
        )
    })?;
    Ok(from_profile.parse()?)
}
