//! `flotilla diff`: unified diff of template versus each matching function.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use flotilla_remote::ProfileName;
use flotilla_sync::{run_diff, DiffRequest, FleetRun};

use super::{print_no_targets, print_report, Runtime, TargetArgs};

/// Arguments for `flotilla diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

impl DiffArgs {
    pub async fn run(self) -> Result<()> {
        let source = self.target.source(false)?;
        let criteria = self.target.criteria()?;

        let rt = Runtime::load()?;
        let req = DiffRequest {
            subscription: self.target.subscription.clone(),
            source,
            criteria,
            instance: self.target.function.clone(),
            default_include: rt.settings.default_include.clone(),
        };
        req.validate()?;

        let profile = ProfileName::from_option(self.target.profile.clone());
        let result = async {
            let session = rt.sessions.open(&profile).await?;
            anyhow::Ok(run_diff(rt.remote.clone(), session, req).await?)
        }
        .await;
        rt.sessions.close_all().await;

        let report = match result.context("diff failed")? {
            FleetRun::NoTargets => {
                print_no_targets();
                return Ok(());
            }
            FleetRun::Completed(report) => report,
        };
        for (instance, patches) in &report.outcomes {
            if patches.is_empty() {
                println!("{} {instance} matches the template.", "·".bright_black());
                continue;
            }
            for file in patches {
                print_patch(&file.patch);
            }
        }
        print_report(&self.target.subscription, &report)
    }
}

fn print_patch(patch: &str) {
    for line in patch.lines() {
        if line.starts_with("---") || line.starts_with("+++") {
            println!("{}", line.bold());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else {
            println!("{line}");
        }
    }
}
