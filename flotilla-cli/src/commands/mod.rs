pub mod diff;
pub mod migrate;
pub mod update;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use flotilla_core::{settings, InstanceRef, SearchCriteria, Settings, SubscriptionId};
use flotilla_remote::{FuseCliResolver, HttpRemote, RemoteApi, SessionManager};
use flotilla_sync::{ExecutionReport, TemplateSource};

/// Template and target selection shared by `update` and `diff`.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Template function as <boundary>/<function>.
    pub template: Option<InstanceRef>,

    /// Subscription holding the template and the targets.
    #[arg(short, long, value_name = "SUBSCRIPTION")]
    pub subscription: SubscriptionId,

    /// Search criteria as key=value; repeat to AND clauses.
    #[arg(short, long = "criteria", value_name = "KEY=VALUE")]
    pub criteria: Vec<String>,

    /// A single function as <boundary>/<function>, instead of searching.
    #[arg(short = 'u', long = "function", value_name = "BOUNDARY/FUNCTION")]
    pub function: Option<InstanceRef>,

    /// Only propagate files under this prefix of the template.
    #[arg(short, long)]
    pub include: Option<String>,

    /// Read the template from a local directory.
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Credential profile; the tool's default profile when omitted.
    #[arg(long)]
    pub profile: Option<String>,
}

impl TargetArgs {
    pub fn source(&self, has_hooks: bool) -> Result<TemplateSource> {
        Ok(TemplateSource::select(
            self.template.clone(),
            self.path.clone(),
            self.include.clone(),
            has_hooks,
        )?)
    }

    pub fn criteria(&self) -> Result<SearchCriteria> {
        Ok(SearchCriteria::new(self.criteria.iter().cloned())?)
    }
}

/// Settings plus the clients every command needs.
pub struct Runtime {
    pub settings: Settings,
    pub sessions: SessionManager,
    pub remote: Arc<dyn RemoteApi>,
}

impl Runtime {
    pub fn load() -> Result<Self> {
        let settings = settings::load().context("failed to load flotilla settings")?;
        let resolver = Arc::new(FuseCliResolver::new(settings.credential_binary.clone()));
        let sessions = SessionManager::new(resolver, settings.token_refresh_interval());
        Ok(Self {
            settings,
            sessions,
            remote: Arc::new(HttpRemote::new()),
        })
    }
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "function")]
    function: String,
    #[tabled(rename = "reason")]
    reason: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedFunction<'a> {
    subscription_id: &'a str,
    boundary_id: &'a str,
    function_id: &'a str,
}

/// Print the end-of-run status and, when anything failed, a table plus one
/// re-runnable JSON line per failure.
pub fn print_report<O>(subscription: &SubscriptionId, report: &ExecutionReport<O>) -> Result<()> {
    println!("{}", status_line(report));
    if report.failures.is_empty() {
        return Ok(());
    }
    let rows: Vec<FailureRow> = report
        .failures
        .iter()
        .map(|f| FailureRow {
            function: f.instance.to_string(),
            reason: f.reason.clone(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    for failure in &report.failures {
        let line = FailedFunction {
            subscription_id: subscription.as_str(),
            boundary_id: &failure.instance.boundary_id,
            function_id: &failure.instance.function_id,
        };
        println!(
            "{}",
            serde_json::to_string(&line).context("failed to serialize failure")?
        );
    }
    Ok(())
}

fn status_line<O>(report: &ExecutionReport<O>) -> String {
    let line = format!(
        "STATUS: {} failed out of {} total functions. {} applied.",
        report.failures.len(),
        report.total,
        report.applied()
    );
    if report.failures.is_empty() {
        line.green().bold().to_string()
    } else {
        line.red().bold().to_string()
    }
}

pub fn print_no_targets() {
    println!("{}", "No matching functions found".yellow());
}
