use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::commands::{CommandReport, RunContext};
use crate::ledger::audit;
use crate::ledger::engine::{self, RunOptions, RunSummary};
use crate::ledger::lock::RunLock;
use crate::ledger::period::periods_for_year;
use crate::ledger::record::RecordSource;
use crate::sheets::{Destination, open_destination};
use crate::toggl::client::{TogglClient, api_token_from_env};
use crate::toggl::replay::ReplaySource;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub destination: String,
    pub credentials: Option<PathBuf>,
    pub client: Option<String>,
    pub year: Option<i32>,
    pub entries_file: Option<PathBuf>,
}

fn open_source(ctx: &RunContext, entries_file: Option<&Path>) -> Result<Box<dyn RecordSource>> {
    match entries_file {
        Some(path) => Ok(Box::new(ReplaySource::load(path, ctx.cfg.source.page_cap)?)),
        None => {
            let token = api_token_from_env()?;
            Ok(Box::new(TogglClient::new(
                &ctx.cfg.source.api_base,
                token,
                ctx.cfg.source.limits(),
            )?))
        }
    }
}

fn describe(report: &mut CommandReport, summary: &RunSummary) {
    if let Some(client) = &summary.client {
        report.detail(format!("client={client}"));
    }
    for outcome in &summary.periods {
        report.detail(format!(
            "{}: added={} updated={} unchanged={}",
            outcome.sheet, outcome.counts.added, outcome.counts.updated, outcome.counts.unchanged
        ));
    }
    report.detail(format!(
        "total: added={} updated={} unchanged={} entries={}",
        summary.totals.added,
        summary.totals.updated,
        summary.totals.unchanged,
        summary.totals.total()
    ));
    report.detail(format!("monthly_buckets={}", summary.monthly_buckets));
    report.detail(format!("weekly_buckets={}", summary.weekly_buckets));
    report.detail(format!("summary_cells_written={}", summary.summary_cells_written));
}

fn sync_year(
    ctx: &RunContext,
    opts: &SyncOptions,
    destination: &Destination,
    year: i32,
) -> Result<RunSummary> {
    let source = open_source(ctx, opts.entries_file.as_deref())?;
    let mut store = open_destination(destination, opts.credentials.as_deref())?;
    let run_opts = RunOptions {
        year,
        today: ctx.today,
        client: opts.client.as_deref(),
    };
    engine::run_year(&*source, &mut *store, &ctx.cfg, &run_opts)
}

pub fn run(opts: &SyncOptions) -> Result<CommandReport> {
    let ctx = RunContext::load()?;
    let mut report = CommandReport::new("sync");
    let destination = Destination::parse(&opts.destination);
    let year = ctx.year_or_current(opts.year);

    report.detail(format!("destination={}", destination.label()));
    report.detail(format!("year={year}"));
    report.detail(format!("timezone={}", ctx.cfg.timezone));

    if periods_for_year(year, ctx.today).is_empty() {
        report.issue(format!("year {year} has not started yet; nothing to sync"));
        return Ok(report);
    }

    let _lock = RunLock::acquire(&ctx.paths)?;
    audit::append_event(
        &ctx.paths,
        "sync",
        "started",
        &format!("destination={} year={year}", destination.label()),
    )?;

    let summary = match sync_year(&ctx, opts, &destination, year) {
        Ok(summary) => summary,
        Err(err) => {
            audit::append_event(&ctx.paths, "sync", "failed", &format!("{err:#}"))?;
            return Err(err);
        }
    };

    audit::append_event(
        &ctx.paths,
        "sync",
        "ok",
        &format!(
            "added={} updated={} unchanged={}",
            summary.totals.added, summary.totals.updated, summary.totals.unchanged
        ),
    )?;
    describe(&mut report, &summary);
    Ok(report)
}
