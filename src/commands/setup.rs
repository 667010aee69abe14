use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, RunContext};
use crate::ledger::audit;
use crate::ledger::engine;
use crate::ledger::lock::RunLock;
use crate::ledger::period::periods_for_year;
use crate::sheets::{Destination, open_destination};

#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    pub destination: String,
    pub credentials: Option<PathBuf>,
    pub year: Option<i32>,
}

pub fn run(opts: &SetupOptions) -> Result<CommandReport> {
    let ctx = RunContext::load()?;
    let mut report = CommandReport::new("setup");
    let destination = Destination::parse(&opts.destination);
    let year = ctx.year_or_current(opts.year);

    report.detail(format!("destination={}", destination.label()));
    report.detail(format!("year={year}"));

    let periods = periods_for_year(year, ctx.today);
    if periods.is_empty() {
        report.issue(format!("year {year} has not started yet; no month sheets to set up"));
        return Ok(report);
    }

    let _lock = RunLock::acquire(&ctx.paths)?;
    let mut store = open_destination(&destination, opts.credentials.as_deref())?;
    let sheets = engine::setup_sheets(&mut *store, &ctx.cfg, &periods)?;

    let filled: usize = sheets.iter().map(|s| s.headers_filled).sum();
    for sheet in &sheets {
        report.detail(format!("{}: headers_filled={}", sheet.sheet, sheet.headers_filled));
    }
    audit::append_event(
        &ctx.paths,
        "setup",
        "ok",
        &format!("sheets={} headers_filled={filled}", sheets.len()),
    )?;
    Ok(report)
}
