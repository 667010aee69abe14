use crate::ledger::aggregate::{self, LabelKind, MONTHLY_HEADERS, WEEKLY_HEADERS};
use crate::ledger::config::SyncConfig;
use crate::ledger::index::{DestinationIndex, setup_header};
use crate::ledger::mapper::{Column, MONTH_HEADERS, RowMapper};
use crate::ledger::period::{Period, periods_for_year};
use crate::ledger::reconcile::{ReconcileCounts, ReconcileSettings, Reconciler};
use crate::ledger::record::RecordSource;
use crate::ledger::source::{fetch, resolve_association};
use crate::logging;
use crate::sheets::{SheetInfo, SheetStore};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

pub const MONTHLY_SHEET: &str = "Summary";
pub const WEEKLY_SHEET: &str = "Weekly";
const SUMMARY_COLS: u32 = 3;

#[derive(Debug, Clone)]
pub struct RunOptions<'a> {
    pub year: i32,
    pub today: NaiveDate,
    pub client: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodOutcome {
    pub period: String,
    pub sheet: String,
    pub counts: ReconcileCounts,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub client: Option<String>,
    pub periods: Vec<PeriodOutcome>,
    pub totals: ReconcileCounts,
    pub weekly_buckets: usize,
    pub monthly_buckets: usize,
    pub summary_cells_written: usize,
}

/// Header row of one sheet after setup, with the cells that had to be filled.
#[derive(Debug, Clone, Serialize)]
pub struct SheetSetup {
    pub sheet: String,
    pub headers_filled: usize,
}

fn reconcile_settings(cfg: &SyncConfig) -> ReconcileSettings<'_> {
    ReconcileSettings {
        batch_cells: cfg.destination.batch_cells,
        text_marker: &cfg.destination.text_marker,
    }
}

fn open_month_sheet(
    store: &mut dyn SheetStore,
    cfg: &SyncConfig,
    period: Period,
) -> Result<(SheetInfo, usize)> {
    let name = period.sheet_name();
    let sheet = store
        .worksheet(&name, cfg.destination.month_rows, cfg.destination.month_cols)
        .with_context(|| format!("failed to open sheet {name}"))?;
    let filled = setup_header(store, &sheet, &MONTH_HEADERS)?;
    Ok((sheet, filled))
}

fn open_summary_sheet(
    store: &mut dyn SheetStore,
    cfg: &SyncConfig,
    name: &str,
    headers: &[&str],
) -> Result<(SheetInfo, usize)> {
    let sheet = store
        .worksheet(name, cfg.destination.summary_rows, SUMMARY_COLS)
        .with_context(|| format!("failed to open sheet {name}"))?;
    let filled = setup_header(store, &sheet, headers)?;
    Ok((sheet, filled))
}

/// Create every month sheet of `periods` plus both summary sheets and make
/// sure their header rows are in place.
pub fn setup_sheets(
    store: &mut dyn SheetStore,
    cfg: &SyncConfig,
    periods: &[Period],
) -> Result<Vec<SheetSetup>> {
    let mut out = Vec::new();
    for period in periods {
        let (sheet, headers_filled) = open_month_sheet(store, cfg, *period)?;
        out.push(SheetSetup {
            sheet: sheet.title,
            headers_filled,
        });
    }
    for (name, headers) in [
        (MONTHLY_SHEET, &MONTHLY_HEADERS),
        (WEEKLY_SHEET, &WEEKLY_HEADERS),
    ] {
        let (sheet, headers_filled) = open_summary_sheet(store, cfg, name, headers)?;
        out.push(SheetSetup {
            sheet: sheet.title,
            headers_filled,
        });
    }
    Ok(out)
}

/// Reconcile every period of `opts.year` in order, then write the summary
/// sheets once. The first fault aborts the run.
pub fn run_year(
    source: &dyn RecordSource,
    store: &mut dyn SheetStore,
    cfg: &SyncConfig,
    opts: &RunOptions<'_>,
) -> Result<RunSummary> {
    let tz = cfg.tz()?;
    let marker = cfg.destination.text_marker.as_str();
    let periods = periods_for_year(opts.year, opts.today);

    let filter = opts
        .client
        .map(|name| resolve_association(source, name))
        .transpose()?;
    let projects: BTreeMap<i64, String> = source
        .projects()?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    let mut reconciler = Reconciler::new(RowMapper::new(tz, projects), reconcile_settings(cfg));
    let mut summary = RunSummary {
        client: filter.as_ref().map(|f| f.client.clone()),
        ..RunSummary::default()
    };

    for period in periods {
        let (sheet, _) = open_month_sheet(store, cfg, period)?;
        let mut index = DestinationIndex::load(
            &*store,
            &sheet,
            &MONTH_HEADERS,
            Column::ExternalId.header(),
            marker,
        )?;
        logging::info(
            "index",
            &[
                ("sheet", sheet.title.clone()),
                ("rows", index.indexed_rows().to_string()),
                ("next_append_row", index.next_append_row().to_string()),
            ],
        );
        let (start, end) = period.window(tz)?;
        let records = fetch(source, start, end, filter.as_ref(), cfg.source.limits());
        let counts = reconciler
            .reconcile(period, records, &mut index, store)
            .with_context(|| format!("reconciling {} failed", period.label()))?;

        logging::info(
            "period",
            &[
                ("sheet", sheet.title.clone()),
                ("added", counts.added.to_string()),
                ("updated", counts.updated.to_string()),
                ("unchanged", counts.unchanged.to_string()),
            ],
        );
        summary.totals.merge(counts);
        summary.periods.push(PeriodOutcome {
            period: period.label(),
            sheet: sheet.title,
            counts,
        });
    }

    let aggregates = reconciler.into_aggregates();
    let monthly = aggregates.monthly_rows();
    let weekly = aggregates.weekly_rows();
    summary.monthly_buckets = monthly.len();
    summary.weekly_buckets = weekly.len();

    let (sheet, _) = open_summary_sheet(store, cfg, MONTHLY_SHEET, &MONTHLY_HEADERS)?;
    summary.summary_cells_written +=
        aggregate::flush(store, &sheet, &monthly, LabelKind::Month, marker)?;
    let (sheet, _) = open_summary_sheet(store, cfg, WEEKLY_SHEET, &WEEKLY_HEADERS)?;
    summary.summary_cells_written +=
        aggregate::flush(store, &sheet, &weekly, LabelKind::Date, marker)?;

    Ok(summary)
}
