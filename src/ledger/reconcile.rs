use crate::ledger::aggregate::Aggregates;
use crate::ledger::batch::WriteBuffer;
use crate::ledger::index::DestinationIndex;
use crate::ledger::mapper::{CanonicalRow, Column, MONTH_HEADERS, RowMapper};
use crate::ledger::period::Period;
use crate::ledger::record::RawRecord;
use crate::logging;
use crate::sheets::{CellWrite, SheetStore};
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl ReconcileCounts {
    pub fn total(&self) -> usize {
        self.added + self.updated + self.unchanged
    }

    pub fn merge(&mut self, other: ReconcileCounts) {
        self.added += other.added;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }
}

/// What one canonical row needs in the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    Append,
    Update { row: u32, columns: Vec<Column> },
    Unchanged,
}

pub fn plan_row(row: &CanonicalRow, index: &DestinationIndex, marker: &str) -> RowAction {
    let Some(existing) = index.get(row.external_id) else {
        return RowAction::Append;
    };
    let columns = row.changed_columns(&existing.ordered(&MONTH_HEADERS), marker);
    if columns.is_empty() {
        RowAction::Unchanged
    } else {
        RowAction::Update {
            row: existing.row,
            columns,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings<'a> {
    /// Staged cells that trigger a mid-period flush.
    pub batch_cells: usize,
    pub text_marker: &'a str,
}

/// Drives mapping, diffing and batched writes for each period, folding every
/// record into the run's aggregates as it goes.
pub struct Reconciler<'a> {
    mapper: RowMapper,
    aggregates: Aggregates,
    settings: ReconcileSettings<'a>,
}

impl<'a> Reconciler<'a> {
    pub fn new(mapper: RowMapper, settings: ReconcileSettings<'a>) -> Self {
        let aggregates = Aggregates::new(mapper.tz());
        Self {
            mapper,
            aggregates,
            settings,
        }
    }

    pub fn into_aggregates(self) -> Aggregates {
        self.aggregates
    }

    /// Reconcile one period's records into its sheet. The first failing
    /// record aborts the period; batches flushed before it stay written.
    pub fn reconcile<I>(
        &mut self,
        period: Period,
        records: I,
        index: &mut DestinationIndex,
        store: &mut dyn SheetStore,
    ) -> Result<ReconcileCounts>
    where
        I: IntoIterator<Item = Result<RawRecord>>,
    {
        let marker = self.settings.text_marker;
        let mut buffer = WriteBuffer::new(index.sheet(), self.settings.batch_cells);
        let mut counts = ReconcileCounts::default();

        for record in records {
            let record = record?;
            let row = self.mapper.map(&record)?;

            match plan_row(&row, index, marker) {
                RowAction::Append => {
                    let values: BTreeMap<String, String> = Column::ALL
                        .iter()
                        .map(|col| (col.header().to_string(), row.cell(*col, marker)))
                        .collect();
                    let target = index.claim_append_row(row.external_id, values);
                    buffer.stage(Column::ALL.iter().map(|col| {
                        CellWrite::new(target, col.sheet_col(), row.cell(*col, marker))
                    }));
                    counts.added += 1;
                }
                RowAction::Update { row: target, columns } => {
                    for col in columns {
                        let value = row.cell(col, marker);
                        index.record_update(row.external_id, col.header(), value.clone());
                        buffer.stage([CellWrite::new(target, col.sheet_col(), value)]);
                    }
                    counts.updated += 1;
                }
                RowAction::Unchanged => counts.unchanged += 1,
            }

            self.aggregates.add(period, &record);
            buffer.flush_if_full(store)?;
        }

        buffer.flush(store)?;
        logging::info(
            "reconcile",
            &[
                ("sheet", index.sheet().to_string()),
                ("batches", buffer.batches().to_string()),
                ("cells", buffer.cells_written().to_string()),
            ],
        );
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::ledger::index::setup_header;
    use crate::sheets::workbook::Workbook;
    use crate::sheets::{CellRange, SheetInfo};
    use chrono::{TimeZone, Utc};

    const MARKER: &str = "'";

    fn settings(batch_cells: usize) -> ReconcileSettings<'static> {
        ReconcileSettings {
            batch_cells,
            text_marker: MARKER,
        }
    }

    fn mapper() -> RowMapper {
        RowMapper::new(chrono_tz::UTC, BTreeMap::from([(5, "Website".to_string())]))
    }

    fn record(id: i64, start: (u32, u32), stop: (u32, u32), pid: Option<i64>) -> RawRecord {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, start.0, start.1, 0).unwrap();
        let stop = Utc.with_ymd_and_hms(2026, 1, 5, stop.0, stop.1, 0).unwrap();
        RawRecord {
            id,
            start,
            stop,
            duration: (stop - start).num_seconds(),
            project_id: pid,
            description: format!("task {id}"),
        }
    }

    fn jan_sheet(book: &mut Workbook) -> SheetInfo {
        let info = book.worksheet("Jan", 1000, 20).expect("sheet");
        setup_header(book, &info, &MONTH_HEADERS).expect("header");
        info
    }

    fn run(
        book: &mut Workbook,
        info: &SheetInfo,
        records: Vec<RawRecord>,
        batch_cells: usize,
    ) -> Result<ReconcileCounts> {
        let mut index = DestinationIndex::load(&*book, info, &MONTH_HEADERS, "toggl_id", MARKER)?;
        let mut reconciler = Reconciler::new(mapper(), settings(batch_cells));
        let jan = Period::new(2026, 1)?;
        reconciler.reconcile(jan, records.into_iter().map(Ok), &mut index, book)
    }

    fn row_values(book: &Workbook, row: u32) -> Vec<String> {
        book.read_range("Jan", CellRange::new(row, 1, row, 7))
            .expect("read")
            .remove(0)
    }

    #[test]
    fn scenario_append_then_update_one_field_pair() {
        let mut book = Workbook::in_memory();
        let info = jan_sheet(&mut book);

        let first = vec![
            record(100, (9, 0), (10, 30), Some(5)),
            record(101, (13, 0), (13, 0), None),
        ];
        let counts = run(&mut book, &info, first, 500).expect("first run");
        assert_eq!(
            counts,
            ReconcileCounts {
                added: 2,
                updated: 0,
                unchanged: 0
            }
        );
        assert_eq!(
            row_values(&book, 2),
            vec!["2026-01-05", "100", "09:00", "10:30", "'Website", "'task 100", "1:30"]
        );
        assert_eq!(row_values(&book, 3)[6], "0:00");

        let writes_before = book.write_calls();
        let second = vec![
            record(100, (9, 0), (11, 0), Some(5)),
            record(101, (13, 0), (13, 0), None),
        ];
        let counts = run(&mut book, &info, second, 500).expect("second run");
        assert_eq!(
            counts,
            ReconcileCounts {
                added: 0,
                updated: 1,
                unchanged: 1
            }
        );
        assert_eq!(book.write_calls(), writes_before + 1);
        let row = row_values(&book, 2);
        assert_eq!((row[3].as_str(), row[6].as_str()), ("11:00", "2:00"));
    }

    #[test]
    fn unchanged_source_is_idempotent() {
        let mut book = Workbook::in_memory();
        let info = jan_sheet(&mut book);
        let records = || {
            (0..5)
                .map(|i| record(200 + i, (8 + i as u32, 0), (8 + i as u32, 45), Some(5)))
                .collect::<Vec<_>>()
        };
        run(&mut book, &info, records(), 500).expect("first");
        let writes_before = book.write_calls();

        let counts = run(&mut book, &info, records(), 500).expect("second");
        assert_eq!(counts.unchanged, 5);
        assert_eq!(counts.total(), 5);
        assert_eq!(book.write_calls(), writes_before);
    }

    #[test]
    fn plan_row_reports_only_changed_columns() {
        let mut book = Workbook::in_memory();
        let info = jan_sheet(&mut book);
        run(&mut book, &info, vec![record(1, (9, 0), (10, 0), None)], 500).expect("seed");
        let index = DestinationIndex::load(&book, &info, &MONTH_HEADERS, "toggl_id", MARKER)
            .expect("index");

        let mut changed = mapper().map(&record(1, (9, 0), (10, 0), Some(5))).expect("row");
        changed.description = "renamed".to_string();
        assert_eq!(
            plan_row(&changed, &index, MARKER),
            RowAction::Update {
                row: 2,
                columns: vec![Column::Project, Column::Description]
            }
        );
        let fresh = mapper().map(&record(2, (9, 0), (10, 0), None)).expect("row");
        assert_eq!(plan_row(&fresh, &index, MARKER), RowAction::Append);
    }

    #[test]
    fn appends_after_existing_rows_and_batches_by_cell_count() {
        let mut book = Workbook::in_memory();
        let info = jan_sheet(&mut book);
        book.write_cells("Jan", &[CellWrite::new(4, 6, "'kept by hand")])
            .expect("seed");
        let writes_before = book.write_calls();

        let records: Vec<RawRecord> = (0..4)
            .map(|i| record(300 + i, (9, 0), (9, 10), None))
            .collect();
        // Two full rows per batch.
        let counts = run(&mut book, &info, records, 14).expect("run");
        assert_eq!(counts.added, 4);
        assert_eq!(book.write_calls(), writes_before + 2);
        assert_eq!(book.cell("Jan", 4, 6), Some("'kept by hand"));
        assert_eq!(book.cell("Jan", 5, 2), Some("300"));
        assert_eq!(book.cell("Jan", 8, 2), Some("303"));
    }

    #[test]
    fn duration_mismatch_aborts_after_flushed_batches() {
        let mut book = Workbook::in_memory();
        let info = jan_sheet(&mut book);
        let mut bad = record(402, (9, 0), (10, 0), None);
        bad.duration = 42;
        let records = vec![
            record(400, (9, 0), (9, 30), None),
            record(401, (10, 0), (10, 30), None),
            bad,
        ];
        let err = run(&mut book, &info, records, 7).expect_err("mismatch");
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::DurationMismatch { id: 402, .. })
        ));
        assert_eq!(book.cell("Jan", 2, 2), Some("400"));
        assert_eq!(book.cell("Jan", 3, 2), Some("401"));
        assert_eq!(book.cell("Jan", 4, 2), Some(""));
    }

    #[test]
    fn repeated_id_within_one_pass_updates_its_own_row() {
        let mut book = Workbook::in_memory();
        let info = jan_sheet(&mut book);
        let records = vec![
            record(500, (9, 0), (9, 30), None),
            record(500, (9, 0), (9, 45), None),
        ];
        let counts = run(&mut book, &info, records, 500).expect("run");
        assert_eq!((counts.added, counts.updated), (1, 1));
        assert_eq!(book.cell("Jan", 2, 4), Some("09:45"));
        assert_eq!(book.cell("Jan", 3, 2), Some(""));
    }

    #[test]
    fn aggregates_accumulate_every_record() {
        let mut book = Workbook::in_memory();
        let info = jan_sheet(&mut book);
        let mut index = DestinationIndex::load(&book, &info, &MONTH_HEADERS, "toggl_id", MARKER)
            .expect("index");
        let mut reconciler = Reconciler::new(mapper(), settings(500));
        let jan = Period::new(2026, 1).expect("period");
        let records = vec![
            record(1, (9, 0), (10, 0), None),
            record(2, (11, 0), (11, 30), None),
        ];
        reconciler
            .reconcile(jan, records.into_iter().map(Ok), &mut index, &mut book)
            .expect("run");
        let monthly = reconciler.into_aggregates().monthly_rows();
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].seconds, 5400);
    }
}
