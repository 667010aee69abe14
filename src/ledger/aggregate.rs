use crate::ledger::cells::{FieldKind, as_text, format_date, format_duration, normalize};
use crate::ledger::index::FIRST_DATA_ROW;
use crate::ledger::period::Period;
use crate::ledger::record::RawRecord;
use crate::sheets::{CellRange, CellWrite, SheetInfo, SheetStore};
use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};

pub const MONTHLY_HEADERS: [&str; 3] = ["Period", "Days Worked", "Total Hours"];
pub const WEEKLY_HEADERS: [&str; 3] = ["Week Start", "Days Worked", "Total Hours"];

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    pub seconds: i64,
    pub days: BTreeSet<NaiveDate>,
}

impl Bucket {
    fn add(&mut self, date: NaiveDate, seconds: i64) {
        self.seconds += seconds;
        self.days.insert(date);
    }

    pub fn days_worked(&self) -> usize {
        self.days.len()
    }
}

/// One summary line ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub label: String,
    pub days_worked: usize,
    pub seconds: i64,
}

/// Running weekly and monthly totals for one reconciliation run.
#[derive(Debug, Clone)]
pub struct Aggregates {
    tz: Tz,
    weekly: BTreeMap<NaiveDate, Bucket>,
    monthly: BTreeMap<Period, Bucket>,
}

impl Aggregates {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            weekly: BTreeMap::new(),
            monthly: BTreeMap::new(),
        }
    }

    /// Fold one record into its Monday-anchored week and into `period`.
    pub fn add(&mut self, period: Period, record: &RawRecord) {
        let local_date = record.start.with_timezone(&self.tz).date_naive();
        self.weekly
            .entry(week_start(local_date))
            .or_default()
            .add(local_date, record.duration);
        self.monthly
            .entry(period)
            .or_default()
            .add(local_date, record.duration);
    }

    pub fn weekly_rows(&self) -> Vec<SummaryRow> {
        self.weekly
            .iter()
            .map(|(start, bucket)| SummaryRow {
                label: format_date(*start),
                days_worked: bucket.days_worked(),
                seconds: bucket.seconds,
            })
            .collect()
    }

    pub fn monthly_rows(&self) -> Vec<SummaryRow> {
        self.monthly
            .iter()
            .map(|(period, bucket)| SummaryRow {
                label: period.label(),
                days_worked: bucket.days_worked(),
                seconds: bucket.seconds,
            })
            .collect()
    }
}

/// How the label column of a summary sheet is stored and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// `YYYY-MM`, forced to text so the sheet does not turn it into a date.
    Month,
    Date,
}

/// Write `rows` (already sorted by period) below the header of `sheet`.
/// One bounded read finds the cells that already hold the right value, then
/// everything else goes out in a single batch. Rows left over from an earlier
/// run with more buckets are blanked. Returns the cells written.
pub fn flush(
    store: &mut dyn SheetStore,
    sheet: &SheetInfo,
    rows: &[SummaryRow],
    label_kind: LabelKind,
    marker: &str,
) -> Result<usize> {
    let last_row = (FIRST_DATA_ROW + rows.len() as u32)
        .saturating_sub(1)
        .max(sheet.row_count);
    if last_row < FIRST_DATA_ROW {
        return Ok(0);
    }
    let range = CellRange::new(FIRST_DATA_ROW, 1, last_row, 3);
    let existing = store.read_range(&sheet.title, range)?;

    let label_field = match label_kind {
        LabelKind::Month => FieldKind::Text,
        LabelKind::Date => FieldKind::Date,
    };
    let mut cells = Vec::new();
    for (offset, (summary, current)) in rows.iter().zip(existing.iter()).enumerate() {
        let row = FIRST_DATA_ROW + offset as u32;
        let label_cell = match label_kind {
            LabelKind::Month => as_text(&summary.label, marker),
            LabelKind::Date => summary.label.clone(),
        };
        let wanted = [
            (label_field, summary.label.clone(), label_cell),
            (
                FieldKind::Integer,
                summary.days_worked.to_string(),
                summary.days_worked.to_string(),
            ),
            (
                FieldKind::Duration,
                format_duration(summary.seconds),
                format_duration(summary.seconds),
            ),
        ];
        for (col_offset, (kind, comparable, cell)) in wanted.into_iter().enumerate() {
            let found = current.get(col_offset).map(String::as_str).unwrap_or("");
            if normalize(kind, found, marker) != comparable {
                cells.push(CellWrite::new(row, col_offset as u32 + 1, cell));
            }
        }
    }

    for (offset, current) in existing.iter().enumerate().skip(rows.len()) {
        let row = FIRST_DATA_ROW + offset as u32;
        for (col_offset, found) in current.iter().enumerate() {
            if !found.trim().is_empty() {
                cells.push(CellWrite::new(row, col_offset as u32 + 1, ""));
            }
        }
    }

    if !cells.is_empty() {
        store.write_cells(&sheet.title, &cells)?;
    }
    Ok(cells.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::workbook::Workbook;
    use chrono::{TimeZone, Utc};

    fn record(id: i64, (y, m, d): (i32, u32, u32), hour: u32, secs: i64) -> RawRecord {
        let start = Utc.with_ymd_and_hms(y, m, d, hour, 0, 0).unwrap();
        RawRecord {
            id,
            start,
            stop: start + Duration::seconds(secs),
            duration: secs,
            project_id: None,
            description: String::new(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn week_start_is_monday() {
        assert_eq!(week_start(date(2026, 1, 5)), date(2026, 1, 5));
        assert_eq!(week_start(date(2026, 1, 11)), date(2026, 1, 5));
        assert_eq!(week_start(date(2026, 1, 1)), date(2025, 12, 29));
    }

    #[test]
    fn same_week_records_share_one_bucket() {
        let jan = Period::new(2026, 1).unwrap();
        let mut agg = Aggregates::new(chrono_tz::UTC);
        agg.add(jan, &record(1, (2026, 1, 6), 9, 3600));
        agg.add(jan, &record(2, (2026, 1, 8), 9, 1800));

        let weekly = agg.weekly_rows();
        assert_eq!(weekly.len(), 1);
        assert_eq!(weekly[0].label, "2026-01-05");
        assert_eq!(weekly[0].seconds, 5400);
        assert_eq!(format_duration(weekly[0].seconds), "1:30");
        assert_eq!(weekly[0].days_worked, 2);
    }

    #[test]
    fn weeks_spanning_months_fold_across_periods() {
        let jan = Period::new(2026, 1).unwrap();
        let feb = Period::new(2026, 2).unwrap();
        let mut agg = Aggregates::new(chrono_tz::UTC);
        agg.add(jan, &record(1, (2026, 1, 30), 9, 3600));
        agg.add(feb, &record(2, (2026, 2, 2), 9, 600));
        agg.add(feb, &record(3, (2026, 2, 1), 9, 600));

        let weekly: Vec<(String, i64)> = agg
            .weekly_rows()
            .into_iter()
            .map(|r| (r.label, r.seconds))
            .collect();
        assert_eq!(
            weekly,
            vec![
                ("2026-01-26".to_string(), 4200),
                ("2026-02-02".to_string(), 600)
            ]
        );
        let monthly = agg.monthly_rows();
        assert_eq!(monthly[0].label, "2026-01");
        assert_eq!(monthly[1].seconds, 1200);
        assert_eq!(monthly[1].days_worked, 2);
    }

    #[test]
    fn bucket_date_follows_configured_timezone() {
        let jan = Period::new(2026, 1).unwrap();
        let mut agg = Aggregates::new(chrono_tz::America::Los_Angeles);
        // 03:00 UTC on Monday is still Sunday in Los Angeles.
        agg.add(jan, &record(1, (2026, 1, 12), 3, 60));
        assert_eq!(agg.weekly_rows()[0].label, format_date(date(2026, 1, 5)));
    }

    #[test]
    fn flush_writes_once_and_is_idempotent() {
        let jan = Period::new(2026, 1).unwrap();
        let mut agg = Aggregates::new(chrono_tz::UTC);
        agg.add(jan, &record(1, (2026, 1, 6), 9, 3600));
        agg.add(jan, &record(2, (2026, 1, 13), 9, 1800));

        let mut book = Workbook::in_memory();
        let sheet = book.worksheet("Weekly", 100, 3).expect("sheet");
        let written = flush(&mut book, &sheet, &agg.weekly_rows(), LabelKind::Date, "'")
            .expect("flush");
        assert_eq!(written, 6);
        assert_eq!(book.write_calls(), 1);
        assert_eq!(book.cell("Weekly", 3, 1), Some("2026-01-12"));
        assert_eq!(book.cell("Weekly", 3, 3), Some("0:30"));

        let again = flush(&mut book, &sheet, &agg.weekly_rows(), LabelKind::Date, "'")
            .expect("flush again");
        assert_eq!(again, 0);
        assert_eq!(book.write_calls(), 1);
    }

    #[test]
    fn shrinking_bucket_set_blanks_leftover_rows() {
        let jan = Period::new(2026, 1).unwrap();
        let mut both = Aggregates::new(chrono_tz::UTC);
        both.add(jan, &record(1, (2026, 1, 5), 9, 3600));
        both.add(jan, &record(2, (2026, 1, 12), 9, 3600));
        let mut later = Aggregates::new(chrono_tz::UTC);
        later.add(jan, &record(2, (2026, 1, 12), 9, 3600));

        let mut book = Workbook::in_memory();
        let sheet = book.worksheet("Weekly", 100, 3).expect("sheet");
        flush(&mut book, &sheet, &both.weekly_rows(), LabelKind::Date, "'").expect("first");
        let sheet = book.worksheet("Weekly", 100, 3).expect("reopen");
        let written =
            flush(&mut book, &sheet, &later.weekly_rows(), LabelKind::Date, "'").expect("second");

        // Row 2 moves from Jan 5 to Jan 12 (label only), row 3 is blanked.
        assert_eq!(written, 4);
        assert_eq!(book.cell("Weekly", 2, 1), Some("2026-01-12"));
        assert_eq!(book.cell("Weekly", 2, 3), Some("1:00"));
        for col in 1..=3 {
            assert_eq!(book.cell("Weekly", 3, col), Some(""));
        }

        let none: Vec<SummaryRow> = Vec::new();
        let cleared = flush(&mut book, &sheet, &none, LabelKind::Date, "'").expect("empty");
        assert_eq!(cleared, 3);
        assert_eq!(book.cell("Weekly", 2, 1), Some(""));
    }

    #[test]
    fn month_labels_are_written_as_text() {
        let jan = Period::new(2026, 1).unwrap();
        let mut agg = Aggregates::new(chrono_tz::UTC);
        agg.add(jan, &record(1, (2026, 1, 6), 9, 7200));
        let mut book = Workbook::in_memory();
        let sheet = book.worksheet("Summary", 100, 3).expect("sheet");
        flush(&mut book, &sheet, &agg.monthly_rows(), LabelKind::Month, "'").expect("flush");
        assert_eq!(book.cell("Summary", 2, 1), Some("'2026-01"));
        assert_eq!(book.cell("Summary", 2, 2), Some("1"));
        assert_eq!(book.cell("Summary", 2, 3), Some("2:00"));
    }
}
