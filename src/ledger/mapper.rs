use crate::error::SyncError;
use crate::ledger::cells::{FieldKind, as_text, format_date, format_duration, normalize};
use crate::ledger::record::RawRecord;
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::BTreeMap;

pub const MONTH_HEADERS: [&str; 7] = [
    "Date",
    "toggl_id",
    "Start",
    "End",
    "Project",
    "Description",
    "Duration",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Column {
    Date,
    ExternalId,
    Start,
    End,
    Project,
    Description,
    Duration,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Date,
        Column::ExternalId,
        Column::Start,
        Column::End,
        Column::Project,
        Column::Description,
        Column::Duration,
    ];

    pub fn header(self) -> &'static str {
        MONTH_HEADERS[self.offset()]
    }

    /// Zero-based position in the header row.
    pub fn offset(self) -> usize {
        match self {
            Column::Date => 0,
            Column::ExternalId => 1,
            Column::Start => 2,
            Column::End => 3,
            Column::Project => 4,
            Column::Description => 5,
            Column::Duration => 6,
        }
    }

    /// 1-based sheet column.
    pub fn sheet_col(self) -> u32 {
        self.offset() as u32 + 1
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Column::Date => FieldKind::Date,
            Column::ExternalId => FieldKind::Integer,
            Column::Start | Column::End => FieldKind::Clock,
            Column::Project | Column::Description => FieldKind::Text,
            Column::Duration => FieldKind::Duration,
        }
    }
}

/// One record in the fixed field set of a month sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRow {
    pub date: NaiveDate,
    pub external_id: i64,
    pub start: String,
    pub end: String,
    pub project: Option<String>,
    pub description: String,
    pub duration_secs: i64,
}

impl CanonicalRow {
    /// The value in the form used for comparison against existing cells.
    pub fn field(&self, column: Column) -> String {
        match column {
            Column::Date => format_date(self.date),
            Column::ExternalId => self.external_id.to_string(),
            Column::Start => self.start.clone(),
            Column::End => self.end.clone(),
            Column::Project => self.project.clone().unwrap_or_default(),
            Column::Description => self.description.clone(),
            Column::Duration => format_duration(self.duration_secs),
        }
    }

    /// The value as written to the destination.
    pub fn cell(&self, column: Column, marker: &str) -> String {
        match column {
            Column::Project => match &self.project {
                Some(name) => as_text(name, marker),
                None => String::new(),
            },
            Column::Description => as_text(&self.description, marker),
            other => self.field(other),
        }
    }

    /// Columns whose existing value differs from this row. `existing` is
    /// indexed by header offset.
    pub fn changed_columns(&self, existing: &[String], marker: &str) -> Vec<Column> {
        Column::ALL
            .into_iter()
            .filter(|col| {
                let current = existing.get(col.offset()).map(String::as_str).unwrap_or("");
                normalize(col.kind(), current, marker) != self.field(*col)
            })
            .collect()
    }
}

/// Turns raw records into canonical rows in an explicit timezone.
pub struct RowMapper {
    tz: Tz,
    projects: BTreeMap<i64, String>,
}

impl RowMapper {
    pub fn new(tz: Tz, projects: BTreeMap<i64, String>) -> Self {
        Self { tz, projects }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn map(&self, record: &RawRecord) -> Result<CanonicalRow, SyncError> {
        let computed = (record.stop - record.start).num_seconds();
        if computed != record.duration {
            return Err(SyncError::DurationMismatch {
                id: record.id,
                computed,
                reported: record.duration,
            });
        }

        let start = record.start.with_timezone(&self.tz);
        let stop = record.stop.with_timezone(&self.tz);
        // A missing or unknown project maps to an empty cell.
        let project = record
            .project_id
            .and_then(|pid| self.projects.get(&pid).cloned());

        Ok(CanonicalRow {
            date: start.date_naive(),
            external_id: record.id,
            start: start.format("%H:%M").to_string(),
            end: stop.format("%H:%M").to_string(),
            project,
            description: record.description.clone(),
            duration_secs: record.duration,
        })
    }
}
