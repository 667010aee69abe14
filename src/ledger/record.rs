use anyhow::Result;
use chrono::{DateTime, Utc};

/// One time entry as a source page returns it. Entries that are still
/// running carry no `stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeEntry {
    pub id: i64,
    pub start: DateTime<Utc>,
    pub stop: Option<DateTime<Utc>>,
    pub duration: i64,
    pub project_id: Option<i64>,
    pub description: String,
}

/// A completed entry, immutable once the adapter yields it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id: i64,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub duration: i64,
    pub project_id: Option<i64>,
    pub description: String,
}

impl TimeEntry {
    pub fn is_running(&self) -> bool {
        self.stop.is_none() || self.duration < 0
    }

    pub fn into_record(self) -> Option<RawRecord> {
        if self.is_running() {
            return None;
        }
        Some(RawRecord {
            id: self.id,
            start: self.start,
            stop: self.stop?,
            duration: self.duration,
            project_id: self.project_id,
            description: self.description,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub client_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: i64,
    pub name: String,
}

/// Remote ledger queried by time window.
pub trait RecordSource {
    /// Entries starting in `[start, end)`, oldest first. A source that caps
    /// its answer must keep the oldest entries and drop the newest.
    fn fetch_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<TimeEntry>>;

    fn projects(&self) -> Result<Vec<Project>>;

    fn clients(&self) -> Result<Vec<Client>>;
}
