pub mod client;
pub mod replay;

use crate::ledger::record::{Client, Project, TimeEntry};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntryWire {
    pub id: i64,
    pub start: String,
    #[serde(default)]
    pub stop: Option<String>,
    pub duration: i64,
    #[serde(default, alias = "pid")]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectWire {
    pub id: i64,
    pub name: String,
    #[serde(default, alias = "cid")]
    pub client_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientWire {
    pub id: i64,
    pub name: String,
}

fn parse_timestamp(raw: &str, id: i64) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("time entry {id}: invalid timestamp `{raw}`"))
}

impl TimeEntryWire {
    pub fn into_entry(self) -> Result<TimeEntry> {
        let start = parse_timestamp(&self.start, self.id)?;
        let stop = match self.stop.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_timestamp(raw, self.id)?),
            _ => None,
        };
        Ok(TimeEntry {
            id: self.id,
            start,
            stop,
            duration: self.duration,
            project_id: self.project_id,
            description: self.description.unwrap_or_default(),
        })
    }
}

impl From<ProjectWire> for Project {
    fn from(wire: ProjectWire) -> Self {
        Project {
            id: wire.id,
            name: wire.name,
            client_id: wire.client_id,
        }
    }
}

impl From<ClientWire> for Client {
    fn from(wire: ClientWire) -> Self {
        Client {
            id: wire.id,
            name: wire.name,
        }
    }
}
