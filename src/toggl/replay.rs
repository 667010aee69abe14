//! Offline record source backed by a JSON export.
//!
//! The file holds `{"projects": [...], "clients": [...], "entries": [...]}`
//! using the same field names as the Toggl API. Answers are capped at
//! `page_cap` entries, like the live service.

use crate::ledger::record::{Client, Project, RecordSource, TimeEntry};
use crate::toggl::{ClientWire, ProjectWire, TimeEntryWire};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct ReplayFile {
    #[serde(default)]
    projects: Vec<ProjectWire>,
    #[serde(default)]
    clients: Vec<ClientWire>,
    #[serde(default)]
    entries: Vec<TimeEntryWire>,
}

pub struct ReplaySource {
    entries: Vec<TimeEntry>,
    projects: Vec<Project>,
    clients: Vec<Client>,
    page_cap: usize,
}

impl ReplaySource {
    pub fn from_json(raw: &str, page_cap: usize) -> Result<Self> {
        let parsed: ReplayFile = serde_json::from_str(raw).context("invalid replay file")?;
        let mut entries = parsed
            .entries
            .into_iter()
            .map(TimeEntryWire::into_entry)
            .collect::<Result<Vec<_>>>()?;
        entries.sort_by_key(|e| (e.start, e.id));
        Ok(Self {
            entries,
            projects: parsed.projects.into_iter().map(Project::from).collect(),
            clients: parsed.clients.into_iter().map(Client::from).collect(),
            page_cap: page_cap.max(1),
        })
    }

    pub fn load(path: &Path, page_cap: usize) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&raw, page_cap)
            .with_context(|| format!("failed to load {}", path.display()))
    }
}

impl RecordSource for ReplaySource {
    fn fetch_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<TimeEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.start >= start && e.start < end)
            .take(self.page_cap)
            .cloned()
            .collect())
    }

    fn projects(&self) -> Result<Vec<Project>> {
        Ok(self.projects.clone())
    }

    fn clients(&self) -> Result<Vec<Client>> {
        Ok(self.clients.clone())
    }
}
