pub mod setup;
pub mod status;
pub mod sync;

use anyhow::Result;
use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;

use crate::ledger::config::{SyncConfig, load_config};
use crate::ledger::paths::{SyncPaths, resolve_paths};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// Paths, config and "today" in the configured timezone, shared by every
/// command that touches a destination.
pub(crate) struct RunContext {
    pub paths: SyncPaths,
    pub cfg: SyncConfig,
    pub today: NaiveDate,
}

impl RunContext {
    pub fn load() -> Result<Self> {
        let paths = resolve_paths()?;
        let cfg = load_config(&paths.home)?;
        let today = Utc::now().with_timezone(&cfg.tz()?).date_naive();
        Ok(Self { paths, cfg, today })
    }

    pub fn year_or_current(&self, year: Option<i32>) -> i32 {
        year.unwrap_or(self.today.year())
    }
}
