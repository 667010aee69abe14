use crate::error::SyncError;
use crate::ledger::source::PaginationLimits;
use anyhow::{Result, anyhow};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const MIN_BATCH_CELLS: usize = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub api_base: String,
    pub page_cap: usize,
    pub max_pages: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.track.toggl.com/api/v9".to_string(),
            page_cap: 1000,
            max_pages: 100,
        }
    }
}

impl SourceConfig {
    pub fn limits(&self) -> PaginationLimits {
        PaginationLimits {
            page_cap: self.page_cap,
            max_pages: self.max_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub batch_cells: usize,
    pub month_rows: u32,
    pub month_cols: u32,
    pub summary_rows: u32,
    #[serde(default = "default_text_marker")]
    pub text_marker: String,
}

fn default_text_marker() -> String {
    "'".to_string()
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            batch_cells: 500,
            month_rows: 1000,
            month_cols: 20,
            summary_rows: 100,
            text_marker: default_text_marker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub timezone: String,
    pub source: SourceConfig,
    pub destination: DestinationConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            source: SourceConfig::default(),
            destination: DestinationConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone.trim().parse::<Tz>().map_err(|_| {
            SyncError::InvalidConfig(format!("unknown timezone `{}`", self.timezone)).into()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSyncConfig {
    timezone: Option<String>,
    source: Option<SourceConfig>,
    destination: Option<DestinationConfig>,
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

pub fn validate(cfg: &SyncConfig) -> Result<()> {
    cfg.tz()?;
    if cfg.source.page_cap == 0 {
        return Err(SyncError::InvalidConfig("page cap must be >= 1".into()).into());
    }
    if cfg.source.max_pages == 0 {
        return Err(SyncError::InvalidConfig("max pages must be >= 1".into()).into());
    }
    if cfg.source.api_base.trim().is_empty() {
        return Err(SyncError::InvalidConfig("api base cannot be empty".into()).into());
    }
    if cfg.destination.batch_cells < MIN_BATCH_CELLS {
        return Err(SyncError::InvalidConfig(format!(
            "batch cells must be >= {MIN_BATCH_CELLS} so one row fits a batch"
        ))
        .into());
    }
    if cfg.destination.month_cols < MIN_BATCH_CELLS as u32 {
        return Err(SyncError::InvalidConfig(format!(
            "month sheet columns must be >= {MIN_BATCH_CELLS}"
        ))
        .into());
    }
    if cfg.destination.month_rows < 2 || cfg.destination.summary_rows < 2 {
        return Err(
            SyncError::InvalidConfig("sheets need room for a header and one row".into()).into(),
        );
    }
    Ok(())
}

pub fn resolve_config_path(home: &Path) -> PathBuf {
    if let Ok(custom) = env::var("TOGGL_SYNC_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    home.join("config.toml")
}

fn merge_file_config(base: &mut SyncConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: PartialSyncConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse sync config {}: {err}", path.display()))?;
    if let Some(timezone) = parsed.timezone {
        base.timezone = timezone;
    }
    if let Some(source) = parsed.source {
        base.source = source;
    }
    if let Some(destination) = parsed.destination {
        base.destination = destination;
    }
    Ok(())
}

pub fn load_config(home: &Path) -> Result<SyncConfig> {
    let mut cfg = SyncConfig::default();
    merge_file_config(&mut cfg, &resolve_config_path(home))?;

    cfg.timezone = env_or_string("TOGGL_SYNC_TIMEZONE", &cfg.timezone);
    cfg.source.api_base = env_or_string("TOGGL_SYNC_API_BASE", &cfg.source.api_base);
    cfg.source.page_cap = env_or_usize("TOGGL_SYNC_PAGE_CAP", cfg.source.page_cap);
    cfg.source.max_pages = env_or_usize("TOGGL_SYNC_MAX_PAGES", cfg.source.max_pages);
    cfg.destination.batch_cells =
        env_or_usize("TOGGL_SYNC_BATCH_CELLS", cfg.destination.batch_cells);

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_validate() {
        let cfg = SyncConfig::default();
        validate(&cfg).expect("defaults are valid");
        assert_eq!(cfg.tz().expect("tz"), chrono_tz::UTC);
        assert_eq!(cfg.source.limits().page_cap, 1000);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let cfg = SyncConfig {
            timezone: "Mars/Olympus".to_string(),
            ..SyncConfig::default()
        };
        let err = validate(&cfg).expect_err("bad tz");
        assert!(format!("{err}").contains("Mars/Olympus"));
    }

    #[test]
    fn batch_must_fit_one_row() {
        let mut cfg = SyncConfig::default();
        cfg.destination.batch_cells = 6;
        assert!(validate(&cfg).is_err());
        cfg.destination.batch_cells = 7;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn file_sections_replace_defaults() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            "timezone = \"Europe/Berlin\"\n\n[source]\napi_base = \"http://localhost:9\"\npage_cap = 50\nmax_pages = 3\n",
        )
        .expect("write");

        let mut cfg = SyncConfig::default();
        merge_file_config(&mut cfg, &path).expect("merge");
        assert_eq!(cfg.timezone, "Europe/Berlin");
        assert_eq!(cfg.source.page_cap, 50);
        assert_eq!(cfg.destination.batch_cells, 500);
    }

    #[test]
    fn missing_file_keeps_defaults() {
        let tmp = tempdir().expect("tempdir");
        let mut cfg = SyncConfig::default();
        merge_file_config(&mut cfg, &tmp.path().join("absent.toml")).expect("merge");
        assert_eq!(cfg.timezone, "UTC");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[source\n").expect("write");
        let mut cfg = SyncConfig::default();
        assert!(merge_file_config(&mut cfg, &path).is_err());
    }
}
