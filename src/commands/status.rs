use anyhow::Result;
use std::env;

use crate::commands::{CommandReport, RunContext};
use crate::ledger::config::resolve_config_path;

include!(concat!(env!("OUT_DIR"), "/env_allowlist.rs"));

/// `TOGGL_SYNC_*` variables in `vars` that no code reads, usually typos.
fn unknown_env_keys(vars: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut unknown: Vec<String> = vars
        .into_iter()
        .filter(|key| key.starts_with("TOGGL_SYNC_"))
        .filter(|key| !GENERATED_ENV_ALLOWLIST.contains(&key.as_str()))
        .collect();
    unknown.sort();
    unknown
}

pub fn run() -> Result<CommandReport> {
    let ctx = RunContext::load()?;
    let mut report = CommandReport::new("status");
    let config_path = resolve_config_path(&ctx.paths.home);

    report.detail(format!("build_id={}", env!("BUILD_ID")));
    report.detail(format!("home={}", ctx.paths.home.display()));
    report.detail(format!("logs_dir={}", ctx.paths.logs_dir.display()));
    report.detail(format!(
        "config_file={} ({})",
        config_path.display(),
        if config_path.exists() { "present" } else { "defaults" }
    ));
    report.detail(format!("timezone={}", ctx.cfg.timezone));
    report.detail(format!("today={}", ctx.today));
    report.detail(format!(
        "source: api_base={} page_cap={} max_pages={}",
        ctx.cfg.source.api_base, ctx.cfg.source.page_cap, ctx.cfg.source.max_pages
    ));
    report.detail(format!(
        "destination: batch_cells={} month_rows={} month_cols={} summary_rows={}",
        ctx.cfg.destination.batch_cells,
        ctx.cfg.destination.month_rows,
        ctx.cfg.destination.month_cols,
        ctx.cfg.destination.summary_rows
    ));
    let has_token = env::var("TOGGL_SYNC_API_TOKEN").is_ok_and(|v| !v.trim().is_empty());
    report.detail(format!("api_token={}", if has_token { "set" } else { "missing" }));

    for key in unknown_env_keys(env::vars().map(|(key, _)| key)) {
        report.issue(format!("unknown environment variable {key}"));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_covers_keys_read_in_source() {
        for key in ["TOGGL_SYNC_HOME", "TOGGL_SYNC_TIMEZONE", "TOGGL_SYNC_API_TOKEN"] {
            assert!(GENERATED_ENV_ALLOWLIST.contains(&key), "{key} missing");
        }
    }

    #[test]
    fn misspelled_keys_are_flagged() {
        // Built at runtime so the build script does not allowlist it.
        let typo = format!("{}TIMEZOEN", "TOGGL_SYNC_");
        let unknown = unknown_env_keys([
            "TOGGL_SYNC_TIMEZONE".to_string(),
            typo.clone(),
            "PATH".to_string(),
        ]);
        assert_eq!(unknown, vec![typo]);
    }
}
