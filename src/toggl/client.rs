use crate::error::SyncError;
use crate::ledger::record::{Client, Project, RecordSource, TimeEntry};
use crate::ledger::source::PaginationLimits;
use crate::toggl::{ClientWire, ProjectWire, TimeEntryWire};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::Client as HttpClient;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::env;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 45;

pub fn api_token_from_env() -> Result<String> {
    match env::var("TOGGL_SYNC_API_TOKEN") {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => anyhow::bail!("TOGGL_SYNC_API_TOKEN is not set; it is required to query Toggl"),
    }
}

/// Toggl Track API client authenticated with a personal API token.
pub struct TogglClient {
    http: HttpClient,
    api_base: String,
    token: String,
    limits: PaginationLimits,
}

impl TogglClient {
    pub fn new(api_base: &str, token: String, limits: PaginationLimits) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            limits,
        })
    }

    fn query_entries(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<TimeEntry>> {
        let wire: Vec<TimeEntryWire> = self.get_json(
            "/me/time_entries",
            &[("start_date", rfc3339(start)), ("end_date", rfc3339(end))],
        )?;
        wire.into_iter().map(TimeEntryWire::into_entry).collect()
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.token, Some("api_token"))
            .query(query)
            .send()
            .with_context(|| format!("toggl request {path} failed"))?;
        if !response.status().is_success() {
            anyhow::bail!("toggl call {path} failed with status {}", response.status());
        }
        response
            .json::<T>()
            .with_context(|| format!("toggl response for {path} did not parse"))
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Collect every entry of `[start, end)` from an endpoint that answers newest
/// first and keeps only the newest `page_cap` entries of a full answer.
///
/// After a full answer the window end moves to one second past the oldest
/// start it held, so entries sharing that second are asked for again and
/// dropped by id.
fn drain_newest_first(
    mut query: impl FnMut(DateTime<Utc>, DateTime<Utc>) -> Result<Vec<TimeEntry>>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limits: PaginationLimits,
) -> Result<Vec<TimeEntry>> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut upper = end;
    for _ in 0..limits.max_pages {
        let page = query(start, upper)?;
        let full = page.len() >= limits.page_cap;
        let oldest = page.iter().map(|e| e.start).min();
        let before = entries.len();
        entries.extend(page.into_iter().filter(|e| seen.insert(e.id)));

        let Some(oldest) = oldest.filter(|_| full) else {
            entries.sort_by_key(|e| (e.start, e.id));
            return Ok(entries);
        };
        if entries.len() == before {
            return Err(SyncError::PaginationStalled {
                at: rfc3339(upper),
            }
            .into());
        }
        upper = (oldest + chrono::Duration::seconds(1)).min(upper);
    }
    Err(SyncError::PaginationRunaway {
        pages: limits.max_pages,
        page_cap: limits.page_cap,
    }
    .into())
}

impl RecordSource for TogglClient {
    /// Returns the whole window, oldest first, even when it spans several
    /// capped answers.
    fn fetch_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<TimeEntry>> {
        drain_newest_first(|s, e| self.query_entries(s, e), start, end, self.limits)
    }

    fn projects(&self) -> Result<Vec<Project>> {
        let wire: Vec<ProjectWire> = self.get_json("/me/projects", &[])?;
        Ok(wire.into_iter().map(Project::from).collect())
    }

    fn clients(&self) -> Result<Vec<Client>> {
        let wire: Option<Vec<ClientWire>> = self.get_json("/me/clients", &[])?;
        Ok(wire
            .unwrap_or_default()
            .into_iter()
            .map(Client::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::Cell;

    const LIMITS: PaginationLimits = PaginationLimits {
        page_cap: 10,
        max_pages: 100,
    };

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn entry(id: i64, start_secs: i64) -> TimeEntry {
        let start = base() + chrono::Duration::seconds(start_secs);
        TimeEntry {
            id,
            start,
            stop: Some(start + chrono::Duration::seconds(60)),
            duration: 60,
            project_id: None,
            description: String::new(),
        }
    }

    /// Answers like the live endpoint: newest first, truncated to `cap`.
    fn newest_first(
        entries: &[TimeEntry],
        cap: usize,
        calls: &Cell<usize>,
    ) -> impl FnMut(DateTime<Utc>, DateTime<Utc>) -> Result<Vec<TimeEntry>> {
        move |start, end| {
            calls.set(calls.get() + 1);
            let mut page: Vec<TimeEntry> = entries
                .iter()
                .filter(|e| e.start >= start && e.start < end)
                .cloned()
                .collect();
            page.sort_by_key(|e| std::cmp::Reverse(e.start));
            page.truncate(cap);
            Ok(page)
        }
    }

    #[test]
    fn capped_newest_first_answers_are_walked_back_to_the_window_start() {
        let entries: Vec<TimeEntry> = (0..35).map(|i| entry(i, i * 3600)).collect();
        let calls = Cell::new(0);
        let end = base() + chrono::Duration::days(31);
        let got = drain_newest_first(newest_first(&entries, 10, &calls), base(), end, LIMITS)
            .expect("drain");
        assert_eq!(got.iter().map(|e| e.id).collect::<Vec<_>>(), (0..35).collect::<Vec<_>>());
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn entries_sharing_the_oldest_second_are_not_lost() {
        let mut entries: Vec<TimeEntry> = (0..9).map(|i| entry(i, 7200 + i * 60)).collect();
        entries.extend((9..12).map(|i| entry(i, 3600)));
        let calls = Cell::new(0);
        let end = base() + chrono::Duration::days(1);
        let got = drain_newest_first(newest_first(&entries, 10, &calls), base(), end, LIMITS)
            .expect("drain");
        let mut ids: Vec<i64> = got.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn a_full_answer_inside_one_second_is_a_stall() {
        let entries: Vec<TimeEntry> = (0..12).map(|i| entry(i, 3600)).collect();
        let calls = Cell::new(0);
        let end = base() + chrono::Duration::days(1);
        let err = drain_newest_first(newest_first(&entries, 10, &calls), base(), end, LIMITS)
            .expect_err("stall");
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::PaginationStalled { .. })
        ));
    }

    #[test]
    fn query_timestamps_use_zulu_seconds() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(rfc3339(ts), "2026-01-01T00:00:00Z");
    }

    #[test]
    fn api_base_drops_trailing_slash() {
        let client = TogglClient::new("https://api.track.toggl.com/api/v9/", "t".into(), LIMITS)
            .expect("client");
        assert_eq!(client.api_base, "https://api.track.toggl.com/api/v9");
    }
}
