use crate::error::SyncError;
use crate::ledger::record::{RawRecord, RecordSource};
use crate::logging;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationLimits {
    /// Page length at which the source is assumed to have truncated.
    pub page_cap: usize,
    /// Hard ceiling on pages fetched for one window.
    pub max_pages: usize,
}

/// Projects belonging to one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationFilter {
    pub client: String,
    pub project_ids: BTreeSet<i64>,
}

impl AssociationFilter {
    pub fn admits(&self, project_id: Option<i64>) -> bool {
        project_id.is_some_and(|id| self.project_ids.contains(&id))
    }
}

pub fn resolve_association(
    source: &dyn RecordSource,
    client_name: &str,
) -> Result<AssociationFilter> {
    let wanted = client_name.trim();
    let client = source
        .clients()?
        .into_iter()
        .find(|c| c.name.trim() == wanted)
        .ok_or_else(|| SyncError::UnknownAssociation(wanted.to_string()))?;
    let project_ids = source
        .projects()?
        .into_iter()
        .filter(|p| p.client_id == Some(client.id))
        .map(|p| p.id)
        .collect();
    Ok(AssociationFilter {
        client: client.name,
        project_ids,
    })
}

/// Drain `[start, end)` lazily, page by page.
pub fn fetch<'a>(
    source: &'a dyn RecordSource,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    filter: Option<&'a AssociationFilter>,
    limits: PaginationLimits,
) -> EntryStream<'a> {
    EntryStream {
        source,
        filter,
        limits,
        cursor: start,
        window_end: end,
        buffer: VecDeque::new(),
        seen: HashSet::new(),
        pages: 0,
        exhausted: start >= end,
        pending_error: None,
    }
}

/// Watermark-resumed pagination over one window.
///
/// The source has no continuation token, so after a full page the next query
/// starts at the latest `start` seen in that page, inclusive. The overlap is
/// absorbed by the set of ids already seen. The stream fails instead of
/// looping when the page ceiling is hit or a full page brings no new ids.
pub struct EntryStream<'a> {
    source: &'a dyn RecordSource,
    filter: Option<&'a AssociationFilter>,
    limits: PaginationLimits,
    cursor: DateTime<Utc>,
    window_end: DateTime<Utc>,
    buffer: VecDeque<RawRecord>,
    seen: HashSet<i64>,
    pages: usize,
    exhausted: bool,
    pending_error: Option<SyncError>,
}

impl EntryStream<'_> {
    fn fetch_next_page(&mut self) -> Result<()> {
        if self.pages >= self.limits.max_pages {
            self.exhausted = true;
            return Err(SyncError::PaginationRunaway {
                pages: self.pages,
                page_cap: self.limits.page_cap,
            }
            .into());
        }

        let page = self.source.fetch_window(self.cursor, self.window_end)?;
        self.pages += 1;
        let full = page.len() >= self.limits.page_cap;
        let mut watermark: Option<DateTime<Utc>> = None;
        let mut fresh = 0usize;
        let mut skipped_running = 0usize;

        for entry in page {
            watermark = Some(watermark.map_or(entry.start, |w| w.max(entry.start)));
            if !self.seen.insert(entry.id) {
                continue;
            }
            fresh += 1;
            let Some(record) = entry.into_record() else {
                skipped_running += 1;
                continue;
            };
            if self.filter.is_some_and(|f| !f.admits(record.project_id)) {
                continue;
            }
            self.buffer.push_back(record);
        }

        if skipped_running > 0 {
            logging::warn(
                "source",
                &[
                    ("page", self.pages.to_string()),
                    ("skipped_running", skipped_running.to_string()),
                ],
            );
        }

        if !full {
            self.exhausted = true;
            return Ok(());
        }

        match watermark {
            Some(next) if fresh > 0 => {
                let next = next.max(self.cursor);
                logging::info(
                    "source",
                    &[
                        ("page", self.pages.to_string()),
                        ("resume_at", next.to_rfc3339()),
                    ],
                );
                self.cursor = next;
                if self.cursor >= self.window_end {
                    self.exhausted = true;
                }
            }
            _ => {
                self.exhausted = true;
                self.pending_error = Some(SyncError::PaginationStalled {
                    at: self.cursor.to_rfc3339(),
                });
            }
        }
        Ok(())
    }
}

impl Iterator for EntryStream<'_> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if let Some(err) = self.pending_error.take() {
                return Some(Err(err.into()));
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.fetch_next_page() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
    }
}
