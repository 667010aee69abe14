use crate::error::SyncError;
use crate::ledger::cells::{FieldKind, normalize};
use crate::logging;
use crate::sheets::{CellRange, CellWrite, SheetInfo, SheetStore, a1_cell};
use anyhow::Result;
use std::collections::BTreeMap;

/// First data row; row 1 holds the headers.
pub const FIRST_DATA_ROW: u32 = 2;

/// A positional row of a sheet with its current cell values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRow {
    pub row: u32,
    pub values: BTreeMap<String, String>,
}

impl DestinationRow {
    /// Values ordered by `headers`, missing ones empty.
    pub fn ordered(&self, headers: &[&str]) -> Vec<String> {
        headers
            .iter()
            .map(|h| self.values.get(*h).cloned().unwrap_or_default())
            .collect()
    }
}

/// External id → row cache for one sheet, built from a single range read.
#[derive(Debug, Clone)]
pub struct DestinationIndex {
    sheet: String,
    rows: BTreeMap<i64, DestinationRow>,
    next_append_row: u32,
}

impl DestinationIndex {
    pub fn empty(sheet: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            rows: BTreeMap::new(),
            next_append_row: FIRST_DATA_ROW,
        }
    }

    pub fn load(
        store: &dyn SheetStore,
        sheet: &SheetInfo,
        headers: &[&str],
        id_header: &str,
        marker: &str,
    ) -> Result<Self> {
        let mut index = Self::empty(&sheet.title);
        if sheet.row_count < FIRST_DATA_ROW || headers.is_empty() {
            return Ok(index);
        }
        let range = CellRange::new(FIRST_DATA_ROW, 1, sheet.row_count, headers.len() as u32);
        let grid = store.read_range(&sheet.title, range)?;

        let mut highest_populated: Option<u32> = None;
        for (offset, cells) in grid.into_iter().enumerate() {
            let row = FIRST_DATA_ROW + offset as u32;
            if cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            highest_populated = Some(row);

            let values: BTreeMap<String, String> = headers
                .iter()
                .map(|h| h.to_string())
                .zip(cells)
                .collect();
            let raw_id = values.get(id_header).map(|v| v.trim()).unwrap_or("");
            if raw_id.is_empty() {
                continue;
            }
            let Ok(id) = normalize(FieldKind::Integer, raw_id, marker).parse::<i64>() else {
                logging::warn(
                    "index",
                    &[
                        ("sheet", sheet.title.clone()),
                        ("row", row.to_string()),
                        ("reason", "non-integer id cell left untouched".to_string()),
                    ],
                );
                continue;
            };
            if let Some(first) = index.rows.get(&id) {
                return Err(SyncError::DuplicateExternalId {
                    sheet: sheet.title.clone(),
                    id,
                    first_row: first.row,
                    second_row: row,
                }
                .into());
            }
            index.rows.insert(id, DestinationRow { row, values });
        }

        if let Some(row) = highest_populated {
            index.next_append_row = row + 1;
        }
        Ok(index)
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn get(&self, id: i64) -> Option<&DestinationRow> {
        self.rows.get(&id)
    }

    pub fn indexed_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn next_append_row(&self) -> u32 {
        self.next_append_row
    }

    /// Reserve the next append position for `id`. The cursor only moves
    /// forward and never lands on a row already in the index.
    pub fn claim_append_row(&mut self, id: i64, values: BTreeMap<String, String>) -> u32 {
        let row = self.next_append_row;
        self.next_append_row += 1;
        self.rows.insert(id, DestinationRow { row, values });
        row
    }

    /// Keep the cache in step with a staged cell update.
    pub fn record_update(&mut self, id: i64, header: &str, value: String) {
        if let Some(existing) = self.rows.get_mut(&id) {
            existing.values.insert(header.to_string(), value);
        }
    }
}

/// Fill empty header cells of row 1 and reject any that hold something else.
/// Nothing is written unless every existing header matches.
pub fn setup_header(
    store: &mut dyn SheetStore,
    sheet: &SheetInfo,
    headers: &[&str],
) -> Result<usize> {
    if headers.is_empty() {
        return Ok(0);
    }
    if (sheet.col_count as usize) < headers.len() {
        anyhow::bail!(
            "sheet `{}` has {} columns but its header needs {}",
            sheet.title,
            sheet.col_count,
            headers.len()
        );
    }
    let range = CellRange::new(1, 1, 1, headers.len() as u32);
    let current = store
        .read_range(&sheet.title, range)?
        .into_iter()
        .next()
        .unwrap_or_default();

    let mut missing = Vec::new();
    for (offset, expected) in headers.iter().enumerate() {
        let col = offset as u32 + 1;
        let found = current.get(offset).map(|v| v.trim()).unwrap_or("");
        if found.is_empty() {
            missing.push(CellWrite::new(1, col, *expected));
        } else if found != *expected {
            return Err(SyncError::HeaderMismatch {
                sheet: sheet.title.clone(),
                cell: a1_cell(1, col),
                expected: expected.to_string(),
                found: found.to_string(),
            }
            .into());
        }
    }

    if !missing.is_empty() {
        store.write_cells(&sheet.title, &missing)?;
    }
    Ok(missing.len())
}
