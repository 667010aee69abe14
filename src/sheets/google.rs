use crate::error::SyncError;
use crate::sheets::{
    CellRange, CellWrite, SheetInfo, SheetStore, a1_cell, dense_rectangle, qualified_range,
};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const REQUEST_TIMEOUT_SECS: u64 = 45;

pub fn spreadsheet_id_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/spreadsheets/d/")?;
    let id = rest.split(['/', '?', '#']).next()?.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

fn token_from_credentials(raw: &str) -> Option<String> {
    let json: Value = serde_json::from_str(raw).ok()?;
    ["access_token", "token"]
        .iter()
        .find_map(|key| json.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToOwned::to_owned)
}

/// Bearer token for the Sheets API: `TOGGL_SYNC_SHEETS_TOKEN` wins, otherwise
/// the `access_token` field of the credentials file.
pub fn load_access_token(credentials: Option<&Path>) -> Result<String> {
    if let Ok(token) = env::var("TOGGL_SYNC_SHEETS_TOKEN") {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }
    let Some(path) = credentials else {
        anyhow::bail!("no sheets credentials: pass --credentials or set TOGGL_SYNC_SHEETS_TOKEN");
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read credentials {}", path.display()))?;
    token_from_credentials(&raw)
        .with_context(|| format!("credentials {} carry no access_token", path.display()))
}

/// Numeric id and current row count of one worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SheetGrid {
    sheet_id: i64,
    row_count: u32,
}

fn sheet_entries(json: &Value) -> Vec<(SheetGrid, SheetInfo)> {
    json.get("sheets")
        .and_then(Value::as_array)
        .map(|sheets| {
            sheets
                .iter()
                .filter_map(|sheet| {
                    let props = sheet.get("properties")?;
                    let grid = props.get("gridProperties");
                    let info = SheetInfo {
                        title: props.get("title")?.as_str()?.to_string(),
                        row_count: grid
                            .and_then(|g| g.get("rowCount"))
                            .and_then(Value::as_u64)
                            .unwrap_or(0) as u32,
                        col_count: grid
                            .and_then(|g| g.get("columnCount"))
                            .and_then(Value::as_u64)
                            .unwrap_or(0) as u32,
                    };
                    let grid = SheetGrid {
                        sheet_id: props.get("sheetId").and_then(Value::as_i64).unwrap_or(0),
                        row_count: info.row_count,
                    };
                    Some((grid, info))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn added_sheet_id(json: &Value) -> Option<i64> {
    json.pointer("/replies/0/addSheet/properties/sheetId")
        .and_then(Value::as_i64)
}

/// Rows to append so that `needed` fits, if any.
fn rows_missing(grid: SheetGrid, needed: u32) -> Option<u32> {
    needed.checked_sub(grid.row_count).filter(|n| *n > 0)
}

fn value_grid(json: &Value) -> Vec<Vec<String>> {
    json.get("valueRanges")
        .and_then(Value::as_array)
        .and_then(|ranges| ranges.first())
        .and_then(|range| range.get("values"))
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()
                        .map(|cells| {
                            cells
                                .iter()
                                .map(|cell| match cell {
                                    Value::String(s) => s.clone(),
                                    Value::Null => String::new(),
                                    other => other.to_string(),
                                })
                                .collect()
                        })
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Google Sheets v4 over plain REST.
pub struct GoogleSheets {
    client: Client,
    token: String,
    spreadsheet_id: String,
    grids: HashMap<String, SheetGrid>,
}

impl GoogleSheets {
    pub fn open_by_url(url: &str, token: String) -> Result<Self> {
        let spreadsheet_id = spreadsheet_id_from_url(url)
            .with_context(|| format!("not a Google Sheets URL: {url}"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            token,
            spreadsheet_id,
            grids: HashMap::new(),
        })
    }

    fn base(&self) -> String {
        format!("{SHEETS_API_BASE}/{}", self.spreadsheet_id)
    }

    fn list_sheets(&mut self) -> Result<Vec<SheetInfo>> {
        let response = self
            .client
            .get(self.base())
            .bearer_auth(&self.token)
            .query(&[("fields", "sheets.properties")])
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!("sheets metadata call failed with status {}", response.status());
        }
        let json: Value = response.json()?;
        let entries = sheet_entries(&json);
        self.grids = entries
            .iter()
            .map(|(grid, info)| (info.title.clone(), *grid))
            .collect();
        Ok(entries.into_iter().map(|(_, info)| info).collect())
    }

    fn batch_update(&self, payload: &Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}:batchUpdate", self.base()))
            .bearer_auth(&self.token)
            .json(payload)
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!("sheets batchUpdate failed with status {}", response.status());
        }
        Ok(response.json()?)
    }

    /// Hosted grids do not grow on write, so append rows before writing below
    /// the last one.
    fn ensure_rows(&mut self, sheet: &str, needed: u32) -> Result<()> {
        if !self.grids.contains_key(sheet) {
            self.list_sheets()?;
        }
        let grid = *self
            .grids
            .get(sheet)
            .with_context(|| format!("worksheet `{sheet}` not found"))?;
        let Some(length) = rows_missing(grid, needed) else {
            return Ok(());
        };
        let payload = serde_json::json!({
            "requests": [{
                "appendDimension": {
                    "sheetId": grid.sheet_id,
                    "dimension": "ROWS",
                    "length": length,
                }
            }]
        });
        self.batch_update(&payload)
            .with_context(|| format!("growing worksheet `{sheet}` to {needed} rows failed"))?;
        self.grids.insert(
            sheet.to_string(),
            SheetGrid {
                row_count: needed,
                ..grid
            },
        );
        Ok(())
    }
}

impl SheetStore for GoogleSheets {
    fn worksheet(&mut self, name: &str, rows: u32, cols: u32) -> Result<SheetInfo> {
        if let Some(existing) = self.list_sheets()?.into_iter().find(|s| s.title == name) {
            return Ok(existing);
        }
        let payload = serde_json::json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": name,
                        "gridProperties": {"rowCount": rows, "columnCount": cols}
                    }
                }
            }]
        });
        let reply = self
            .batch_update(&payload)
            .with_context(|| format!("adding worksheet `{name}` failed"))?;
        if let Some(sheet_id) = added_sheet_id(&reply) {
            self.grids.insert(
                name.to_string(),
                SheetGrid {
                    sheet_id,
                    row_count: rows,
                },
            );
        }
        Ok(SheetInfo {
            title: name.to_string(),
            row_count: rows,
            col_count: cols,
        })
    }

    fn read_range(&self, sheet: &str, range: CellRange) -> Result<Vec<Vec<String>>> {
        let reference = qualified_range(sheet, &range.a1());
        let response = self
            .client
            .get(format!("{}/values:batchGet", self.base()))
            .bearer_auth(&self.token)
            .query(&[
                ("ranges", reference.as_str()),
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "FORMATTED_VALUE"),
            ])
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!("reading {reference} failed with status {}", response.status());
        }
        let json: Value = response.json()?;
        Ok(dense_rectangle(value_grid(&json), range))
    }

    fn write_cells(&mut self, sheet: &str, cells: &[CellWrite]) -> Result<()> {
        let Some(last_row) = cells.iter().map(|cell| cell.row).max() else {
            return Ok(());
        };
        self.ensure_rows(sheet, last_row)?;
        let data: Vec<Value> = cells
            .iter()
            .map(|cell| {
                serde_json::json!({
                    "range": qualified_range(sheet, &a1_cell(cell.row, cell.col)),
                    "values": [[cell.value]],
                })
            })
            .collect();
        let payload = serde_json::json!({
            "valueInputOption": "USER_ENTERED",
            "data": data,
        });
        let response = self
            .client
            .post(format!("{}/values:batchUpdate", self.base()))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()?;
        if !response.status().is_success() {
            return Err(SyncError::WriteFailed {
                sheet: sheet.to_string(),
                reason: format!("status {}", response.status()),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spreadsheet_id_is_taken_from_edit_url() {
        assert_eq!(
            spreadsheet_id_from_url("https://docs.google.com/spreadsheets/d/1AbC-xyz/edit#gid=0"),
            Some("1AbC-xyz".to_string())
        );
        assert_eq!(
            spreadsheet_id_from_url("https://docs.google.com/spreadsheets/d/1AbC?usp=sharing"),
            Some("1AbC".to_string())
        );
        assert_eq!(spreadsheet_id_from_url("https://example.com/sheet"), None);
    }

    #[test]
    fn credentials_token_field_is_read() {
        assert_eq!(
            token_from_credentials(r#"{"access_token":" ya29.abc "}"#),
            Some("ya29.abc".to_string())
        );
        assert_eq!(token_from_credentials(r#"{"type":"service_account"}"#), None);
    }

    #[test]
    fn sheet_entries_parse_grid_properties() {
        let json = serde_json::json!({
            "sheets": [
                {"properties": {"sheetId": 7, "title": "Jan", "gridProperties": {"rowCount": 1000, "columnCount": 20}}},
                {"properties": {"title": "Summary"}}
            ]
        });
        let entries = sheet_entries(&json);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1.row_count, 1000);
        assert_eq!(entries[0].0.sheet_id, 7);
        assert_eq!(entries[1].1.col_count, 0);
    }

    #[test]
    fn rows_are_appended_only_past_the_grid() {
        let grid = SheetGrid {
            sheet_id: 7,
            row_count: 1000,
        };
        assert_eq!(rows_missing(grid, 999), None);
        assert_eq!(rows_missing(grid, 1000), None);
        assert_eq!(rows_missing(grid, 1003), Some(3));
    }

    #[test]
    fn added_sheet_id_is_read_from_the_reply() {
        let reply = serde_json::json!({
            "replies": [{"addSheet": {"properties": {"sheetId": 42, "title": "Feb"}}}]
        });
        assert_eq!(added_sheet_id(&reply), Some(42));
        assert_eq!(added_sheet_id(&serde_json::json!({})), None);
    }

    #[test]
    fn value_grid_reads_first_range() {
        let json = serde_json::json!({
            "valueRanges": [{"range": "'Jan'!A2:G3", "values": [["2026-01-05", "100"], []]}]
        });
        let grid = value_grid(&json);
        assert_eq!(grid[0][1], "100");
        assert!(grid[1].is_empty());
    }
}
