use crate::sheets::{CellRange, CellWrite, SheetInfo, SheetStore, dense_rectangle};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorksheetData {
    title: String,
    row_count: u32,
    col_count: u32,
    #[serde(default)]
    rows: Vec<Vec<String>>,
}

impl WorksheetData {
    fn info(&self) -> SheetInfo {
        SheetInfo {
            title: self.title.clone(),
            row_count: self.row_count,
            col_count: self.col_count,
        }
    }

    fn set(&mut self, row: u32, col: u32, value: &str) {
        let (r, c) = ((row - 1) as usize, (col - 1) as usize);
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let cells = &mut self.rows[r];
        if cells.len() <= c {
            cells.resize(c + 1, String::new());
        }
        cells[c] = value.to_string();
        // Writes past the grid grow it, as hosted spreadsheets do.
        self.row_count = self.row_count.max(row);
        self.col_count = self.col_count.max(col);
    }

    fn get(&self, row: u32, col: u32) -> &str {
        self.rows
            .get((row - 1) as usize)
            .and_then(|cells| cells.get((col - 1) as usize))
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorkbookData {
    #[serde(default)]
    sheets: Vec<WorksheetData>,
}

/// Spreadsheet kept in a local JSON file, or purely in memory.
#[derive(Debug, Default)]
pub struct Workbook {
    path: Option<PathBuf>,
    data: WorkbookData,
    write_calls: usize,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse workbook {}", path.display()))?
        } else {
            WorkbookData::default()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            data,
            write_calls: 0,
        })
    }

    fn sheet(&self, title: &str) -> Option<&WorksheetData> {
        self.data.sheets.iter().find(|s| s.title == title)
    }

    fn sheet_mut(&mut self, title: &str) -> Result<&mut WorksheetData> {
        self.data
            .sheets
            .iter_mut()
            .find(|s| s.title == title)
            .with_context(|| format!("worksheet `{title}` not found"))
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
        let data = serde_json::to_string_pretty(&self.data)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .with_context(|| format!("failed to stage write in {}", parent.display()))?;
        tmp.write_all(format!("{data}\n").as_bytes())?;
        tmp.persist(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Inspection helpers for tests.
#[cfg(test)]
impl Workbook {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Number of `write_cells` calls served so far.
    pub fn write_calls(&self) -> usize {
        self.write_calls
    }

    pub fn sheet_titles(&self) -> Vec<String> {
        self.data.sheets.iter().map(|s| s.title.clone()).collect()
    }

    pub fn cell(&self, sheet: &str, row: u32, col: u32) -> Option<&str> {
        self.sheet(sheet).map(|s| s.get(row, col))
    }
}

impl SheetStore for Workbook {
    fn worksheet(&mut self, name: &str, rows: u32, cols: u32) -> Result<SheetInfo> {
        if let Some(existing) = self.sheet(name) {
            return Ok(existing.info());
        }
        let sheet = WorksheetData {
            title: name.to_string(),
            row_count: rows,
            col_count: cols,
            rows: Vec::new(),
        };
        let info = sheet.info();
        self.data.sheets.push(sheet);
        self.save()?;
        Ok(info)
    }

    fn read_range(&self, sheet: &str, range: CellRange) -> Result<Vec<Vec<String>>> {
        let data = self
            .sheet(sheet)
            .with_context(|| format!("worksheet `{sheet}` not found"))?;
        let values = (range.first_row..=range.last_row)
            .map(|row| {
                (range.first_col..=range.last_col)
                    .map(|col| data.get(row, col).to_string())
                    .collect()
            })
            .collect();
        Ok(dense_rectangle(values, range))
    }

    fn write_cells(&mut self, sheet: &str, cells: &[CellWrite]) -> Result<()> {
        let data = self.sheet_mut(sheet)?;
        for cell in cells {
            if cell.row == 0 || cell.col == 0 {
                anyhow::bail!("cell address must be 1-based, got ({}, {})", cell.row, cell.col);
            }
            data.set(cell.row, cell.col, &cell.value);
        }
        self.write_calls += 1;
        self.save()
    }
}
