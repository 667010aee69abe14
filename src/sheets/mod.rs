pub mod google;
pub mod workbook;

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Properties of one worksheet as the store currently reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub title: String,
    pub row_count: u32,
    pub col_count: u32,
}

/// Inclusive, 1-based rectangle of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_row: u32,
    pub first_col: u32,
    pub last_row: u32,
    pub last_col: u32,
}

impl CellRange {
    pub fn new(first_row: u32, first_col: u32, last_row: u32, last_col: u32) -> Self {
        Self {
            first_row,
            first_col,
            last_row,
            last_col,
        }
    }

    pub fn rows(&self) -> usize {
        (self.last_row + 1).saturating_sub(self.first_row) as usize
    }

    pub fn cols(&self) -> usize {
        (self.last_col + 1).saturating_sub(self.first_col) as usize
    }

    pub fn a1(&self) -> String {
        format!(
            "{}:{}",
            a1_cell(self.first_row, self.first_col),
            a1_cell(self.last_row, self.last_col)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    pub row: u32,
    pub col: u32,
    pub value: String,
}

impl CellWrite {
    pub fn new(row: u32, col: u32, value: impl Into<String>) -> Self {
        Self {
            row,
            col,
            value: value.into(),
        }
    }
}

/// Row-oriented destination with batched, individually addressed cell writes.
pub trait SheetStore {
    /// Return the worksheet called `name`, creating it with the given
    /// capacity when it does not exist yet.
    fn worksheet(&mut self, name: &str, rows: u32, cols: u32) -> Result<SheetInfo>;

    /// Read `range` as a dense rectangle; cells the store has no value for
    /// come back as empty strings.
    fn read_range(&self, sheet: &str, range: CellRange) -> Result<Vec<Vec<String>>>;

    fn write_cells(&mut self, sheet: &str, cells: &[CellWrite]) -> Result<()>;
}

pub fn column_letters(col: u32) -> String {
    let mut n = col;
    let mut out = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        out.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

pub fn a1_cell(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row)
}

/// Sheet-qualified A1 reference, quoting the title as the Sheets API expects.
pub fn qualified_range(sheet: &str, a1: &str) -> String {
    format!("'{}'!{}", sheet.replace('\'', "''"), a1)
}

/// Pad or truncate a sparse value grid to exactly `range`'s shape.
pub fn dense_rectangle(mut values: Vec<Vec<String>>, range: CellRange) -> Vec<Vec<String>> {
    values.resize_with(range.rows(), Vec::new);
    for row in &mut values {
        row.resize(range.cols(), String::new());
    }
    values
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    GoogleSheet { url: String },
    LocalWorkbook { path: PathBuf },
}

impl Destination {
    pub fn parse(target: &str) -> Self {
        let trimmed = target.trim();
        if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
            Destination::GoogleSheet {
                url: trimmed.to_string(),
            }
        } else {
            Destination::LocalWorkbook {
                path: PathBuf::from(trimmed),
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            Destination::GoogleSheet { url } => url.clone(),
            Destination::LocalWorkbook { path } => path.display().to_string(),
        }
    }
}

pub fn open_destination(
    destination: &Destination,
    credentials: Option<&Path>,
) -> Result<Box<dyn SheetStore>> {
    match destination {
        Destination::GoogleSheet { url } => {
            let token = google::load_access_token(credentials)?;
            Ok(Box::new(google::GoogleSheets::open_by_url(url, token)?))
        }
        Destination::LocalWorkbook { path } => Ok(Box::new(workbook::Workbook::open(path)?)),
    }
}
