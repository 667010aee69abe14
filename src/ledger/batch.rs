use crate::error::SyncError;
use crate::logging;
use crate::sheets::{CellWrite, SheetStore};
use anyhow::Result;

/// Write-behind buffer of staged cell updates for one sheet.
///
/// Cells are pushed to the store once `threshold` is reached and again on
/// [`WriteBuffer::flush`], which callers must invoke when the sheet is done.
#[derive(Debug)]
pub struct WriteBuffer {
    sheet: String,
    threshold: usize,
    pending: Vec<CellWrite>,
    batches: usize,
    cells_written: usize,
}

impl WriteBuffer {
    pub fn new(sheet: &str, threshold: usize) -> Self {
        Self {
            sheet: sheet.to_string(),
            threshold: threshold.max(1),
            pending: Vec::new(),
            batches: 0,
            cells_written: 0,
        }
    }

    pub fn stage(&mut self, cells: impl IntoIterator<Item = CellWrite>) {
        self.pending.extend(cells);
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn cells_written(&self) -> usize {
        self.cells_written
    }

    pub fn flush_if_full(&mut self, store: &mut dyn SheetStore) -> Result<bool> {
        if self.pending.len() < self.threshold {
            return Ok(false);
        }
        self.flush(store)?;
        Ok(true)
    }

    /// Send everything staged. A failed write is surfaced as-is; earlier
    /// batches stay written.
    pub fn flush(&mut self, store: &mut dyn SheetStore) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let cells = std::mem::take(&mut self.pending);
        store
            .write_cells(&self.sheet, &cells)
            .map_err(|err| match err.downcast::<SyncError>() {
                Ok(sync) => sync,
                Err(other) => SyncError::WriteFailed {
                    sheet: self.sheet.clone(),
                    reason: format!("{other:#}"),
                },
            })?;
        self.batches += 1;
        self.cells_written += cells.len();
        logging::info(
            "flush",
            &[
                ("sheet", self.sheet.clone()),
                ("batch", self.batches.to_string()),
                ("cells", cells.len().to_string()),
            ],
        );
        Ok(cells.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::workbook::Workbook;

    #[test]
    fn flushes_when_threshold_is_reached() {
        let mut book = Workbook::in_memory();
        book.worksheet("Jan", 100, 7).expect("sheet");
        let mut buffer = WriteBuffer::new("Jan", 3);

        buffer.stage([CellWrite::new(2, 1, "a"), CellWrite::new(2, 2, "b")]);
        assert!(!buffer.flush_if_full(&mut book).expect("no flush"));
        assert_eq!(book.write_calls(), 0);

        buffer.stage([CellWrite::new(2, 3, "c")]);
        assert!(buffer.flush_if_full(&mut book).expect("flush"));
        assert_eq!(book.write_calls(), 1);
        assert_eq!(buffer.flush(&mut book).expect("nothing left"), 0);
        assert_eq!(book.cell("Jan", 2, 3), Some("c"));
    }

    #[test]
    fn final_flush_sends_remainder_and_empty_flush_is_free() {
        let mut book = Workbook::in_memory();
        book.worksheet("Jan", 100, 7).expect("sheet");
        let mut buffer = WriteBuffer::new("Jan", 500);
        buffer.stage([CellWrite::new(5, 1, "x")]);
        assert_eq!(buffer.flush(&mut book).expect("flush"), 1);
        assert_eq!(buffer.flush(&mut book).expect("noop"), 0);
        assert_eq!(book.write_calls(), 1);
        assert_eq!((buffer.batches(), buffer.cells_written()), (1, 1));
    }

    #[test]
    fn store_failure_becomes_write_failed() {
        let mut book = Workbook::in_memory();
        let mut buffer = WriteBuffer::new("Missing", 1);
        buffer.stage([CellWrite::new(2, 1, "x")]);
        let err = buffer.flush(&mut book).expect_err("no such sheet");
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::WriteFailed { sheet, .. }) if sheet == "Missing"
        ));
    }
}
