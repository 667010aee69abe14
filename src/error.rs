use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(
        "time entry {id}: recomputed duration {computed}s does not match reported duration {reported}s"
    )]
    DurationMismatch { id: i64, computed: i64, reported: i64 },
    #[error("sheet `{sheet}` header {cell}: expected `{expected}`, found `{found}`")]
    HeaderMismatch {
        sheet: String,
        cell: String,
        expected: String,
        found: String,
    },
    #[error("sheet `{sheet}`: external id {id} appears on rows {first_row} and {second_row}")]
    DuplicateExternalId {
        sheet: String,
        id: i64,
        first_row: u32,
        second_row: u32,
    },
    #[error("record source never returned a short page after {pages} pages of {page_cap}")]
    PaginationRunaway { pages: usize, page_cap: usize },
    #[error("record source resume point did not advance past {at}")]
    PaginationStalled { at: String },
    #[error("no client named `{0}` in the record source")]
    UnknownAssociation(String),
    #[error("batched write to sheet `{sheet}` failed: {reason}")]
    WriteFailed { sheet: String, reason: String },
    #[error("config invalid: {0}")]
    InvalidConfig(String),
}
