//! Backing store seam for the ledger.
//!
//! The ledger only needs four primitives from a spreadsheet: list and create
//! pages, read a page's `A:E` values, and overwrite a single row. Cells are
//! typed: text is stored verbatim, numbers independently of the sheet's
//! locale, and formulas as live formulas.

use crate::error::StoreError;
use crate::sheet::{Cell, PageSnapshot, ROW_WIDTH};

/// Spreadsheet operations the ledger is built on.
///
/// Implementations are expected to be used by a single writer; the ledger
/// awaits every call before issuing the next one.
#[allow(async_fn_in_trait)]
pub trait SheetStore {
    /// Page titles in store order
    async fn list_pages(&self) -> Result<Vec<String>, StoreError>;

    /// Create an empty page. Creating an existing page is an error.
    async fn create_page(&self, name: &str) -> Result<(), StoreError>;

    /// Displayed values of columns A through E, one entry per row from row 1
    async fn read_page(&self, page: &str) -> Result<PageSnapshot, StoreError>;

    /// Overwrite `A{row}:E{row}` in a single request
    async fn write_row(
        &self,
        page: &str,
        row: usize,
        cells: &[Cell; ROW_WIDTH],
    ) -> Result<(), StoreError>;
}
