//! In-process [`SheetStore`] used for dry runs and tests.
//!
//! Cells keep what was written, formulas included, and reads return
//! evaluated values the way a spreadsheet displays them. Text cells are
//! shown verbatim, even when they start with `=`.

use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::formula;
use crate::sheet::{Cell, PageSnapshot, ROW_WIDTH};
use crate::store::SheetStore;

#[derive(Debug, Clone, Default)]
struct Page {
    name: String,
    grid: Vec<Vec<Cell>>,
}

impl Page {
    fn display_rows(&self) -> Vec<Vec<String>> {
        let mut rows: Vec<Vec<String>> = self
            .grid
            .iter()
            .map(|row| {
                let mut cells: Vec<String> = row
                    .iter()
                    .map(|cell| display_value(&self.grid, cell))
                    .collect();
                while cells.last().is_some_and(|c| c.is_empty()) {
                    cells.pop();
                }
                cells
            })
            .collect();

        // Trailing blank rows are not part of the returned range
        while rows.last().is_some_and(|r| r.is_empty()) {
            rows.pop();
        }
        rows
    }
}

fn display_value(grid: &[Vec<Cell>], cell: &Cell) -> String {
    match cell {
        Cell::Formula(raw) => formula::evaluate(grid, raw)
            .map(|v| v.normalize().to_string())
            .unwrap_or_else(|| "#ERROR!".to_string()),
        other => other.entered(),
    }
}

/// Spreadsheet held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    pages: Mutex<Vec<Page>>,
    unavailable: AtomicBool,
    reject_writes: AtomicBool,
    pages_created: AtomicUsize,
    rows_written: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already contains an empty page named `name`
    pub fn with_page(name: &str) -> Self {
        let store = Self::new();
        store.lock().push(Page {
            name: name.to_string(),
            grid: Vec::new(),
        });
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Page>> {
        // A panic while holding the lock leaves plain data behind, still usable
        self.pages.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store switched offline".to_string(),
            ));
        }
        Ok(())
    }

    /// Make every call fail with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make row writes fail with [`StoreError::Unavailable`] while reads keep working
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn pages_created(&self) -> usize {
        self.pages_created.load(Ordering::SeqCst)
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written.load(Ordering::SeqCst)
    }

    pub fn page_names(&self) -> Vec<String> {
        self.lock().iter().map(|p| p.name.clone()).collect()
    }

    /// Displayed values of a page, or `None` if it does not exist
    pub fn page_rows(&self, page: &str) -> Option<Vec<Vec<String>>> {
        self.lock()
            .iter()
            .find(|p| p.name == page)
            .map(Page::display_rows)
    }

    /// Raw content of a cell (formulas unevaluated). `row` is 1-based, `col` a letter.
    pub fn raw_cell(&self, page: &str, row: usize, col: char) -> Option<String> {
        let idx = column_offset(col)?;
        self.lock()
            .iter()
            .find(|p| p.name == page)?
            .grid
            .get(row.checked_sub(1)?)?
            .get(idx)
            .map(Cell::entered)
    }

    /// Numeric value of a cell, evaluating formulas
    pub fn value(&self, page: &str, row: usize, col: char) -> Option<Decimal> {
        let idx = column_offset(col)?;
        let pages = self.lock();
        let grid = &pages.iter().find(|p| p.name == page)?.grid;
        match grid.get(row.checked_sub(1)?)?.get(idx)? {
            Cell::Formula(raw) => formula::evaluate(grid, raw),
            Cell::Number(n) => Some(*n),
            Cell::Text(text) => text.trim().parse().ok(),
            Cell::Empty => None,
        }
    }

    /// Overwrite one cell as a user editing the sheet would
    pub fn set_cell(&self, page: &str, row: usize, col: char, value: &str) -> bool {
        let (Some(idx), Some(row_idx)) = (column_offset(col), row.checked_sub(1)) else {
            return false;
        };
        let mut pages = self.lock();
        let Some(target) = pages.iter_mut().find(|p| p.name == page) else {
            return false;
        };
        ensure_cell(&mut target.grid, row_idx, idx);
        target.grid[row_idx][idx] = Cell::user_entered(value);
        true
    }
}

fn column_offset(col: char) -> Option<usize> {
    col.is_ascii_alphabetic()
        .then(|| (col.to_ascii_uppercase() as u8 - b'A') as usize)
}

fn ensure_cell(grid: &mut Vec<Vec<Cell>>, row: usize, col: usize) {
    if grid.len() <= row {
        grid.resize_with(row + 1, Vec::new);
    }
    if grid[row].len() <= col {
        grid[row].resize_with(col + 1, Cell::default);
    }
}

impl SheetStore for MemoryStore {
    async fn list_pages(&self) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        Ok(self.page_names())
    }

    async fn create_page(&self, name: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut pages = self.lock();
        if pages.iter().any(|p| p.name == name) {
            return Err(StoreError::Rejected(format!(
                "A sheet with the name \"{}\" already exists",
                name
            )));
        }
        pages.push(Page {
            name: name.to_string(),
            grid: Vec::new(),
        });
        self.pages_created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_page(&self, page: &str) -> Result<PageSnapshot, StoreError> {
        self.check_available()?;
        self.page_rows(page)
            .map(PageSnapshot::new)
            .ok_or_else(|| StoreError::Rejected(format!("Unable to parse range: {}", page)))
    }

    async fn write_row(
        &self,
        page: &str,
        row: usize,
        cells: &[Cell; ROW_WIDTH],
    ) -> Result<(), StoreError> {
        self.check_available()?;
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store refusing writes".to_string(),
            ));
        }
        let Some(row_idx) = row.checked_sub(1) else {
            return Err(StoreError::Rejected("row numbers start at 1".to_string()));
        };

        let mut pages = self.lock();
        let Some(target) = pages.iter_mut().find(|p| p.name == page) else {
            return Err(StoreError::Rejected(format!("Unable to parse range: {}", page)));
        };
        ensure_cell(&mut target.grid, row_idx, ROW_WIDTH - 1);
        for (idx, value) in cells.iter().enumerate() {
            target.grid[row_idx][idx] = value.clone();
        }
        self.rows_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
