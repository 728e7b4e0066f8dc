//! Spreadsheet-backed sales ledger.
//!
//! Sales are appended to the active page of a spreadsheet, skipped when the
//! same item name appears among the most recent rows, and moved to a new
//! date-named page once the active one is full. Full pages are closed with
//! a Total row summing prices and margins.

pub mod clock;
pub mod error;
mod formula;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod sheet;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{LedgerError, LedgerResult, StoreError};
pub use ledger::Ledger;
pub use memory::MemoryStore;
pub use models::{
    parse_price, BatchEntry, BatchReport, LedgerPolicy, PageState, RawSale, RecordOutcome,
    SaleRecord,
};
pub use sheet::{Cell, PageSnapshot};
pub use store::SheetStore;
