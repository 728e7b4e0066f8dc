use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{LedgerError, LedgerResult};
use crate::sheet::TOTAL_LABEL;

/// Item name and price as extracted from a sale email, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSale {
    pub item_name: String,
    pub price: String,
}

impl RawSale {
    pub fn new(item_name: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            price: price.into(),
        }
    }
}

/// A validated sale ready to be written to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleRecord {
    pub item_name: String,
    pub price: Decimal,
}

impl SaleRecord {
    /// Validate an extracted sale.
    ///
    /// The item name is trimmed and must be non-empty. It may not be the
    /// label of the Total row, which marks a page as closed. The price goes
    /// through [`parse_price`].
    pub fn parse(item_name: &str, raw_price: &str) -> LedgerResult<Self> {
        let item_name = item_name.trim();
        if item_name.is_empty() {
            return Err(LedgerError::MalformedRecord(format!(
                "empty item name (price {:?})",
                raw_price
            )));
        }
        if item_name == TOTAL_LABEL {
            return Err(LedgerError::MalformedRecord(format!(
                "item name {:?} is reserved for the Total row",
                item_name
            )));
        }

        let price = parse_price(raw_price).ok_or_else(|| LedgerError::MalformedPrice {
            item_name: item_name.to_string(),
            raw: raw_price.to_string(),
        })?;

        Ok(Self {
            item_name: item_name.to_string(),
            price,
        })
    }

    /// `price - price / 5`, the value the margin formula evaluates to
    pub fn margin(&self) -> Decimal {
        self.price - self.price / Decimal::from(5)
    }
}

impl TryFrom<&RawSale> for SaleRecord {
    type Error = LedgerError;

    fn try_from(raw: &RawSale) -> LedgerResult<Self> {
        SaleRecord::parse(&raw.item_name, &raw.price)
    }
}

/// Parse a price such as `€ 25,00`, `"12.50"` or `7`.
///
/// Currency symbols, quotes and whitespace are dropped. A lone comma is
/// read as the decimal separator; with both `.` and `,` present the comma is
/// a thousands separator.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | '£' | '"' | '\'' | '\u{a0}') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.contains('.'), cleaned.matches(',').count()) {
        (false, 1) => cleaned.replace(',', "."),
        (true, _) => cleaned.replace(',', ""),
        _ => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}

/// Policy values for a ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPolicy {
    /// How many of the most recent item names are checked for duplicates
    pub dedup_window: usize,
    /// Data rows at which a page is considered full
    pub rollover_threshold: usize,
    /// Name of the first page of the ledger
    pub default_page: String,
}

impl LedgerPolicy {
    /// Reject values the ledger cannot work with
    pub fn validate(&self) -> LedgerResult<()> {
        if self.rollover_threshold == 0 {
            return Err(LedgerError::InvalidPolicy(
                "rollover_threshold must be at least 1".to_string(),
            ));
        }
        if self.default_page.trim().is_empty() {
            return Err(LedgerError::InvalidPolicy(
                "default_page must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            dedup_window: 10,
            rollover_threshold: 50,
            default_page: "Sheet1".to_string(),
        }
    }
}

/// Lifecycle of a ledger page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Empty,
    Open,
    /// Full, but the Total row has not been written yet
    Closing,
    Closed,
}

impl PageState {
    pub fn accepts_rows(self) -> bool {
        matches!(self, PageState::Empty | PageState::Open)
    }
}

/// What happened to a single sale handed to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Written { page: String, row: usize },
    DuplicateSkipped { page: String },
}

/// Per-record result inside a [`BatchReport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEntry {
    Recorded {
        item_name: String,
        outcome: RecordOutcome,
    },
    /// The record was unusable and nothing was written
    Rejected {
        item_name: String,
        error: LedgerError,
    },
    /// The store failed while handling the record
    Failed {
        item_name: String,
        error: LedgerError,
    },
}

/// Outcome of [`Ledger::record_batch`](crate::Ledger::record_batch), in write order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn written(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    BatchEntry::Recorded {
                        outcome: RecordOutcome::Written { .. },
                        ..
                    }
                )
            })
            .count()
    }

    pub fn duplicates(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    BatchEntry::Recorded {
                        outcome: RecordOutcome::DuplicateSkipped { .. },
                        ..
                    }
                )
            })
            .count()
    }

    pub fn rejected(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, BatchEntry::Rejected { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, BatchEntry::Failed { .. }))
            .count()
    }
}
