//! Positional layout of a ledger page and the view the ledger reads back.
//!
//! Columns A and B are unused. Column C holds the item name, D the price and
//! E the margin formula. Row numbers are 1-based, as in A1 notation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::models::PageState;

pub const NAME_COLUMN: char = 'C';
pub const PRICE_COLUMN: char = 'D';
pub const MARGIN_COLUMN: char = 'E';

/// Label written in the name column of a page's closing row
pub const TOTAL_LABEL: &str = "Total";

/// Number of columns in a ledger row (A through E)
pub const ROW_WIDTH: usize = 5;

const NAME_INDEX: usize = 2;

/// Prefix of pages created by a rollover
pub const ROLLOVER_PREFIX: &str = "Sheet_";

fn quoted(page: &str) -> String {
    format!("'{}'", page.replace('\'', "''"))
}

/// Range covering every ledger column of a page, e.g. `'Sheet1'!A:E`
pub fn page_range(page: &str) -> String {
    format!("{}!A:E", quoted(page))
}

/// Range covering a single row, e.g. `'Sheet1'!A7:E7`
pub fn row_range(page: &str, row: usize) -> String {
    format!("{}!A{}:E{}", quoted(page), row, row)
}

/// `=D7-D7/5`: the margin of the row, recomputed whenever its price changes
pub fn margin_formula(row: usize) -> String {
    format!("={p}{row}-{p}{row}/5", p = PRICE_COLUMN, row = row)
}

/// `=SUM(D1:D50)`
pub fn sum_formula(column: char, last_row: usize) -> String {
    format!("=SUM({c}1:{c}{last})", c = column, last = last_row)
}

/// Content of one cell as sent to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Cell {
    #[default]
    Empty,
    /// Literal text, never read as a number, date or formula
    Text(String),
    Number(Decimal),
    Formula(String),
}

impl Cell {
    /// Interpret `input` the way the sheet does when a user types it
    pub fn user_entered(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else if trimmed.starts_with('=') {
            Cell::Formula(trimmed.to_string())
        } else if let Ok(n) = Decimal::from_str(trimmed) {
            Cell::Number(n)
        } else {
            Cell::Text(input.to_string())
        }
    }

    /// Contents as shown in the formula bar
    pub fn entered(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(text) => text.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Formula(formula) => formula.clone(),
        }
    }
}

/// Cells of a data row, in column order A..E
pub fn sale_row(row: usize, item_name: &str, price: Decimal) -> [Cell; ROW_WIDTH] {
    [
        Cell::Empty,
        Cell::Empty,
        Cell::Text(item_name.to_string()),
        Cell::Number(price),
        Cell::Formula(margin_formula(row)),
    ]
}

/// Cells of the Total row closing a page whose last data row is `last_row`
pub fn total_row(last_row: usize) -> [Cell; ROW_WIDTH] {
    [
        Cell::Empty,
        Cell::Empty,
        Cell::Text(TOTAL_LABEL.to_string()),
        Cell::Formula(sum_formula(PRICE_COLUMN, last_row)),
        Cell::Formula(sum_formula(MARGIN_COLUMN, last_row)),
    ]
}

/// Name of the `ordinal`-th page opened by a rollover on `date`.
///
/// The first is `Sheet_2024-06-01`, later ones on the same day get a
/// `_2`, `_3`... suffix.
pub fn rollover_page_name(date: NaiveDate, ordinal: usize) -> String {
    let base = format!("{}{}", ROLLOVER_PREFIX, date.format("%Y-%m-%d"));
    if ordinal <= 1 {
        base
    } else {
        format!("{}_{}", base, ordinal)
    }
}

/// True for the default page and for any page a rollover could have created
pub fn is_ledger_page(name: &str, default_page: &str) -> bool {
    if name == default_page {
        return true;
    }

    let Some(rest) = name.strip_prefix(ROLLOVER_PREFIX) else {
        return false;
    };
    let (date, suffix) = match rest.split_once('_') {
        Some((date, suffix)) => (date, Some(suffix)),
        None => (rest, None),
    };

    NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
        && suffix.map_or(true, |s| s.parse::<usize>().map_or(false, |n| n >= 2))
}

/// The rows of a page as read back from the store (displayed values)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    rows: Vec<Vec<String>>,
}

impl PageSnapshot {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    fn name_at(row: &[String]) -> Option<&str> {
        row.get(NAME_INDEX)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    fn is_total(row: &[String]) -> bool {
        Self::name_at(row) == Some(TOTAL_LABEL)
    }

    /// Rows holding a sale, i.e. a name that is not the Total label
    pub fn data_row_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| Self::name_at(r).is_some() && !Self::is_total(r))
            .count()
    }

    /// Whether one of the last two rows is the Total row
    pub fn has_total(&self) -> bool {
        self.rows
            .iter()
            .rev()
            .take(2)
            .any(|r| Self::is_total(r))
    }

    /// First row after everything already on the page
    pub fn next_empty_row(&self) -> usize {
        self.rows.len() + 1
    }

    /// Row number of the last sale on the page (0 when there is none)
    pub fn last_data_row(&self) -> usize {
        self.rows
            .iter()
            .rposition(|r| Self::name_at(r).is_some() && !Self::is_total(r))
            .map_or(0, |idx| idx + 1)
    }

    /// Up to `window` item names, most recent (bottom-most) first
    pub fn recent_names(&self, window: usize) -> Vec<&str> {
        self.rows
            .iter()
            .rev()
            .filter(|r| !Self::is_total(r))
            .filter_map(|r| Self::name_at(r))
            .take(window)
            .collect()
    }

    pub fn state(&self, threshold: usize) -> PageState {
        if self.has_total() {
            PageState::Closed
        } else if self.data_row_count() >= threshold {
            PageState::Closing
        } else if self.rows.is_empty() {
            PageState::Empty
        } else {
            PageState::Open
        }
    }
}
