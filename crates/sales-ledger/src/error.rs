//! Error taxonomy for the ledger sink and its backing store.

use thiserror::Error;

/// Failure reported by a [`SheetStore`](crate::store::SheetStore) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Network failure, rate limit or service error. Retrying may succeed.
    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    /// Credentials were missing, expired or refused
    #[error("Backing store authentication failed: {0}")]
    Auth(String),

    /// The store understood the request and refused it
    #[error("Backing store rejected request: {0}")]
    Rejected(String),
}

/// Errors surfaced by [`Ledger`](crate::Ledger) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Credential acquisition or refresh failed. Fatal for the run.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A remote call failed. The whole `record_sale` call may be retried.
    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    /// The price could not be parsed as a decimal amount
    #[error("Malformed price {raw:?} for item {item_name:?}")]
    MalformedPrice { item_name: String, raw: String },

    /// A required field of the record is missing
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// The ledger was configured with values it cannot work with
    #[error("Invalid ledger policy: {0}")]
    InvalidPolicy(String),

    /// Every write attempted in a batch failed against the store
    #[error("Backing store unavailable for the whole batch ({failed} records failed)")]
    StoreUnavailable { failed: usize },
}

impl LedgerError {
    /// True for failures where retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::TransientIo(_) | LedgerError::StoreUnavailable { .. }
        )
    }

    /// True for failures caused by the record itself rather than the store.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            LedgerError::MalformedPrice { .. } | LedgerError::MalformedRecord(_)
        )
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Auth(msg) => LedgerError::Auth(msg),
            StoreError::Unavailable(msg) | StoreError::Rejected(msg) => {
                LedgerError::TransientIo(msg)
            }
        }
    }
}

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
