//! The ledger sink: deduplicating, paginated recording of sales.
//!
//! Every sale goes through the same steps against the active page:
//!
//! 1. Skip it if its name is among the most recent `dedup_window` names.
//! 2. If the page holds `rollover_threshold` data rows, close it with a Total
//!    row (once) and move to the page named after today's date.
//! 3. Write the row at the first empty row, with a live margin formula.
//!
//! A batch is reversed before these steps run, so the last sale of the input
//! lands on the first open row.

use crate::clock::{Clock, SystemClock};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{BatchEntry, BatchReport, LedgerPolicy, RawSale, RecordOutcome, SaleRecord};
use crate::sheet::{self, PageSnapshot};
use crate::store::SheetStore;

pub struct Ledger<S> {
    store: S,
    policy: LedgerPolicy,
    clock: Box<dyn Clock>,
    active_page: Option<String>,
}

impl<S: SheetStore> Ledger<S> {
    /// Fails with [`LedgerError::InvalidPolicy`] when `policy` is unusable
    pub fn new(store: S, policy: LedgerPolicy) -> LedgerResult<Self> {
        Self::with_clock(store, policy, SystemClock)
    }

    pub fn with_clock(
        store: S,
        policy: LedgerPolicy,
        clock: impl Clock + 'static,
    ) -> LedgerResult<Self> {
        policy.validate()?;
        Ok(Self {
            store,
            policy,
            clock: Box::new(clock),
            active_page: None,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// Page currently accepting rows.
    ///
    /// Resolved once from the store: the last ledger page in store order,
    /// or the default page, which is created when missing.
    pub async fn active_page(&mut self) -> LedgerResult<String> {
        if let Some(page) = &self.active_page {
            return Ok(page.clone());
        }

        let pages = self.store.list_pages().await?;
        let page = match pages
            .iter()
            .rev()
            .find(|p| sheet::is_ledger_page(p, &self.policy.default_page))
        {
            Some(page) => page.clone(),
            None => {
                let default_page = self.policy.default_page.clone();
                self.store.create_page(&default_page).await?;
                tracing::info!("Created default ledger page '{}'", default_page);
                default_page
            }
        };

        tracing::debug!("Active ledger page: {}", page);
        self.active_page = Some(page.clone());
        Ok(page)
    }

    /// Record one sale from its extracted fields.
    ///
    /// Fails with [`LedgerError::MalformedPrice`] or
    /// [`LedgerError::MalformedRecord`] before touching the store.
    pub async fn record_sale(&mut self, item_name: &str, price: &str) -> LedgerResult<RecordOutcome> {
        let sale = SaleRecord::parse(item_name, price)?;
        self.record(&sale).await
    }

    /// Record an already validated sale
    pub async fn record(&mut self, sale: &SaleRecord) -> LedgerResult<RecordOutcome> {
        let result = self.try_record(sale).await;
        if result.is_err() {
            // Re-resolve from the store on the next call
            self.active_page = None;
        }
        result
    }

    async fn try_record(&mut self, sale: &SaleRecord) -> LedgerResult<RecordOutcome> {
        let mut page = self.active_page().await?;
        let mut snapshot = self.store.read_page(&page).await?;

        if snapshot
            .recent_names(self.policy.dedup_window)
            .contains(&sale.item_name.as_str())
        {
            tracing::debug!("Skipping duplicate '{}' on {}", sale.item_name, page);
            return Ok(RecordOutcome::DuplicateSkipped { page });
        }

        if !snapshot.state(self.policy.rollover_threshold).accepts_rows() {
            self.close_page(&page, &snapshot).await?;
            let (next_page, next_snapshot) = self.roll_over().await?;
            page = next_page;
            snapshot = next_snapshot;
        }

        let row = snapshot.next_empty_row();
        let cells = sheet::sale_row(row, &sale.item_name, sale.price);
        self.store.write_row(&page, row, &cells).await?;

        tracing::info!(
            "Recorded '{}' ({}) on {} row {}",
            sale.item_name,
            sale.price,
            page,
            row
        );
        Ok(RecordOutcome::Written { page, row })
    }

    /// Append the Total row unless the page already has one
    async fn close_page(&self, page: &str, snapshot: &PageSnapshot) -> LedgerResult<()> {
        if snapshot.has_total() {
            return Ok(());
        }

        let row = snapshot.next_empty_row();
        let last_data_row = snapshot.last_data_row();
        self.store
            .write_row(page, row, &sheet::total_row(last_data_row))
            .await?;

        tracing::info!(
            "Closed page {} with Total row {} over {} data rows",
            page,
            row,
            snapshot.data_row_count()
        );
        Ok(())
    }

    /// Activate the page named after today's date, reusing it if it exists
    async fn roll_over(&mut self) -> LedgerResult<(String, PageSnapshot)> {
        let today = self.clock.today();
        let pages = self.store.list_pages().await?;
        let mut ordinal = 1;

        loop {
            let name = sheet::rollover_page_name(today, ordinal);
            ordinal += 1;

            if pages.contains(&name) {
                let snapshot = self.store.read_page(&name).await?;
                if snapshot.state(self.policy.rollover_threshold).accepts_rows() {
                    tracing::info!("Rolled over to existing page {}", name);
                    self.active_page = Some(name.clone());
                    return Ok((name, snapshot));
                }
                self.close_page(&name, &snapshot).await?;
                continue;
            }

            self.store.create_page(&name).await?;
            tracing::info!("Rolled over to new page {}", name);
            self.active_page = Some(name.clone());
            return Ok((name, PageSnapshot::default()));
        }
    }

    /// Record a batch of extracted sales, last one first.
    ///
    /// Records fail independently. The report holds one entry per input
    /// sale, in the order they were handled (reverse input order). Returns [`LedgerError::StoreUnavailable`] when every record
    /// that reached the store failed with a transient error, and stops at
    /// the first authentication failure.
    pub async fn record_batch(&mut self, sales: &[RawSale]) -> LedgerResult<BatchReport> {
        let mut report = BatchReport::default();
        let mut reached_store = 0;
        let mut transient_failures = 0;

        for raw in sales.iter().rev() {
            let sale = match SaleRecord::try_from(raw) {
                Ok(sale) => sale,
                Err(error) => {
                    tracing::warn!("Skipping malformed sale '{}': {}", raw.item_name, error);
                    report.entries.push(BatchEntry::Rejected {
                        item_name: raw.item_name.clone(),
                        error,
                    });
                    continue;
                }
            };

            reached_store += 1;
            match self.record(&sale).await {
                Ok(outcome) => report.entries.push(BatchEntry::Recorded {
                    item_name: sale.item_name,
                    outcome,
                }),
                Err(error @ LedgerError::Auth(_)) => return Err(error),
                Err(error) => {
                    if error.is_transient() {
                        transient_failures += 1;
                    }
                    tracing::warn!("Failed to record '{}': {}", sale.item_name, error);
                    report.entries.push(BatchEntry::Failed {
                        item_name: sale.item_name,
                        error,
                    });
                }
            }
        }

        if transient_failures > 0 && transient_failures == reached_store {
            tracing::error!(
                "Backing store unavailable, none of {} sales were recorded",
                transient_failures
            );
            return Err(LedgerError::StoreUnavailable {
                failed: transient_failures,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::MemoryStore;
    use crate::models::PageState;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn ledger_with(store: MemoryStore, policy: LedgerPolicy) -> Ledger<MemoryStore> {
        Ledger::with_clock(store, policy, FixedClock(date())).unwrap()
    }

    fn small_policy(threshold: usize) -> LedgerPolicy {
        LedgerPolicy {
            rollover_threshold: threshold,
            ..LedgerPolicy::default()
        }
    }

    async fn fill(ledger: &mut Ledger<MemoryStore>, prefix: &str, count: usize) {
        for i in 0..count {
            let outcome = ledger
                .record_sale(&format!("{}-{}", prefix, i), "1")
                .await
                .unwrap();
            assert!(matches!(outcome, RecordOutcome::Written { .. }));
        }
    }

    fn names(store: &MemoryStore, page: &str) -> Vec<String> {
        store
            .page_rows(page)
            .unwrap()
            .into_iter()
            .map(|row| row.get(2).cloned().unwrap_or_default())
            .collect()
    }

    #[tokio::test]
    async fn test_blue_jacket_on_empty_default_page() {
        let mut ledger = ledger_with(MemoryStore::new(), LedgerPolicy::default());

        let outcome = ledger.record_sale("Blue Jacket", "25.00").await.unwrap();
        assert_eq!(
            outcome,
            RecordOutcome::Written {
                page: "Sheet1".to_string(),
                row: 1
            }
        );

        let store = ledger.store();
        assert_eq!(store.page_names(), vec!["Sheet1".to_string()]);
        assert_eq!(store.value("Sheet1", 1, 'D'), Some(Decimal::from(25)));
        assert_eq!(store.value("Sheet1", 1, 'E'), Some(Decimal::from(20)));
        assert_eq!(names(store, "Sheet1"), vec!["Blue Jacket".to_string()]);
        assert_eq!(
            PageSnapshot::new(store.page_rows("Sheet1").unwrap()).state(50),
            PageState::Open
        );
    }

    #[tokio::test]
    async fn test_record_twice_writes_once() {
        let mut ledger = ledger_with(MemoryStore::with_page("Sheet1"), LedgerPolicy::default());

        ledger.record_sale("Blue Jacket", "25.00").await.unwrap();
        let second = ledger.record_sale("Blue Jacket", "25.00").await.unwrap();

        assert_eq!(
            second,
            RecordOutcome::DuplicateSkipped {
                page: "Sheet1".to_string()
            }
        );
        assert_eq!(ledger.store().rows_written(), 1);
    }

    #[tokio::test]
    async fn test_dedup_window_is_bounded() {
        let mut ledger = ledger_with(MemoryStore::with_page("Sheet1"), LedgerPolicy::default());
        fill(&mut ledger, "item", 11).await;

        // item-1..item-10 are the ten most recent names
        let recent = ledger.record_sale("item-1", "1").await.unwrap();
        assert!(matches!(recent, RecordOutcome::DuplicateSkipped { .. }));

        let old = ledger.record_sale("item-0", "1").await.unwrap();
        assert_eq!(
            old,
            RecordOutcome::Written {
                page: "Sheet1".to_string(),
                row: 12
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_price_writes_nothing() {
        let mut ledger = ledger_with(MemoryStore::with_page("Sheet1"), LedgerPolicy::default());

        let err = ledger.record_sale("Scarf", "abc").await.unwrap_err();
        assert!(matches!(err, LedgerError::MalformedPrice { .. }));

        let err = ledger.record_sale("", "10").await.unwrap_err();
        assert!(matches!(err, LedgerError::MalformedRecord(_)));

        assert_eq!(ledger.store().rows_written(), 0);
        assert!(ledger.store().page_rows("Sheet1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_item_named_total_does_not_close_page() {
        let mut ledger = ledger_with(MemoryStore::with_page("Sheet1"), LedgerPolicy::default());

        let err = ledger.record_sale("Total", "5").await.unwrap_err();
        assert!(matches!(err, LedgerError::MalformedRecord(_)));

        let outcome = ledger.record_sale("Hat", "3").await.unwrap();
        assert_eq!(
            outcome,
            RecordOutcome::Written {
                page: "Sheet1".to_string(),
                row: 1
            }
        );
        assert_eq!(ledger.store().page_names(), vec!["Sheet1".to_string()]);
    }

    #[tokio::test]
    async fn test_formula_like_name_is_stored_as_text() {
        let mut ledger = ledger_with(MemoryStore::with_page("Sheet1"), LedgerPolicy::default());

        ledger.record_sale("=1+1", "5").await.unwrap();
        let second = ledger.record_sale("=1+1", "5").await.unwrap();

        assert!(matches!(second, RecordOutcome::DuplicateSkipped { .. }));
        assert_eq!(names(ledger.store(), "Sheet1"), vec!["=1+1"]);
        assert_eq!(ledger.store().rows_written(), 1);
    }

    #[test]
    fn test_zero_threshold_is_rejected() {
        let result = Ledger::with_clock(
            MemoryStore::new(),
            small_policy(0),
            FixedClock(date()),
        );
        assert!(matches!(result, Err(LedgerError::InvalidPolicy(_))));
    }

    #[tokio::test]
    async fn test_rollover_at_threshold() {
        let mut ledger = ledger_with(MemoryStore::with_page("Sheet1"), LedgerPolicy::default());
        fill(&mut ledger, "item", 49).await;

        let fiftieth = ledger.record_sale("item-49", "1").await.unwrap();
        assert_eq!(
            fiftieth,
            RecordOutcome::Written {
                page: "Sheet1".to_string(),
                row: 50
            }
        );
        assert_eq!(ledger.store().pages_created(), 0);

        let fifty_first = ledger.record_sale("item-50", "1").await.unwrap();
        assert_eq!(
            fifty_first,
            RecordOutcome::Written {
                page: "Sheet_2024-06-01".to_string(),
                row: 1
            }
        );

        let store = ledger.store();
        assert_eq!(store.pages_created(), 1);
        assert_eq!(store.raw_cell("Sheet1", 51, 'C').as_deref(), Some("Total"));
        assert_eq!(
            store.raw_cell("Sheet1", 51, 'D').as_deref(),
            Some("=SUM(D1:D50)")
        );
        assert_eq!(store.value("Sheet1", 51, 'D'), Some(Decimal::from(50)));
        assert_eq!(store.value("Sheet1", 51, 'E'), Some(Decimal::from(40)));

        ledger.record_sale("item-51", "1").await.unwrap();
        let store = ledger.store();
        assert_eq!(store.pages_created(), 1);
        assert_eq!(store.page_rows("Sheet1").unwrap().len(), 51);
        assert_eq!(names(store, "Sheet_2024-06-01"), vec!["item-50", "item-51"]);
    }

    #[tokio::test]
    async fn test_batch_is_written_in_decreasing_order() {
        let mut ledger = ledger_with(MemoryStore::with_page("Sheet1"), LedgerPolicy::default());

        let report = ledger
            .record_batch(&[
                RawSale::new("A", "1"),
                RawSale::new("B", "2"),
                RawSale::new("C", "3"),
            ])
            .await
            .unwrap();

        assert_eq!(report.written(), 3);
        assert_eq!(names(ledger.store(), "Sheet1"), vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn test_margin_follows_price_edits() {
        let mut ledger = ledger_with(MemoryStore::with_page("Sheet1"), LedgerPolicy::default());
        ledger.record_sale("Blue Jacket", "25.00").await.unwrap();

        let store = ledger.store();
        assert!(store.set_cell("Sheet1", 1, 'D', "40"));
        assert_eq!(store.value("Sheet1", 1, 'E'), Some(Decimal::from(32)));
    }

    #[tokio::test]
    async fn test_same_day_rollover_reuses_page() {
        let store = MemoryStore::with_page("Sheet_2024-06-01");
        store.create_page("Sheet1").await.unwrap();
        for row in 1..=2 {
            store
                .write_row("Sheet1", row, &sheet::sale_row(row, &format!("old-{}", row), Decimal::ONE))
                .await
                .unwrap();
        }

        let mut ledger = ledger_with(store, small_policy(2));
        assert_eq!(ledger.active_page().await.unwrap(), "Sheet1");

        let outcome = ledger.record_sale("new", "5").await.unwrap();
        assert_eq!(
            outcome,
            RecordOutcome::Written {
                page: "Sheet_2024-06-01".to_string(),
                row: 1
            }
        );
        // Only the setup's create_page call
        assert_eq!(ledger.store().pages_created(), 1);
    }

    #[tokio::test]
    async fn test_second_rollover_on_same_day_gets_suffix() {
        let mut ledger = ledger_with(MemoryStore::with_page("Sheet1"), small_policy(2));
        fill(&mut ledger, "a", 2).await;
        fill(&mut ledger, "b", 2).await;
        ledger.record_sale("c-0", "1").await.unwrap();

        let store = ledger.store();
        assert_eq!(
            store.page_names(),
            vec!["Sheet1", "Sheet_2024-06-01", "Sheet_2024-06-01_2"]
        );
        assert_eq!(store.raw_cell("Sheet_2024-06-01", 3, 'C').as_deref(), Some("Total"));
        assert_eq!(names(store, "Sheet_2024-06-01_2"), vec!["c-0"]);
    }

    #[tokio::test]
    async fn test_closed_page_is_not_closed_again() {
        let store = MemoryStore::with_page("Sheet1");
        store
            .write_row("Sheet1", 1, &sheet::sale_row(1, "old", Decimal::ONE))
            .await
            .unwrap();
        store
            .write_row("Sheet1", 2, &sheet::total_row(1))
            .await
            .unwrap();

        let mut ledger = ledger_with(store, small_policy(1));
        ledger.record_sale("new", "2").await.unwrap();

        let store = ledger.store();
        assert_eq!(store.page_rows("Sheet1").unwrap().len(), 2);
        assert_eq!(names(store, "Sheet_2024-06-01"), vec!["new"]);
    }

    #[tokio::test]
    async fn test_resumes_on_last_ledger_page() {
        let store = MemoryStore::with_page("Sheet1");
        store.create_page("Sheet_2024-05-01").await.unwrap();
        store.create_page("Notes").await.unwrap();

        let mut ledger = ledger_with(store, LedgerPolicy::default());
        assert_eq!(ledger.active_page().await.unwrap(), "Sheet_2024-05-01");
    }

    #[tokio::test]
    async fn test_failed_writes_escalate_batch() {
        let store = MemoryStore::with_page("Sheet1");
        store.set_reject_writes(true);
        let mut ledger = ledger_with(store, LedgerPolicy::default());

        let err = ledger
            .record_batch(&[RawSale::new("A", "1"), RawSale::new("B", "2")])
            .await
            .unwrap_err();

        assert_eq!(err, LedgerError::StoreUnavailable { failed: 2 });
        assert!(err.is_transient());
        assert!(ledger.store().page_rows("Sheet1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_store_is_transient() {
        let store = MemoryStore::with_page("Sheet1");
        store.set_unavailable(true);
        let mut ledger = ledger_with(store, LedgerPolicy::default());

        let err = ledger.record_sale("A", "1").await.unwrap_err();
        assert!(matches!(err, LedgerError::TransientIo(_)));

        ledger.store().set_unavailable(false);
        let retried = ledger.record_sale("A", "1").await.unwrap();
        assert!(matches!(retried, RecordOutcome::Written { row: 1, .. }));
    }

    #[tokio::test]
    async fn test_batch_isolates_bad_records() {
        let mut ledger = ledger_with(MemoryStore::with_page("Sheet1"), LedgerPolicy::default());
        ledger.record_sale("B", "2").await.unwrap();

        let report = ledger
            .record_batch(&[
                RawSale::new("A", "1"),
                RawSale::new("Broken", "n/a"),
                RawSale::new("B", "2"),
                RawSale::new("C", "3"),
            ])
            .await
            .unwrap();

        assert_eq!(report.written(), 2);
        assert_eq!(report.duplicates(), 1);
        assert_eq!(report.rejected(), 1);
        assert_eq!(report.failed(), 0);
        assert_eq!(names(ledger.store(), "Sheet1"), vec!["B", "C", "A"]);
    }
}
