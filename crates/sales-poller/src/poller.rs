//! One poll: find sale confirmations in the mailbox and record them.

use anyhow::{Context, Result};
use sales_ledger::{BatchEntry, BatchReport, Ledger, RawSale, SheetStore};

use crate::config::Config;
use crate::extract::extract_sale;
use crate::mailbox::Mailbox;
use crate::processed::ProcessedLog;

/// Counts gathered while reading the mailbox
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub matched: usize,
    pub already_processed: usize,
    pub completed: usize,
    pub fetch_errors: usize,
}

/// A sale and the message it was extracted from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleEmail {
    pub message_id: String,
    pub sale: RawSale,
}

/// What one pass over the mailbox found
#[derive(Debug, Default)]
pub struct MailScan {
    /// Sales in the order the mailbox listed them
    pub sales: Vec<SaleEmail>,
    /// Messages that are not sale confirmations
    pub ignored: Vec<String>,
    pub stats: ScanStats,
}

#[derive(Debug, Default)]
pub struct PollReport {
    pub scan: ScanStats,
    pub batch: BatchReport,
}

/// Read every matching message not yet in `processed`
pub async fn collect_sales<M: Mailbox>(
    mailbox: &M,
    config: &Config,
    processed: &ProcessedLog,
) -> Result<MailScan> {
    let ids = mailbox
        .search(&config.sender_filter, config.max_messages)
        .await
        .context("Failed to search mailbox")?;

    let mut scan = MailScan::default();
    scan.stats.matched = ids.len();

    for id in &ids {
        if processed.contains(id) {
            scan.stats.already_processed += 1;
            continue;
        }

        let message = match mailbox.fetch(id).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Failed to fetch message {}: {:#}", id, e);
                scan.stats.fetch_errors += 1;
                continue;
            }
        };

        if message.subject != config.completed_subject {
            tracing::trace!("Skipping {} ({})", id, message.subject);
            scan.ignored.push(id.clone());
            continue;
        }

        scan.stats.completed += 1;
        let sale = extract_sale(message.body());
        tracing::debug!("Message {}: item '{}', price '{}'", id, sale.item_name, sale.price);
        scan.sales.push(SaleEmail {
            message_id: id.clone(),
            sale,
        });
    }

    Ok(scan)
}

/// Read the mailbox once and hand every new completed sale to the ledger.
///
/// Messages whose sale was recorded, and messages that are not sales, are
/// marked in `processed` and the log is saved.
pub async fn poll_once<M: Mailbox, S: SheetStore>(
    mailbox: &M,
    ledger: &mut Ledger<S>,
    config: &Config,
    processed: &mut ProcessedLog,
) -> Result<PollReport> {
    tracing::info!("Polling mailbox with '{}'", config.sender_filter);

    let scan = collect_sales(mailbox, config, processed).await?;
    for id in &scan.ignored {
        processed.mark(id);
    }

    if scan.sales.is_empty() {
        tracing::info!(
            "No new completed sales among {} messages ({} already processed)",
            scan.stats.matched,
            scan.stats.already_processed
        );
        processed.save()?;
        return Ok(PollReport {
            scan: scan.stats,
            batch: BatchReport::default(),
        });
    }

    let sales: Vec<RawSale> = scan.sales.iter().map(|s| s.sale.clone()).collect();
    let batch = ledger
        .record_batch(&sales)
        .await
        .context("Failed to record sales")?;

    // The batch reports one entry per sale, last sale first
    for (email, entry) in scan.sales.iter().rev().zip(&batch.entries) {
        if matches!(entry, BatchEntry::Recorded { .. }) {
            processed.mark(&email.message_id);
        }
    }
    processed.save()?;

    tracing::info!(
        "Processed {} sales: {} written, {} duplicates, {} rejected, {} failed",
        sales.len(),
        batch.written(),
        batch.duplicates(),
        batch.rejected(),
        batch.failed()
    );

    Ok(PollReport {
        scan: scan.stats,
        batch,
    })
}
