use anyhow::{Context, Result};
use clap::Parser;
use sales_ledger::{Ledger, MemoryStore};
use sales_poller::config::Config;
use sales_poller::gmail_client::GmailMailbox;
use sales_poller::poller::{poll_once, PollReport};
use sales_poller::processed::ProcessedLog;
use sales_poller::sheets_client::SheetsStore;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sales-poller")]
#[command(about = "Record completed marketplace sales from Gmail into a Google spreadsheet")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "sales-poller.toml", env = "SALES_CONFIG")]
    config: PathBuf,

    /// Record into an in-memory sheet and print it instead of writing the spreadsheet
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install crypto provider");

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sales_poller=info,sales_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let mailbox = GmailMailbox::new(&config.credentials_path, &config.gmail_token_cache())
        .await
        .context("Failed to authenticate with Gmail")?;

    let mut processed = ProcessedLog::load(&config.processed_log_path())?;

    if cli.dry_run {
        let mut processed = processed.into_read_only();
        let mut ledger = Ledger::new(MemoryStore::new(), config.ledger_policy())?;
        let report = poll_once(&mailbox, &mut ledger, &config, &mut processed).await?;
        print_summary(&report);

        let store = ledger.store();
        for page in store.page_names() {
            println!("{}:", page);
            for (idx, row) in store.page_rows(&page).unwrap_or_default().iter().enumerate() {
                println!("  {:>3}  {}", idx + 1, row.join(" | "));
            }
        }
        return Ok(());
    }

    config.validate()?;

    let store = SheetsStore::new(
        &config.credentials_path,
        &config.sheets_token_cache(),
        config.spreadsheet_id.clone(),
    )
    .await
    .context("Failed to authenticate with Google Sheets")?;

    let mut ledger = Ledger::new(store, config.ledger_policy())?;
    let report = poll_once(&mailbox, &mut ledger, &config, &mut processed).await?;
    print_summary(&report);

    Ok(())
}

fn print_summary(report: &PollReport) {
    println!(
        "{} messages ({} already processed), {} new completed sales ({} unreadable)",
        report.scan.matched,
        report.scan.already_processed,
        report.scan.completed,
        report.scan.fetch_errors
    );
    println!(
        "{} written, {} duplicates skipped, {} malformed, {} failed",
        report.batch.written(),
        report.batch.duplicates(),
        report.batch.rejected(),
        report.batch.failed()
    );
}
