//! Mailbox polling and Google Sheets glue around the sales ledger.

pub mod config;
pub mod extract;
pub mod gmail_client;
pub mod mailbox;
pub mod poller;
pub mod processed;
pub mod sheets_client;
