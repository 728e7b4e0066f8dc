use anyhow::{Context, Result};
use sales_ledger::LedgerPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path to Google OAuth client credentials JSON file
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    /// Directory holding the Gmail and Sheets token caches and the processed-message log
    #[serde(default = "default_token_cache_dir")]
    pub token_cache_dir: PathBuf,

    /// Identifier of the target spreadsheet
    #[serde(default)]
    pub spreadsheet_id: String,

    /// First page of the ledger
    #[serde(default = "default_page")]
    pub default_page: String,

    /// Gmail search query selecting marketplace emails
    #[serde(default = "default_sender_filter")]
    pub sender_filter: String,

    /// Subject of the emails that confirm a sale
    #[serde(default = "default_completed_subject")]
    pub completed_subject: String,

    /// Maximum messages to inspect per run
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,

    /// How many recent item names are checked for duplicates
    #[serde(default = "default_dedup_window")]
    pub dedup_window: usize,

    /// Data rows per page before rolling over to a new page
    #[serde(default = "default_rollover_threshold")]
    pub rollover_threshold: usize,
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_token_cache_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_page() -> String {
    "Sheet1".to_string()
}

fn default_sender_filter() -> String {
    "from:@vinted.nl".to_string()
}

fn default_completed_subject() -> String {
    "This order is completed".to_string()
}

fn default_max_messages() -> u32 {
    100
}

fn default_dedup_window() -> usize {
    10
}

fn default_rollover_threshold() -> usize {
    50
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            token_cache_dir: default_token_cache_dir(),
            spreadsheet_id: String::new(),
            default_page: default_page(),
            sender_filter: default_sender_filter(),
            completed_subject: default_completed_subject(),
            max_messages: default_max_messages(),
            dedup_window: default_dedup_window(),
            rollover_threshold: default_rollover_threshold(),
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults when it does not exist,
    /// then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Config::default()
        };

        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `SALES_*` overrides read through `lookup`
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(id) = lookup("SALES_SPREADSHEET_ID") {
            self.spreadsheet_id = id;
        }
        if let Some(path) = lookup("SALES_CREDENTIALS_PATH") {
            self.credentials_path = PathBuf::from(path);
        }
        if let Some(filter) = lookup("SALES_SENDER_FILTER") {
            self.sender_filter = filter;
        }
        if let Some(window) = lookup("SALES_DEDUP_WINDOW") {
            self.dedup_window = window
                .parse()
                .context("SALES_DEDUP_WINDOW must be a valid number")?;
        }
        if let Some(threshold) = lookup("SALES_ROLLOVER_THRESHOLD") {
            self.rollover_threshold = threshold
                .parse()
                .context("SALES_ROLLOVER_THRESHOLD must be a valid number")?;
        }
        Ok(self)
    }

    /// Check the values a live run depends on
    pub fn validate(&self) -> Result<()> {
        if self.spreadsheet_id.trim().is_empty() {
            anyhow::bail!("spreadsheet_id must be set (config file or SALES_SPREADSHEET_ID)");
        }
        self.ledger_policy().validate()?;
        Ok(())
    }

    pub fn ledger_policy(&self) -> LedgerPolicy {
        LedgerPolicy {
            dedup_window: self.dedup_window,
            rollover_threshold: self.rollover_threshold,
            default_page: self.default_page.clone(),
        }
    }

    pub fn gmail_token_cache(&self) -> PathBuf {
        self.token_cache_dir.join("gmail_token_cache.json")
    }

    pub fn sheets_token_cache(&self) -> PathBuf {
        self.token_cache_dir.join("sheets_token_cache.json")
    }

    /// Ids of messages already handled, kept next to the token caches
    pub fn processed_log_path(&self) -> PathBuf {
        self.token_cache_dir.join("processed_messages.json")
    }
}
