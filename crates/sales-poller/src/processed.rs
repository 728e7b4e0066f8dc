//! Ids of mailbox messages that need no further work.
//!
//! A message is marked once its sale was recorded (written or found already
//! on the sheet), or once it turned out not to be a sale confirmation.
//! Messages whose sale failed or was malformed stay unmarked and are read
//! again on the next poll.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct LogFile {
    message_ids: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct ProcessedLog {
    /// Where `save` writes; `None` keeps the log in memory only
    path: Option<PathBuf>,
    ids: BTreeSet<String>,
    dirty: bool,
}

impl ProcessedLog {
    /// Log that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Read the log at `path`; a missing file is an empty log
    pub fn load(path: &Path) -> Result<Self> {
        let ids = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read processed log {}", path.display()))?;
            let file: LogFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse processed log {}", path.display()))?;
            file.message_ids
        } else {
            BTreeSet::new()
        };

        tracing::debug!("Loaded {} processed message ids from {}", ids.len(), path.display());
        Ok(Self {
            path: Some(path.to_path_buf()),
            ids,
            dirty: false,
        })
    }

    /// Keep the loaded ids but never write them back
    pub fn into_read_only(mut self) -> Self {
        self.path = None;
        self
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.ids.contains(message_id)
    }

    pub fn mark(&mut self, message_id: &str) {
        if self.ids.insert(message_id.to_string()) {
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Write the log if it changed, replacing the file in one rename
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let file = LogFile {
            message_ids: self.ids.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace processed log {}", path.display()))?;

        tracing::debug!("Saved {} processed message ids to {}", self.ids.len(), path.display());
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_log() {
        let dir = TempDir::new().unwrap();
        let log = ProcessedLog::load(&dir.path().join("processed_messages.json")).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn test_marks_survive_a_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed_messages.json");

        let mut log = ProcessedLog::load(&path).unwrap();
        log.mark("m1");
        log.mark("m2");
        log.mark("m1");
        log.save().unwrap();

        let reloaded = ProcessedLog::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("m1"));
        assert!(reloaded.contains("m2"));
        assert!(!reloaded.contains("m3"));
    }

    #[test]
    fn test_read_only_log_never_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed_messages.json");

        let mut log = ProcessedLog::load(&path).unwrap().into_read_only();
        log.mark("m1");
        log.save().unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed_messages.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(ProcessedLog::load(&path).is_err());
    }
}
