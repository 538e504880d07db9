//! Listing, reading and deleting past batch transcripts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;

use crate::error::BenchError;

const TRANSCRIPT_EXT: &str = ".log";

/// Summary of one transcript file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub filename: String,
    /// `YYYY-mm-dd HH:MM`, from the filename when possible.
    pub date: String,
    pub name: String,
    /// Human-readable size, e.g. `"3.2 KB"`.
    pub size: String,
}

/// The `logs/` directory of batch transcripts.
#[derive(Debug, Clone)]
pub struct TranscriptDir {
    root: PathBuf,
}

impl TranscriptDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Every `.log` file, newest filename first. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<TranscriptEntry>, BenchError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            if !filename.ends_with(TRANSCRIPT_EXT) {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let modified: DateTime<Local> = meta.modified()?.into();
            entries.push(TranscriptEntry {
                date: display_date(&filename, modified),
                name: display_name(&filename),
                size: format!("{:.1} KB", meta.len() as f64 / 1024.0),
                filename,
            });
        }
        entries.sort_by(|a, b| b.filename.cmp(&a.filename));
        Ok(entries)
    }

    pub fn read(&self, filename: &str) -> Result<String, BenchError> {
        let path = self.resolve(filename)?;
        if !path.is_file() {
            return Err(BenchError::TranscriptNotFound(filename.to_string()));
        }
        Ok(std::fs::read_to_string(path)?)
    }

    pub fn delete(&self, filename: &str) -> Result<(), BenchError> {
        let path = self.resolve(filename)?;
        if !path.is_file() {
            return Err(BenchError::TranscriptNotFound(filename.to_string()));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    // Only bare file names inside the logs directory are addressable.
    fn resolve(&self, filename: &str) -> Result<PathBuf, BenchError> {
        let bare = Path::new(filename)
            .file_name()
            .is_some_and(|name| name == filename);
        if filename.is_empty() || !bare || filename.contains(['/', '\\']) {
            return Err(BenchError::InvalidTranscriptName(filename.to_string()));
        }
        Ok(self.root.join(filename))
    }
}

/// Date encoded in `BATCH_<YYYYmmdd_HHMMSS>.log`, else the modification time.
fn display_date(filename: &str, modified: DateTime<Local>) -> String {
    filename
        .split_once("BATCH_")
        .and_then(|(_, rest)| rest.split('.').next())
        .and_then(|stamp| NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S").ok())
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| modified.format("%Y-%m-%d %H:%M").to_string())
}

/// Last `__`-separated segment without the extension, or the whole name.
fn display_name(filename: &str) -> String {
    match filename.rsplit_once("__") {
        Some((_, last)) => last.replace(TRANSCRIPT_EXT, ""),
        None => filename.to_string(),
    }
}
