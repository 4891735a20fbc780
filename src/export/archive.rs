//! Diagnostic copies of processed messages.
//!
//! Copies are named after the local time the run started:
//! `2014Jan16134714.input.eml`, `.output.eml` and `.error.eml`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::config::ArchiveConfig;

/// Which copy of a message is being saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyKind {
    /// The message as received.
    Input,
    /// The message file after processing.
    Output,
    /// The message as received, when processing failed.
    Error,
}

impl CopyKind {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Input => ".input.eml",
            Self::Output => ".output.eml",
            Self::Error => ".error.eml",
        }
    }
}

/// Timestamp-derived base name shared by all copies of one run.
pub fn base_name(at: DateTime<Local>) -> String {
    at.format("%Y%b%d%H%M%S").to_string()
}

/// Save a copy into the configured directory.
///
/// Input and output copies are only written when `save_processed` is on;
/// error copies whenever a directory is configured. Failures are logged
/// and otherwise ignored: losing a diagnostic copy must not affect mail flow.
pub fn save_copy(config: &ArchiveConfig, base: &str, kind: CopyKind, bytes: &[u8]) -> Option<PathBuf> {
    if kind != CopyKind::Error && !config.save_processed {
        return None;
    }
    let dir = config.directory.as_deref()?;
    match write_copy(dir, base, kind, bytes) {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "Saved diagnostic copy");
            Some(path)
        }
        Err(e) => {
            tracing::warn!(
                dir = %dir.display(),
                error = %e,
                "Failed to save diagnostic copy"
            );
            None
        }
    }
}

fn write_copy(dir: &Path, base: &str, kind: CopyKind, bytes: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{base}{}", kind.suffix()));
    std::fs::write(&path, bytes)?;
    Ok(path)
}
