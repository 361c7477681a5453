use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only, timestamped event log for one area's crawl or one run's
/// detail extraction.
///
/// Meant for operators; every line is flushed as it is written so an
/// interrupted run still leaves a complete log up to the last event.
pub struct AreaLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl AreaLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one event. Log write failures are reported but never stop a crawl.
    pub fn event(&mut self, message: impl AsRef<str>) {
        let line = format!(
            "[{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            message.as_ref()
        );
        let result = self
            .writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush());
        if let Err(e) = result {
            tracing::warn!("Failed to write to {}: {}", self.path.display(), e);
        }
    }
}
