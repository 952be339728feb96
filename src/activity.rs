use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::warn;

use crate::error::ActivityError;

/// Append-only destination for audit lines.
pub trait ActivitySink {
    fn append(&self, line: &str) -> io::Result<()>;
}

/// Appends to a text file, one `write_all` per line so concurrent writers
/// never interleave partial lines.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSink { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(&self.path)
    }
}

impl ActivitySink for FileSink {
    fn append(&self, line: &str) -> io::Result<()> {
        let mut file = self.open()?;
        let mut buffer = String::with_capacity(line.len() + 1);
        buffer.push_str(line);
        buffer.push('\n');
        file.write_all(buffer.as_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Drop the line and warn; the view still renders.
    #[default]
    Swallow,
    Fatal,
}

pub struct ActivityLogger<S> {
    sink: S,
    policy: FailurePolicy,
}

impl<S: ActivitySink> ActivityLogger<S> {
    pub fn new(sink: S, policy: FailurePolicy) -> Self {
        ActivityLogger { sink, policy }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn log(&self, action: &str) -> Result<(), ActivityError> {
        let line = format_line(&Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(), action);
        match self.sink.append(&line) {
            Ok(()) => Ok(()),
            Err(err) => match self.policy {
                FailurePolicy::Swallow => {
                    warn!(error = %err, action, "dropping activity log line");
                    Ok(())
                }
                FailurePolicy::Fatal => Err(ActivityError::Write(err)),
            },
        }
    }
}

fn format_line(timestamp: &str, action: &str) -> String {
    // one record per line
    let action = action.replace(['\r', '\n'], " ");
    format!("[{timestamp}] {action}")
}

pub fn viewed_farm(farm: &str) -> String {
    format!("Viewed farm: {farm}")
}

pub fn opened_latest_visit(farm: &str) -> String {
    format!("Opened Last Visit Summary for: {farm}")
}

pub fn viewed_averages(farm: &str) -> String {
    format!("Viewed Historical Averages for: {farm}")
}

pub fn viewed_rankings(farm: &str) -> String {
    format!("Viewed Group Hygiene Rankings for: {farm}")
}

pub fn viewed_trend(score: &str, farm: &str) -> String {
    format!("Viewed {score} trend for: {farm}")
}

pub fn viewed_all_trends(farm: &str) -> String {
    format!("Viewed All Score Trends for: {farm}")
}

pub fn opened_flagged(farm: &str) -> String {
    format!("Opened Flagged Data for: {farm}")
}
