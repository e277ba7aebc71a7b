//! Persists the finished report as pretty-printed JSON.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::report::Report;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    File(PathBuf),
    Stdout,
}

impl OutputSink {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        path.map_or(Self::Stdout, Self::File)
    }

    pub fn write(&self, report: &Report) -> Result<()> {
        let body = render(report)?;
        match self {
            Self::File(path) => write_file(path, &body),
            Self::Stdout => write_stdout(&body),
        }
    }

    /// Write the report; if the file cannot be written, log and fall back to stdout.
    pub fn write_or_fallback(&self, report: &Report) {
        match self.write(report) {
            Ok(()) => {}
            Err(e) => {
                error!(error = ?e, "Failed to write report");
                if *self != Self::Stdout
                    && let Err(e) = Self::Stdout.write(report)
                {
                    error!(error = ?e, "Failed to print report to stdout");
                }
            }
        }
    }
}

fn render(report: &Report) -> Result<String> {
    let mut body = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    body.push('\n');
    Ok(body)
}

fn write_file(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = body.len(), "Report written");
    Ok(())
}

fn write_stdout(body: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(body.as_bytes())
        .and_then(|()| stdout.flush())
        .context("Failed to write report to stdout")
}
