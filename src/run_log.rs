//! Per-run log context
//!
//! Workflow lines go to the tracing subscriber and, depending on the sink,
//! to a log file or an in-memory buffer. A `RunLog` is created for one run
//! and passed into the workflows explicitly.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;

enum Sink {
    /// Tracing subscriber only
    Stderr,
    File(Mutex<BufWriter<File>>),
    Memory(Mutex<Vec<String>>),
}

/// Log context scoped to a single benchmark run
pub struct RunLog {
    run: String,
    sink: Sink,
}

impl RunLog {
    /// Log to `path` (truncated) in addition to tracing
    pub fn to_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {:?}", parent))?;
        }
        let file = File::create(path).with_context(|| format!("Failed to create log file: {:?}", path))?;
        Ok(Self {
            run: new_run_id(),
            sink: Sink::File(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn stderr_only() -> Self {
        Self {
            run: new_run_id(),
            sink: Sink::Stderr,
        }
    }

    /// Keep lines in memory, readable through `lines()`
    pub fn capture() -> Self {
        Self {
            run: new_run_id(),
            sink: Sink::Memory(Mutex::new(Vec::new())),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.write(Level::INFO, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.write(Level::WARN, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.write(Level::ERROR, message.as_ref());
    }

    /// Captured lines; empty unless created with `capture()`
    pub fn lines(&self) -> Vec<String> {
        match &self.sink {
            Sink::Memory(lines) => lines.lock().map(|l| l.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn flush(&self) -> Result<()> {
        if let Sink::File(writer) = &self.sink {
            if let Ok(mut writer) = writer.lock() {
                writer.flush().context("Failed to flush log file")?;
            }
        }
        Ok(())
    }

    fn write(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(run = %self.run, "{}", message),
            Level::WARN => tracing::warn!(run = %self.run, "{}", message),
            _ => tracing::info!(run = %self.run, "{}", message),
        }

        match &self.sink {
            Sink::Stderr => {}
            Sink::File(writer) => {
                let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                if let Ok(mut writer) = writer.lock() {
                    if let Err(e) = writeln!(writer, "{} {:5} {}", timestamp, level, message) {
                        tracing::warn!("Failed to write log line: {}", e);
                    }
                }
            }
            Sink::Memory(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(message.to_string());
                }
            }
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

fn new_run_id() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_keeps_lines_in_order() {
        let log = RunLog::capture();
        log.info("Batch size = 8");
        log.warn("Exact Match: absent");

        assert_eq!(log.lines(), vec!["Batch size = 8", "Exact Match: absent"]);
        assert!(!log.run_id().is_empty());
    }

    #[test]
    fn test_stderr_only_captures_nothing() {
        let log = RunLog::stderr_only();
        log.info("hello");
        assert!(log.lines().is_empty());
    }

    #[test]
    fn test_file_sink_writes_level_and_message() {
        let path = std::env::temp_dir().join(format!("qa-bench-runlog-{}.log", std::process::id()));
        {
            let log = RunLog::to_file(&path).unwrap();
            log.info("F1 Accuracy: 88.5");
            log.error("engine failed");
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].ends_with("F1 Accuracy: 88.5"));
        assert!(lines[1].contains("ERROR"));
        std::fs::remove_file(&path).ok();
    }
}
