//! Structured logging
//!
//! Sets up the global `tracing` subscriber from [`LoggingConfig`]: JSON or
//! text lines, written to stdout or to a size-rotated file through a
//! non-blocking worker.

use crate::core::config::LoggingConfig;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Keeps the non-blocking log worker alive; drop it last
pub struct Logger {
    _guard: WorkerGuard,
}

impl Logger {
    /// Install the global subscriber
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let level = parse_log_level(&config.level)?;

        // RUST_LOG wins over the configured level when present
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

        let (writer, guard) = build_writer(config)?;

        let fmt_layer = match config.format.as_str() {
            "json" => fmt::layer()
                .json()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_target(true)
                .boxed(),
            "text" => fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .boxed(),
            other => anyhow::bail!("Invalid format configuration: {}", other),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize tracing subscriber")?;

        tracing::info!(
            level = %config.level,
            format = %config.format,
            output = %config.output,
            "Logging system initialized"
        );

        Ok(Logger { _guard: guard })
    }
}

fn build_writer(config: &LoggingConfig) -> Result<(NonBlocking, WorkerGuard)> {
    match config.output.as_str() {
        "stdout" => Ok(tracing_appender::non_blocking(io::stdout())),
        "file" => {
            let log_file = config
                .log_file
                .as_ref()
                .context("log_file must be specified when output is 'file'")?;
            let writer = RotatingFileWriter::for_path(log_file, config.max_file_size, config.max_backups)?;
            Ok(tracing_appender::non_blocking(writer))
        }
        other => anyhow::bail!("Invalid output configuration: {}", other),
    }
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {}", level),
    }
}

/// File writer that rolls `wizard.log` to `wizard.log.1`, `.2`, ... once it
/// would grow past `max_file_size`.
pub struct RotatingFileWriter {
    directory: PathBuf,
    filename: String,
    max_file_size: usize,
    max_backups: usize,
    file: Option<File>,
    written: usize,
}

impl RotatingFileWriter {
    /// Create the writer, making the parent directory when missing
    pub fn for_path(log_file: &Path, max_file_size: usize, max_backups: usize) -> Result<Self> {
        let directory = log_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let filename = log_file
            .file_name()
            .and_then(|name| name.to_str())
            .context("Log filename must be valid UTF-8")?
            .to_string();

        std::fs::create_dir_all(&directory).context("Failed to create log directory")?;

        Ok(Self {
            directory,
            filename,
            max_file_size,
            max_backups,
            file: None,
            written: 0,
        })
    }

    fn current_path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        self.directory.join(format!("{}.{}", self.filename, index))
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;

        for i in (1..self.max_backups).rev() {
            let from = self.backup_path(i);
            if from.exists() {
                std::fs::rename(&from, self.backup_path(i + 1))?;
            }
        }

        let current = self.current_path();
        if current.exists() {
            std::fs::rename(&current, self.backup_path(1))?;
        }

        self.written = 0;
        Ok(())
    }

    fn file(&mut self) -> io::Result<&mut File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(self.current_path())?;
                self.written = file.metadata()?.len() as usize;
                file
            }
        };
        Ok(self.file.insert(file))
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // opening first so `written` reflects an existing file
        self.file()?;
        if self.written > 0 && self.written + buf.len() > self.max_file_size {
            self.rotate()?;
        }

        let written = self.file()?.write(buf)?;
        self.written += written;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("debug"), Ok(Level::DEBUG)));
        assert!(matches!(parse_log_level("INFO"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("warn"), Ok(Level::WARN)));
        assert!(matches!(parse_log_level("error"), Ok(Level::ERROR)));
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_rotating_writer_paths() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RotatingFileWriter::for_path(&dir.path().join("wizard.log"), 1024, 5).unwrap();

        assert_eq!(writer.current_path(), dir.path().join("wizard.log"));
        assert_eq!(writer.backup_path(2), dir.path().join("wizard.log.2"));
    }

    #[test]
    fn test_rotating_writer_rolls_over() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RotatingFileWriter::for_path(&dir.path().join("wizard.log"), 16, 2).unwrap();

        writer.write_all(b"0123456789\n").unwrap();
        writer.write_all(b"abcdefghij\n").unwrap();
        writer.write_all(b"ABCDEFGHIJ\n").unwrap();
        writer.flush().unwrap();

        let current = std::fs::read_to_string(dir.path().join("wizard.log")).unwrap();
        let first_backup = std::fs::read_to_string(dir.path().join("wizard.log.1")).unwrap();
        let second_backup = std::fs::read_to_string(dir.path().join("wizard.log.2")).unwrap();
        assert_eq!(current, "ABCDEFGHIJ\n");
        assert_eq!(first_backup, "abcdefghij\n");
        assert_eq!(second_backup, "0123456789\n");
    }
}
