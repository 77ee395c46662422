use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use farm_taskclaim::config::LoggingConfig;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Console on stderr, plus `<dir>/YYYY-MM-DD.log` when file logging is enabled.
///
/// `--log-level` wins over `RUST_LOG`, which wins over `[logging] level`.
pub fn init_logging(log_level: Option<&str>, config: &LoggingConfig) -> Result<()> {
    let filter = match log_level {
        Some(level) => level_filter(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(&config.level)),
    };

    let console = fmt::layer().with_target(false).with_writer(io::stderr);

    let file = if config.file {
        match DailyFile::new(&config.dir) {
            Ok(writer) => Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(writer),
            ),
            Err(err) => {
                eprintln!(
                    "Warning: cannot create log directory {}: {}; file logging disabled",
                    config.dir.display(),
                    err
                );
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|err| anyhow!("failed to install log subscriber: {}", err))
}

fn level_filter(level: &str) -> EnvFilter {
    match level.to_lowercase().as_str() {
        "off" => EnvFilter::new("off"),
        "error" => EnvFilter::new("error"),
        "warn" | "warning" => EnvFilter::new("warn"),
        "info" => EnvFilter::new("info"),
        "debug" => EnvFilter::new("debug"),
        "trace" => EnvFilter::new("trace"),
        _ => {
            eprintln!("Warning: Invalid log level '{}', using 'info'", level);
            EnvFilter::new("info")
        }
    }
}

/// Append-only log file that moves to a new file when the local date changes.
pub struct DailyFile {
    dir: PathBuf,
    current: Mutex<Option<(NaiveDate, File)>>,
}

impl DailyFile {
    pub fn new(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            current: Mutex::new(None),
        })
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.log", date.format("%Y-%m-%d")))
    }

    fn write_dated(&self, date: NaiveDate, buf: &[u8]) -> io::Result<usize> {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let stale = !matches!(current.as_ref(), Some((open, _)) if *open == date);
        if stale {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(date))?;
            *current = Some((date, file));
        }

        match current.as_mut() {
            Some((_, file)) => {
                file.write_all(buf)?;
                Ok(buf.len())
            }
            None => Err(io::Error::new(io::ErrorKind::Other, "log file not open")),
        }
    }
}

pub struct DailyFileWriter<'a> {
    file: &'a DailyFile,
}

impl Write for DailyFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_dated(Local::now().date_naive(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut current = self
            .file
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match current.as_mut() {
            Some((_, file)) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for DailyFile {
    type Writer = DailyFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        DailyFileWriter { file: self }
    }
}
