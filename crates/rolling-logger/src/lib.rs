//! Rolling Logger
//!
//! Process-wide log sink: a `tracing-subscriber` fmt layer writing to a
//! size-capped file that rotates once (`<app>.log` -> `<app>.log.1`), plus an
//! in-memory ring of the most recent lines for on-screen diagnostics.
//! `log` records are bridged into the same subscriber.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::Level;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::MakeWriter;

/// Rotate after this many bytes unless configured otherwise
pub const DEFAULT_MAX_BYTES: u64 = 2 * 1024 * 1024;
/// Lines kept in memory unless configured otherwise
pub const DEFAULT_RECENT_LINES: usize = 500;

static LOGGER: OnceLock<RollingFile> = OnceLock::new();

/// Logger settings
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    pub log_dir: PathBuf,
    pub app_name: String,
    pub max_bytes: u64,
    pub recent_lines: usize,
    pub level: Level,
}

impl LoggerOptions {
    pub fn new(log_dir: impl Into<PathBuf>, app_name: impl Into<String>) -> Self {
        Self {
            log_dir: log_dir.into(),
            app_name: app_name.into(),
            max_bytes: DEFAULT_MAX_BYTES,
            recent_lines: DEFAULT_RECENT_LINES,
            level: Level::INFO,
        }
    }
}

/// Initialize the global logger with default limits
pub fn init_logger(log_dir: PathBuf, app_name: &str) -> Result<(), String> {
    init_with(LoggerOptions::new(log_dir, app_name))
}

/// Initialize the global logger. Fails if a global subscriber already exists.
pub fn init_with(options: LoggerOptions) -> Result<(), String> {
    let file = RollingFile::create(
        &options.log_dir,
        &options.app_name,
        options.max_bytes,
        options.recent_lines,
    )
    .map_err(|e| format!("Failed to open log file: {}", e))?;

    tracing_subscriber::fmt()
        .with_writer(file.clone())
        .with_timer(LocalTimer)
        .with_ansi(false)
        .with_target(true)
        .with_max_level(options.level)
        .try_init()
        .map_err(|e| format!("Failed to install subscriber: {}", e))?;

    let path = file.path();
    LOGGER
        .set(file)
        .map_err(|_| "Logger already initialized".to_string())?;
    log::debug!("logging to {}", path.display());
    Ok(())
}

/// Log an info line through the global logger
pub fn info(message: &str) -> Result<(), String> {
    ensure_initialized()?;
    tracing::info!(target: "app", "{}", message);
    Ok(())
}

/// Log an error line through the global logger
pub fn error(message: &str) -> Result<(), String> {
    ensure_initialized()?;
    tracing::error!(target: "app", "{}", message);
    Ok(())
}

/// Most recent lines written by the global logger, oldest first
pub fn recent_lines() -> Vec<String> {
    LOGGER.get().map(RollingFile::recent).unwrap_or_default()
}

fn ensure_initialized() -> Result<(), String> {
    if LOGGER.get().is_some() {
        Ok(())
    } else {
        Err("Logger not initialized".to_string())
    }
}

/// Local wall-clock timestamps
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

struct RollingState {
    path: PathBuf,
    backup_path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    recent: VecDeque<String>,
    capacity: usize,
    /// Bytes of a line not yet terminated by '\n'
    partial: String,
}

impl RollingState {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)?;
        self.written += buf.len() as u64;
        self.remember(buf);
        if self.written >= self.max_bytes {
            self.rotate()?;
        }
        Ok(())
    }

    fn remember(&mut self, buf: &[u8]) {
        if self.capacity == 0 {
            return;
        }
        self.partial.push_str(&String::from_utf8_lossy(buf));
        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            if self.recent.len() == self.capacity {
                self.recent.pop_front();
            }
            self.recent.push_back(line.trim_end().to_string());
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backup_path.exists() {
            fs::remove_file(&self.backup_path)?;
        }
        fs::rename(&self.path, &self.backup_path)?;
        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

/// A log file that rotates at a size cap and remembers its latest lines
#[derive(Clone)]
pub struct RollingFile {
    state: Arc<Mutex<RollingState>>,
}

impl RollingFile {
    pub fn create(
        log_dir: &Path,
        app_name: &str,
        max_bytes: u64,
        recent_lines: usize,
    ) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("{}.log", app_name));
        let backup_path = log_dir.join(format!("{}.log.1", app_name));
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            state: Arc::new(Mutex::new(RollingState {
                path,
                backup_path,
                file,
                written,
                max_bytes: max_bytes.max(1),
                recent: VecDeque::with_capacity(recent_lines),
                capacity: recent_lines,
                partial: String::new(),
            })),
        })
    }

    /// Path of the active log file
    pub fn path(&self) -> PathBuf {
        match self.state.lock() {
            Ok(state) => state.path.clone(),
            Err(poisoned) => poisoned.into_inner().path.clone(),
        }
    }

    /// Remembered lines, oldest first
    pub fn recent(&self) -> Vec<String> {
        match self.state.lock() {
            Ok(state) => state.recent.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().recent.iter().cloned().collect(),
        }
    }
}

/// Handle given to the fmt layer for each event
pub struct RollingWriter {
    state: Arc<Mutex<RollingState>>,
}

impl Write for RollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log state poisoned"))?;
        state.write(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log state poisoned"))?;
        state.file.flush()
    }
}

impl<'a> MakeWriter<'a> for RollingFile {
    type Writer = RollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RollingWriter {
            state: Arc::clone(&self.state),
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
