//! Loader log ring
//!
//! `log` records from every crate end up here, tagged with the loader stage
//! that produced them, so the boot UI can show what happened after the fact.
//!
//! # Design
//!
//! - Fixed-size, no heap allocation for the buffer
//! - Overwrites oldest entries when full
//! - Stage derived from the record target (module path)
//! - Safe to log from application processors; the ring is behind a spinlock

use core::fmt::{self, Write};

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

/// Maximum message length in bytes
pub const LOG_MSG_LEN: usize = 96;

/// Number of entries in the ring
pub const LOG_RING_SIZE: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════
// STAGES
// ═══════════════════════════════════════════════════════════════════════════

/// Loader stage a log entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    /// Processor enumeration
    Mp = 0,
    /// Thread lifecycle
    Thread = 1,
    /// Payload discovery
    Discovery = 2,
    /// Operator selection
    Selection = 3,
    /// Password probe
    Auth = 4,
    /// Work dispatch
    Dispatch = 5,
    /// Spin-wait coordinator
    Spin = 6,
    /// Payload load and decrypt
    Load = 7,
    /// Boot session
    Boot = 8,
    /// Anything else
    Core = 9,
}

impl Stage {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mp => "MP",
            Self::Thread => "THRD",
            Self::Discovery => "DISC",
            Self::Selection => "SEL",
            Self::Auth => "AUTH",
            Self::Dispatch => "DISP",
            Self::Spin => "SPIN",
            Self::Load => "LOAD",
            Self::Boot => "BOOT",
            Self::Core => "CORE",
        }
    }

    /// Map a record target (normally the module path) to a stage.
    pub fn from_target(target: &str) -> Self {
        let module = target.rsplit("::").next().unwrap_or(target);
        match module {
            "mp" | "processor" => Self::Mp,
            "thread" => Self::Thread,
            "discovery" => Self::Discovery,
            "selection" => Self::Selection,
            "verify" | "format" => Self::Auth,
            "dispatcher" | "job" => Self::Dispatch,
            "coordinator" | "progress" => Self::Spin,
            "loader" | "crypto" => Self::Load,
            "session" => Self::Boot,
            _ => Self::Core,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ENTRIES
// ═══════════════════════════════════════════════════════════════════════════

/// Single log entry in the ring
#[derive(Clone)]
pub struct LogEntry {
    msg: [u8; LOG_MSG_LEN],
    len: u8,
    pub stage: Stage,
    pub level: Level,
}

impl LogEntry {
    const fn empty() -> Self {
        Self {
            msg: [0u8; LOG_MSG_LEN],
            len: 0,
            stage: Stage::Core,
            level: Level::Trace,
        }
    }

    /// Build an entry, truncating `args` to [`LOG_MSG_LEN`] bytes.
    pub fn new(stage: Stage, level: Level, args: fmt::Arguments<'_>) -> Self {
        let mut entry = Self::empty();
        entry.stage = stage;
        entry.level = level;
        let mut cursor = Truncating { entry: &mut entry };
        let _ = cursor.write_fmt(args);
        entry
    }

    pub fn message(&self) -> &str {
        let slice = &self.msg[..self.len as usize];
        match core::str::from_utf8(slice) {
            Ok(msg) => msg,
            // Truncation may split a code point; keep the valid prefix.
            Err(err) => core::str::from_utf8(&slice[..err.valid_up_to()]).unwrap_or(""),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }
}

/// "[STAGE] message", with an ERR/WRN marker for problems.
impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.level {
            Level::Error => "ERR ",
            Level::Warn => "WRN ",
            _ => "",
        };
        write!(f, "[{}{}] {}", marker, self.stage.name(), self.message())
    }
}

impl fmt::Debug for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

struct Truncating<'a> {
    entry: &'a mut LogEntry,
}

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let pos = self.entry.len as usize;
        let room = LOG_MSG_LEN - pos;
        let take = s.len().min(room);
        self.entry.msg[pos..pos + take].copy_from_slice(&s.as_bytes()[..take]);
        self.entry.len = (pos + take) as u8;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RING
// ═══════════════════════════════════════════════════════════════════════════

/// Overwrite-oldest ring of entries.
pub struct LogRing {
    entries: [LogEntry; LOG_RING_SIZE],
    /// Total entries ever written
    written: usize,
    /// Total entries ever read (or skipped)
    read: usize,
}

impl LogRing {
    pub const fn new() -> Self {
        const EMPTY: LogEntry = LogEntry::empty();
        Self {
            entries: [EMPTY; LOG_RING_SIZE],
            written: 0,
            read: 0,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries[self.written % LOG_RING_SIZE] = entry;
        self.written += 1;
    }

    /// Oldest unread entry. Entries lost to overwrite are skipped.
    pub fn pop(&mut self) -> Option<LogEntry> {
        if self.read >= self.written {
            return None;
        }
        if self.written - self.read > LOG_RING_SIZE {
            self.read = self.written - LOG_RING_SIZE;
        }
        let entry = self.entries[self.read % LOG_RING_SIZE].clone();
        self.read += 1;
        Some(entry)
    }

    pub fn available(&self) -> usize {
        (self.written - self.read).min(LOG_RING_SIZE)
    }

    pub fn total(&self) -> usize {
        self.written
    }

    pub fn clear(&mut self) {
        self.read = self.written;
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// GLOBAL LOGGER
// ═══════════════════════════════════════════════════════════════════════════

static RING: Mutex<LogRing> = Mutex::new(LogRing::new());

static LOGGER: RingLogger = RingLogger;

/// `log::Log` implementation writing into the global ring.
pub struct RingLogger;

impl Log for RingLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry::new(
            Stage::from_target(record.target()),
            record.level(),
            *record.args(),
        );
        RING.lock().push(entry);
    }

    fn flush(&self) {}
}

/// Install the ring logger. Only the first call succeeds.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Pop the oldest entry from the global ring.
pub fn pop() -> Option<LogEntry> {
    RING.lock().pop()
}

/// Entries waiting in the global ring.
pub fn available() -> usize {
    RING.lock().available()
}

/// Drop everything currently in the global ring.
pub fn clear() {
    RING.lock().clear();
}
