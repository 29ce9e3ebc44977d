//! Common test utilities: memory volume, host-threaded MP mock, scripted
//! console and progress recorder

#![allow(dead_code)]

pub mod builder;
pub mod ciphers;
pub use builder::{encrypt_cbc, test_image, PayloadBuilder};
pub use ciphers::{CountingCipher, FailingCipher, SilentCipher};

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crows_core::hwinit::{
    ApTask, CompletionSignal, MpError, MpServices, ProcessorCounts, StatusFlags,
};
use crows_core::{
    BootVolume, DirEntry, LoaderConfig, LoaderError, OperatorConsole, PayloadFile, ProgressPhase,
    ProgressSink, Result,
};

/// Config with stalls short enough for host tests.
pub fn test_config() -> LoaderConfig {
    LoaderConfig {
        tick_stall_us: 50,
        start_retry_stall_us: 10,
        start_patience_ticks: 10_000,
        settle_patience_ticks: 3,
        load_chunk_len: 256,
        ..LoaderConfig::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// VOLUME
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
struct MemoryEntry {
    name: String,
    data: Arc<Vec<u8>>,
    is_directory: bool,
}

/// Root directory held in memory.
#[derive(Clone, Default)]
pub struct MemoryVolume {
    entries: Vec<MemoryEntry>,
    /// Largest single read a file will serve
    read_limit: Option<usize>,
}

impl MemoryVolume {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: &str, data: Vec<u8>) -> Self {
        self.entries.push(MemoryEntry {
            name: name.to_string(),
            data: Arc::new(data),
            is_directory: false,
        });
        self
    }

    pub fn with_dir(mut self, name: &str) -> Self {
        self.entries.push(MemoryEntry {
            name: name.to_string(),
            data: Arc::new(Vec::new()),
            is_directory: true,
        });
        self
    }

    pub fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = Some(limit);
        self
    }
}

impl BootVolume for MemoryVolume {
    type File = MemoryFile;

    fn root_entries(&mut self) -> Result<Vec<DirEntry>> {
        Ok(self
            .entries
            .iter()
            .map(|e| DirEntry {
                name: e.name.clone(),
                size: e.data.len() as u64,
                is_directory: e.is_directory,
            })
            .collect())
    }

    fn open(&mut self, name: &str) -> Result<MemoryFile> {
        self.entries
            .iter()
            .find(|e| !e.is_directory && e.name.eq_ignore_ascii_case(name))
            .map(|e| {
                let mut file = MemoryFile::new(Arc::clone(&e.data));
                file.read_limit = self.read_limit;
                file
            })
            .ok_or(LoaderError::NotFound)
    }
}

/// File view over shared bytes.
pub struct MemoryFile {
    data: Arc<Vec<u8>>,
    position: usize,
    read_limit: Option<usize>,
    pub reads: usize,
}

impl MemoryFile {
    pub fn new(data: Arc<Vec<u8>>) -> Self {
        Self {
            data,
            position: 0,
            read_limit: None,
            reads: 0,
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::new(Arc::new(data))
    }

    /// A file that claims `len` bytes but whose content is irrelevant.
    pub fn zeroed(len: usize) -> Self {
        Self::from_bytes(vec![0u8; len])
    }
}

impl PayloadFile for MemoryFile {
    fn size(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        self.position = usize::try_from(position).map_err(|_| LoaderError::DeviceFault)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reads += 1;
        let remaining = self.data.len().saturating_sub(self.position);
        let mut n = buf.len().min(remaining);
        if let Some(limit) = self.read_limit {
            n = n.min(limit);
        }
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MP SERVICES
// ═══════════════════════════════════════════════════════════════════════════

struct ThreadedState {
    count: usize,
    active: Mutex<Vec<bool>>,
    flaky_completion: AtomicBool,
    launches: AtomicUsize,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

/// MP services backed by `std::thread`. Processor #0 is the BSP.
#[derive(Clone)]
pub struct ThreadedMp {
    state: Arc<ThreadedState>,
}

impl ThreadedMp {
    pub fn new(count: usize) -> Self {
        Self {
            state: Arc::new(ThreadedState {
                count,
                active: Mutex::new(vec![false; count]),
                flaky_completion: AtomicBool::new(false),
                launches: AtomicUsize::new(0),
                threads: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Drop every completion signal; workers must finish on their own.
    pub fn flaky(self) -> Self {
        self.state.flaky_completion.store(true, Ordering::SeqCst);
        self
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn join_all(&self) {
        let threads: Vec<_> = self.state.threads.lock().unwrap().drain(..).collect();
        for thread in threads {
            thread.join().expect("AP thread panicked");
        }
    }
}

impl MpServices for ThreadedMp {
    fn processor_counts(&self) -> std::result::Result<ProcessorCounts, MpError> {
        Ok(ProcessorCounts {
            total: self.state.count,
            enabled: self.state.count,
        })
    }

    fn who_am_i(&self) -> std::result::Result<usize, MpError> {
        Ok(0)
    }

    fn processor_status(&self, index: usize) -> std::result::Result<StatusFlags, MpError> {
        if index >= self.state.count {
            return Err(MpError::NotFound);
        }
        Ok(StatusFlags::new(index == 0, true, true))
    }

    fn enable_processor(&self, _index: usize, _healthy: bool) -> std::result::Result<(), MpError> {
        Ok(())
    }

    fn startup_this_ap(
        &self,
        index: usize,
        task: ApTask,
        completion: CompletionSignal,
    ) -> std::result::Result<(), MpError> {
        {
            let mut active = self.state.active.lock().unwrap();
            match active.get_mut(index) {
                Some(true) => return Err(MpError::NotReady),
                Some(busy) => *busy = true,
                None => return Err(MpError::NotFound),
            }
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);

        let state = Arc::clone(&self.state);
        let thread = std::thread::spawn(move || {
            task();
            state.active.lock().unwrap()[index] = false;
            if !state.flaky_completion.load(Ordering::SeqCst) {
                completion();
            }
        });
        self.state.threads.lock().unwrap().push(thread);
        Ok(())
    }

    fn stall(&self, microseconds: u64) {
        std::thread::sleep(Duration::from_micros(microseconds.min(1_000)));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONSOLE
// ═══════════════════════════════════════════════════════════════════════════

/// Console that replays canned lines and records everything shown.
#[derive(Default)]
pub struct ScriptedConsole {
    lines: VecDeque<Vec<u8>>,
    pub prompts: Vec<(String, bool)>,
    pub messages: Vec<String>,
}

impl ScriptedConsole {
    pub fn new<I, L>(lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[u8]>,
    {
        Self {
            lines: lines.into_iter().map(|l| l.as_ref().to_vec()).collect(),
            ..Self::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }

    pub fn saw_message(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.contains(needle))
    }
}

impl OperatorConsole for ScriptedConsole {
    fn read_line(&mut self, prompt: &str, secret: bool) -> Result<Vec<u8>> {
        self.prompts.push((prompt.to_string(), secret));
        // Running out of script would otherwise loop forever.
        self.lines.pop_front().ok_or(LoaderError::DeviceFault)
    }

    fn notify(&mut self, message: fmt::Arguments<'_>) {
        self.messages.push(message.to_string());
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROGRESS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<(ProgressPhase, u64, u64)>,
}

impl RecordingSink {
    pub fn values(&self, phase: ProgressPhase) -> Vec<u64> {
        self.events
            .iter()
            .filter(|(p, _, _)| *p == phase)
            .map(|&(_, current, _)| current)
            .collect()
    }

    pub fn last(&self, phase: ProgressPhase) -> Option<(u64, u64)> {
        self.events
            .iter()
            .rev()
            .find(|(p, _, _)| *p == phase)
            .map(|&(_, current, total)| (current, total))
    }
}

impl ProgressSink for RecordingSink {
    fn report(&mut self, phase: ProgressPhase, current: u64, total: u64) {
        self.events.push((phase, current, total));
    }
}
