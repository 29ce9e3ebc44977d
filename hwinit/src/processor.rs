//! Processor Registry
//!
//! Tracks every logical processor firmware reports, and which of them are
//! currently running decryption work.
//!
//! # Ownership
//!
//! ```text
//! ProcessorRegistry (BSP only)
//!   ├── MpServices          firmware queries, AP startup, stall
//!   └── WorkingSet ─────┐   Arc<Mutex<Vec<LogicalProcessor>>>
//!                       │
//! ThreadHandle (AP) ────┘   releases its processor on finish
//! ```
//!
//! The working-set table is the only state touched from more than one
//! processor. Every read-modify-write of `is_working` happens with its lock
//! held. Firmware flags are re-read on `refresh()`; `is_working` is ours and
//! survives a refresh.

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, warn};
use spin::Mutex;

use crate::mp::{ApTask, CompletionSignal, MpError, MpServices, StatusFlags};

// ═══════════════════════════════════════════════════════════════════════════
// LOGICAL PROCESSOR
// ═══════════════════════════════════════════════════════════════════════════

/// One logical processor as last seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalProcessor {
    /// Firmware processor number (stable, 0-based)
    pub index: usize,
    /// Bootstrap processor; never accepts work
    pub is_bootstrap: bool,
    pub is_enabled: bool,
    pub is_healthy: bool,
    /// Busy with a thread handle (registry-private)
    pub is_working: bool,
}

impl LogicalProcessor {
    pub const fn from_status(index: usize, flags: StatusFlags, is_working: bool) -> Self {
        Self {
            index,
            is_bootstrap: flags.is_bootstrap(),
            is_enabled: flags.is_enabled(),
            is_healthy: flags.is_healthy(),
            is_working,
        }
    }

    /// Can take a new thread right now.
    ///
    /// Health is reported but not required; some firmware never sets the bit.
    pub const fn is_available(&self) -> bool {
        !self.is_bootstrap && !self.is_working && self.is_enabled
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// WORKING SET
// ═══════════════════════════════════════════════════════════════════════════

/// Lock-protected processor table, shared with running threads.
#[derive(Clone)]
pub struct WorkingSet {
    table: Arc<Mutex<Vec<LogicalProcessor>>>,
}

impl WorkingSet {
    pub fn new(processors: Vec<LogicalProcessor>) -> Self {
        Self {
            table: Arc::new(Mutex::new(processors)),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the table.
    pub fn snapshot(&self) -> Vec<LogicalProcessor> {
        self.table.lock().clone()
    }

    pub fn get(&self, index: usize) -> Option<LogicalProcessor> {
        self.table.lock().iter().find(|p| p.index == index).copied()
    }

    /// First processor that could take work, without claiming it.
    pub fn first_available(&self) -> Option<usize> {
        self.table
            .lock()
            .iter()
            .find(|p| p.is_available())
            .map(|p| p.index)
    }

    /// Claim the first idle application processor and mark it working.
    pub fn claim(&self) -> Option<usize> {
        let mut table = self.table.lock();
        let slot = table.iter_mut().find(|p| p.is_available())?;
        slot.is_working = true;
        Some(slot.index)
    }

    /// Mark `index` idle. Returns whether it was working.
    pub fn release(&self, index: usize) -> bool {
        let mut table = self.table.lock();
        match table.iter_mut().find(|p| p.index == index) {
            Some(p) => core::mem::replace(&mut p.is_working, false),
            None => false,
        }
    }

    pub fn working_count(&self) -> usize {
        self.table.lock().iter().filter(|p| p.is_working).count()
    }

    /// Non-bootstrap, enabled processors.
    pub fn worker_capacity(&self) -> usize {
        self.table
            .lock()
            .iter()
            .filter(|p| !p.is_bootstrap && p.is_enabled)
            .count()
    }

    /// Swap in fresh firmware flags, keeping every `is_working` bit.
    fn apply_status(&self, statuses: &[(usize, StatusFlags)]) {
        let mut table = self.table.lock();
        let fresh: Vec<LogicalProcessor> = statuses
            .iter()
            .map(|&(index, flags)| {
                let working = table
                    .iter()
                    .find(|p| p.index == index)
                    .map(|p| p.is_working)
                    .unwrap_or(false);
                LogicalProcessor::from_status(index, flags, working)
            })
            .collect();
        *table = fresh;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════

/// Processor registry. Lives on the BSP; threads only see its [`WorkingSet`].
pub struct ProcessorRegistry<M: MpServices> {
    mp: Option<M>,
    bootstrap: Option<usize>,
    set: WorkingSet,
}

impl<M: MpServices> ProcessorRegistry<M> {
    /// Registry with threading disabled. Everything runs on the caller.
    pub fn disabled() -> Self {
        Self {
            mp: None,
            bootstrap: None,
            set: WorkingSet::empty(),
        }
    }

    /// Enumerate processors through firmware.
    ///
    /// Never fails: a missing protocol or a failed enumeration disables
    /// threading and the loader carries on single-threaded.
    pub fn initialize(mp: Option<M>) -> Self {
        let Some(mp) = mp else {
            warn!("MP services unavailable, running single-threaded");
            return Self::disabled();
        };

        if !cfg!(feature = "smp") {
            debug!("smp feature off, ignoring MP services");
            return Self::disabled();
        }

        match Self::enumerate(&mp) {
            Ok((bootstrap, processors)) => {
                debug!(
                    "registry: {} processors, BSP #{}",
                    processors.len(),
                    bootstrap
                );
                Self {
                    mp: Some(mp),
                    bootstrap: Some(bootstrap),
                    set: WorkingSet::new(processors),
                }
            }
            Err(err) => {
                warn!("processor enumeration failed ({}), multiprocessing disabled", err);
                Self::disabled()
            }
        }
    }

    fn enumerate(mp: &M) -> Result<(usize, Vec<LogicalProcessor>), MpError> {
        let counts = mp.processor_counts()?;
        debug!(
            "found {} processors ({} enabled)",
            counts.total, counts.enabled
        );

        let bootstrap = mp.who_am_i()?;
        let mut processors = Vec::with_capacity(counts.total);

        for index in 0..counts.total {
            let flags = match mp.processor_status(index) {
                Ok(flags) => flags,
                Err(MpError::NotFound) => {
                    warn!("processor #{} does not exist, skipping", index);
                    continue;
                }
                Err(err) => return Err(err),
            };

            if !flags.is_bootstrap() {
                match mp.enable_processor(index, true) {
                    Ok(()) => debug!("enabled AP #{}", index),
                    Err(err) => warn!("could not enable AP #{}: {}", index, err),
                }
            }

            let flags = mp.processor_status(index).unwrap_or(flags);
            debug!(
                "  #{} {} / {} / {}",
                index,
                if flags.is_bootstrap() { "BSP" } else { "AP" },
                if flags.is_enabled() { "enabled" } else { "disabled" },
                if flags.is_healthy() { "healthy" } else { "unhealthy" },
            );
            processors.push(LogicalProcessor::from_status(index, flags, false));
        }

        Ok((bootstrap, processors))
    }

    /// Re-read firmware flags. The table is left untouched on failure.
    pub fn refresh(&self) -> Result<(), MpError> {
        let Some(mp) = self.mp.as_ref() else {
            return Ok(());
        };

        let indices: Vec<usize> = self.set.snapshot().iter().map(|p| p.index).collect();
        let mut statuses = Vec::with_capacity(indices.len());
        for index in indices {
            let flags = mp.processor_status(index).map_err(|_| MpError::Aborted)?;
            statuses.push((index, flags));
        }

        self.set.apply_status(&statuses);
        Ok(())
    }

    /// True when at least one application processor can run work.
    pub fn is_threading_enabled(&self) -> bool {
        self.mp.is_some() && self.thread_limit() > 0
    }

    /// Processors known to the registry, BSP included.
    pub fn processor_count(&self) -> usize {
        self.set.len()
    }

    /// How many threads can run at once. The BSP never runs one.
    pub fn thread_limit(&self) -> usize {
        if self.mp.is_none() {
            return 0;
        }
        self.set.worker_capacity()
    }

    pub fn bootstrap_index(&self) -> Option<usize> {
        self.bootstrap
    }

    pub fn processor(&self, index: usize) -> Option<LogicalProcessor> {
        self.set.get(index)
    }

    /// First idle application processor, without claiming it.
    pub fn available_processor(&self) -> Option<usize> {
        self.set.first_available()
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.set
    }

    /// Hand `task` to firmware on an already-claimed processor.
    pub fn launch(
        &self,
        index: usize,
        task: ApTask,
        completion: CompletionSignal,
    ) -> Result<(), MpError> {
        match self.mp.as_ref() {
            Some(mp) => mp.startup_this_ap(index, task, completion),
            None => Err(MpError::Unsupported),
        }
    }

    /// Yield to firmware. No-op when MP services are absent.
    pub fn stall(&self, microseconds: u64) {
        if let Some(mp) = self.mp.as_ref() {
            mp.stall(microseconds);
        }
    }
}
