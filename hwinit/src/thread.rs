//! Thread Handle
//!
//! A handle binds one unit of work to one application processor.
//!
//! ```text
//!   create ──► Idle ──start──► Started ──finish──► Finished ──destroy
//!               │                                      ▲
//!               └──────────────finish──────────────────┘
//! ```
//!
//! The worker marks its own handle finished as the last thing it does. The
//! firmware completion signal calls `finish()` again; the second call is a
//! no-op. The BSP only ever observes `state` through acquire loads, so once
//! it sees `Finished` every write the worker made before finishing is
//! visible.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};

use log::{debug, warn};
use spin::Mutex;

use crate::mp::{MpError, MpServices};
use crate::processor::{ProcessorRegistry, WorkingSet};

const IDLE: u8 = 0;
const STARTED: u8 = 1;
const FINISHED: u8 = 2;

const UNASSIGNED: usize = usize::MAX;

/// Lifecycle state of a [`ThreadHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Idle,
    Started,
    Finished,
}

impl ThreadState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            IDLE => Self::Idle,
            STARTED => Self::Started,
            _ => Self::Finished,
        }
    }
}

/// Reason a unit of work gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadFault(pub &'static str);

impl fmt::Display for ThreadFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Body of a thread. Runs exactly once, on whichever processor claimed it.
pub type ThreadWork = Box<dyn FnOnce(&ThreadContext<'_>) -> Result<(), ThreadFault> + Send>;

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    /// No work supplied
    InvalidArgument,
    AlreadyStarted,
    AlreadyFinished,
    /// Joined before it was ever started
    NotStarted,
    /// Every application processor is busy
    OutOfCapacity,
    /// Threading is disabled on this machine
    Unsupported,
    /// Firmware refused to start the processor
    Firmware(MpError),
}

impl ThreadError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "thread created without work",
            Self::AlreadyStarted => "thread already started",
            Self::AlreadyFinished => "thread already finished",
            Self::NotStarted => "thread never started",
            Self::OutOfCapacity => "no idle processor",
            Self::Unsupported => "threading unsupported",
            Self::Firmware(err) => err.as_str(),
        }
    }
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Firmware(err) => write!(f, "AP startup failed: {}", err),
            other => f.write_str(other.as_str()),
        }
    }
}

impl From<MpError> for ThreadError {
    fn from(err: MpError) -> Self {
        Self::Firmware(err)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTEXT
// ═══════════════════════════════════════════════════════════════════════════

/// What a running work body can see of its own handle.
pub struct ThreadContext<'a> {
    handle: &'a ThreadHandle,
}

impl ThreadContext<'_> {
    pub fn index(&self) -> usize {
        self.handle.index
    }

    pub fn processor(&self) -> Option<usize> {
        self.handle.processor()
    }

    /// Publish how many bytes of this unit are done. Never moves backwards.
    pub fn report_progress(&self, bytes: u64) {
        self.handle.progress.fetch_max(bytes, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HANDLE
// ═══════════════════════════════════════════════════════════════════════════

pub struct ThreadHandle {
    index: usize,
    state: AtomicU8,
    processor: AtomicUsize,
    progress: AtomicU64,
    faulted: AtomicBool,
    signalled: AtomicBool,
    work: Mutex<Option<ThreadWork>>,
    working_set: Mutex<Option<WorkingSet>>,
}

impl ThreadHandle {
    /// Allocate an idle handle for work unit `index`.
    pub fn create(index: usize, work: Option<ThreadWork>) -> Result<Arc<Self>, ThreadError> {
        let work = work.ok_or(ThreadError::InvalidArgument)?;
        Ok(Arc::new(Self {
            index,
            state: AtomicU8::new(IDLE),
            processor: AtomicUsize::new(UNASSIGNED),
            progress: AtomicU64::new(0),
            faulted: AtomicBool::new(false),
            signalled: AtomicBool::new(false),
            work: Mutex::new(Some(work)),
            working_set: Mutex::new(None),
        }))
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> ThreadState {
        ThreadState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_started(&self) -> bool {
        self.state() != ThreadState::Idle
    }

    pub fn is_finished(&self) -> bool {
        self.state() == ThreadState::Finished
    }

    /// Processor the handle was bound to, once started.
    pub fn processor(&self) -> Option<usize> {
        match self.processor.load(Ordering::Acquire) {
            UNASSIGNED => None,
            cpu => Some(cpu),
        }
    }

    /// Bytes the worker has reported so far.
    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Acquire)
    }

    /// True when the work body returned an error, or the handle was
    /// finished without ever starting.
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// True once firmware delivered the completion signal.
    pub fn completion_signalled(&self) -> bool {
        self.signalled.load(Ordering::Acquire)
    }

    /// `None` until finished, then whether the work succeeded.
    pub fn exit_status(&self) -> Option<bool> {
        if self.is_finished() {
            Some(!self.is_faulted())
        } else {
            None
        }
    }

    /// Claim an idle processor and start the work on it.
    ///
    /// With `wait` set, stalls `retry_stall_us` between scans until a
    /// processor frees up. Returns the processor the work landed on.
    pub fn start<M: MpServices>(
        self: &Arc<Self>,
        registry: &ProcessorRegistry<M>,
        wait: bool,
        retry_stall_us: u64,
    ) -> Result<usize, ThreadError> {
        match self.state() {
            ThreadState::Started => return Err(ThreadError::AlreadyStarted),
            ThreadState::Finished => return Err(ThreadError::AlreadyFinished),
            ThreadState::Idle => {}
        }

        if !registry.is_threading_enabled() {
            return Err(ThreadError::Unsupported);
        }

        let set = registry.working_set();
        loop {
            // Firmware may have disabled an AP since the last scan.
            if let Err(err) = registry.refresh() {
                warn!(
                    "thread {}: processor refresh failed ({}), using cached table",
                    self.index, err
                );
            }

            let Some(cpu) = set.claim() else {
                if !wait {
                    return Err(ThreadError::OutOfCapacity);
                }
                registry.stall(retry_stall_us);
                continue;
            };

            if let Err(raw) = self.state.compare_exchange(
                IDLE,
                STARTED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                set.release(cpu);
                return Err(match raw {
                    STARTED => ThreadError::AlreadyStarted,
                    _ => ThreadError::AlreadyFinished,
                });
            }

            self.processor.store(cpu, Ordering::Release);
            *self.working_set.lock() = Some(set.clone());

            let runner = Arc::clone(self);
            let signaller = Arc::clone(self);
            let launched = registry.launch(
                cpu,
                Box::new(move || runner.run()),
                Box::new(move || signaller.signal()),
            );

            match launched {
                Ok(()) => {
                    debug!("thread {} started on AP #{}", self.index, cpu);
                    return Ok(cpu);
                }
                Err(err) => {
                    // The task never ran; roll the handle back so it can be retried.
                    *self.working_set.lock() = None;
                    self.processor.store(UNASSIGNED, Ordering::Release);
                    self.state.store(IDLE, Ordering::Release);
                    set.release(cpu);

                    if err != MpError::NotReady {
                        warn!("thread {}: AP #{} refused work: {}", self.index, cpu, err);
                        return Err(ThreadError::Firmware(err));
                    }
                    if !wait {
                        return Err(ThreadError::OutOfCapacity);
                    }
                    registry.stall(retry_stall_us);
                }
            }
        }
    }

    /// Execute the work body on the current processor, then finish.
    fn run(&self) {
        let work = self.work.lock().take();
        let ctx = ThreadContext { handle: self };
        let result = match work {
            Some(work) => work(&ctx),
            None => Err(ThreadFault("work already consumed")),
        };
        if result.is_err() {
            self.faulted.store(true, Ordering::Release);
        }
        self.finish();
    }

    fn signal(&self) {
        self.signalled.store(true, Ordering::Release);
        self.finish();
    }

    /// Give the processor back, then mark the handle finished.
    ///
    /// Returns false when it was already finished. The processor is released
    /// before `Finished` is published, so an observer of `Finished` never
    /// sees it still marked working. An idle handle finishes faulted: its
    /// work never ran.
    pub fn finish(&self) -> bool {
        if self.state.load(Ordering::Acquire) == IDLE {
            self.faulted.store(true, Ordering::Release);
        }
        if let Some(set) = self.working_set.lock().take() {
            if let Some(cpu) = self.processor() {
                set.release(cpu);
            }
        }
        self.state.swap(FINISHED, Ordering::AcqRel) != FINISHED
    }

    /// Busy-wait until the worker finishes. No backoff.
    pub fn join(&self) -> Result<(), ThreadError> {
        loop {
            match self.state() {
                ThreadState::Finished => return Ok(()),
                ThreadState::Idle => return Err(ThreadError::NotStarted),
                ThreadState::Started => core::hint::spin_loop(),
            }
        }
    }

    /// Release the handle. A running handle is joined first.
    pub fn destroy(self: Arc<Self>) {
        if self.state() == ThreadState::Started {
            let _ = self.join();
        }
        self.finish();
        drop(self.work.lock().take());
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("index", &self.index)
            .field("state", &self.state())
            .field("processor", &self.processor())
            .field("progress", &self.progress())
            .finish()
    }
}
