//! Common test utilities: a host-threaded stand-in for firmware MP services

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crows_hwinit::{
    ApTask, CompletionSignal, MpError, MpServices, ProcessorCounts, StatusFlags,
};

/// Per-processor firmware view. `None` means the index does not exist.
type Slot = Option<StatusFlags>;

struct FakeState {
    processors: Mutex<Vec<Slot>>,
    bootstrap: usize,
    /// AP is executing a task
    active: Mutex<Vec<bool>>,
    refuse_enable: AtomicBool,
    fail_counts: AtomicBool,
    fail_status_after: Mutex<Option<usize>>,
    status_reads: AtomicUsize,
    flaky_completion: AtomicBool,
    startup_failures: Mutex<VecDeque<MpError>>,
    launches: AtomicUsize,
    stalls: AtomicUsize,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

/// Firmware MP mock. Each startup runs the task on a fresh `std::thread`.
#[derive(Clone)]
pub struct FakeMp {
    state: Arc<FakeState>,
}

impl FakeMp {
    /// `count` processors, #0 is the BSP, everything enabled and healthy.
    pub fn new(count: usize) -> Self {
        let processors = (0..count)
            .map(|i| Some(StatusFlags::new(i == 0, true, true)))
            .collect();
        Self {
            state: Arc::new(FakeState {
                processors: Mutex::new(processors),
                bootstrap: 0,
                active: Mutex::new(vec![false; count]),
                refuse_enable: AtomicBool::new(false),
                fail_counts: AtomicBool::new(false),
                fail_status_after: Mutex::new(None),
                status_reads: AtomicUsize::new(0),
                flaky_completion: AtomicBool::new(false),
                startup_failures: Mutex::new(VecDeque::new()),
                launches: AtomicUsize::new(0),
                stalls: AtomicUsize::new(0),
                threads: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn set_status(&self, index: usize, flags: StatusFlags) -> &Self {
        self.state.processors.lock().unwrap()[index] = Some(flags);
        self
    }

    /// Report `index` as not present.
    pub fn remove(&self, index: usize) -> &Self {
        self.state.processors.lock().unwrap()[index] = None;
        self
    }

    pub fn refuse_enable(&self) -> &Self {
        self.state.refuse_enable.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_counts(&self) -> &Self {
        self.state.fail_counts.store(true, Ordering::SeqCst);
        self
    }

    /// Status reads beyond the first `reads` fail with `DeviceError`.
    pub fn fail_status_after(&self, reads: usize) -> &Self {
        self.state.status_reads.store(0, Ordering::SeqCst);
        *self.state.fail_status_after.lock().unwrap() = Some(reads);
        self
    }

    /// Never deliver completion signals.
    pub fn flaky_completion(&self) -> &Self {
        self.state.flaky_completion.store(true, Ordering::SeqCst);
        self
    }

    /// Fail the next startup call with `err`.
    pub fn fail_next_startup(&self, err: MpError) -> &Self {
        self.state.startup_failures.lock().unwrap().push_back(err);
        self
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn stalls(&self) -> usize {
        self.state.stalls.load(Ordering::SeqCst)
    }

    /// Wait for every spawned AP thread to exit.
    pub fn join_all(&self) {
        let threads: Vec<_> = self.state.threads.lock().unwrap().drain(..).collect();
        for thread in threads {
            thread.join().expect("AP thread panicked");
        }
    }
}

impl MpServices for FakeMp {
    fn processor_counts(&self) -> Result<ProcessorCounts, MpError> {
        if self.state.fail_counts.load(Ordering::SeqCst) {
            return Err(MpError::DeviceError);
        }
        let processors = self.state.processors.lock().unwrap();
        Ok(ProcessorCounts {
            total: processors.len(),
            enabled: processors
                .iter()
                .flatten()
                .filter(|f| f.is_enabled())
                .count(),
        })
    }

    fn who_am_i(&self) -> Result<usize, MpError> {
        Ok(self.state.bootstrap)
    }

    fn processor_status(&self, index: usize) -> Result<StatusFlags, MpError> {
        let reads = self.state.status_reads.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.state.fail_status_after.lock().unwrap() {
            if reads >= limit {
                return Err(MpError::DeviceError);
            }
        }
        match self.state.processors.lock().unwrap().get(index) {
            Some(Some(flags)) => Ok(*flags),
            _ => Err(MpError::NotFound),
        }
    }

    fn enable_processor(&self, index: usize, healthy: bool) -> Result<(), MpError> {
        if self.state.refuse_enable.load(Ordering::SeqCst) {
            return Err(MpError::DeviceError);
        }
        let mut processors = self.state.processors.lock().unwrap();
        match processors.get_mut(index) {
            Some(Some(flags)) if !flags.is_bootstrap() => {
                *flags = StatusFlags::new(false, true, healthy);
                Ok(())
            }
            Some(Some(_)) => Err(MpError::InvalidParameter),
            _ => Err(MpError::NotFound),
        }
    }

    fn startup_this_ap(
        &self,
        index: usize,
        task: ApTask,
        completion: CompletionSignal,
    ) -> Result<(), MpError> {
        if let Some(err) = self.state.startup_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if index == self.state.bootstrap {
            return Err(MpError::InvalidParameter);
        }
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
        self.state.stalls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_micros(microseconds.min(1_000)));
    }
}
