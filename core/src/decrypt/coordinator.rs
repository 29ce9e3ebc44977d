//! Spin-wait coordinator
//!
//! The BSP parks here while application processors decrypt. One tick is:
//!
//! ```text
//! schedule   start queued handles on newly idle processors
//! aggregate  sum per-handle progress, report it
//! decide     complete / fail / keep waiting
//! ```
//!
//! and the caller stalls between ticks. The job is complete only when every
//! handle is finished *and* the summed progress reached the total.
//!
//! The coordinator never returns while a started handle is still running:
//! the workers write straight into the caller's buffer.

use log::{debug, error, warn};

use crows_hwinit::{MpServices, ThreadError, ThreadState};

use crate::decrypt::dispatcher::Dispatcher;
use crate::error::{LoaderError, Result};
use crate::progress::{ProgressPhase, ProgressSink};

/// Result of one coordinator tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Pending,
    Complete,
}

/// Snapshot of the slot table taken during a tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub queued: usize,
    pub running: usize,
    pub finished: usize,
    pub faulted: usize,
    pub started_now: usize,
    /// Summed progress, clamped to the total
    pub progress: u64,
}

pub struct Coordinator<'d, 'r, M: MpServices> {
    dispatcher: &'d mut Dispatcher<'r, M>,
    total: u64,
    /// Highest progress reported so far
    reported: u64,
    final_reported: bool,
    stuck_ticks: u32,
    settle_ticks: u32,
    last: TickStats,
}

impl<'d, 'r, M: MpServices> Coordinator<'d, 'r, M> {
    pub fn new(dispatcher: &'d mut Dispatcher<'r, M>, total: u64) -> Self {
        Self {
            dispatcher,
            total,
            reported: 0,
            final_reported: false,
            stuck_ticks: 0,
            settle_ticks: 0,
            last: TickStats::default(),
        }
    }

    /// Stats from the most recent tick.
    pub fn last_stats(&self) -> TickStats {
        self.last
    }

    /// Highest progress value handed to the sink.
    pub fn reported(&self) -> u64 {
        self.reported
    }

    /// Block until every dispatched unit is done.
    pub fn run(&mut self, sink: &mut dyn ProgressSink) -> Result<()> {
        let stall = self.dispatcher.config().tick_stall_us;
        loop {
            match self.tick(sink)? {
                Tick::Complete => return Ok(()),
                Tick::Pending => self.dispatcher.registry().stall(stall),
            }
        }
    }

    /// One schedule + aggregate pass.
    pub fn tick(&mut self, sink: &mut dyn ProgressSink) -> Result<Tick> {
        let started_now = match self.schedule() {
            Ok(count) => count,
            Err(err) => return Err(self.fail(err)),
        };

        let mut stats = TickStats {
            started_now,
            ..TickStats::default()
        };
        let mut sum = 0u64;
        for handle in self.dispatcher.handles() {
            match handle.state() {
                ThreadState::Idle => stats.queued += 1,
                ThreadState::Started => stats.running += 1,
                ThreadState::Finished => {
                    stats.finished += 1;
                    if handle.is_faulted() {
                        stats.faulted += 1;
                    }
                }
            }
            sum = sum.saturating_add(handle.progress());
        }
        stats.progress = sum.min(self.total);
        self.last = stats;

        let all_finished = stats.queued == 0 && stats.running == 0;

        if stats.faulted > 0 && stats.running == 0 {
            error!("{} work unit(s) failed", stats.faulted);
            return Err(self.fail(LoaderError::DecryptFailed));
        }

        if stats.queued > 0 && stats.running == 0 && stats.started_now == 0 {
            self.stuck_ticks += 1;
            if self.stuck_ticks > self.dispatcher.config().start_patience_ticks {
                error!("{} unit(s) queued with no processor to run them", stats.queued);
                return Err(self.fail(LoaderError::OutOfCapacity));
            }
        } else {
            self.stuck_ticks = 0;
        }

        self.report(stats.progress, sink);

        if !all_finished {
            return Ok(Tick::Pending);
        }

        if stats.progress < self.total {
            self.settle_ticks += 1;
            if self.settle_ticks > self.dispatcher.config().settle_patience_ticks {
                error!(
                    "workers finished at {} of {} bytes",
                    stats.progress, self.total
                );
                return Err(self.fail(LoaderError::DecryptFailed));
            }
            return Ok(Tick::Pending);
        }

        if !self.final_reported {
            sink.report(ProgressPhase::Decrypt, self.total, self.total);
            self.final_reported = true;
        }
        debug!("all {} unit(s) finished", stats.finished);
        self.dispatcher.drain();
        Ok(Tick::Complete)
    }

    /// Start as many queued handles as there are idle processors.
    fn schedule(&mut self) -> Result<usize> {
        let registry = self.dispatcher.registry();
        let retry = self.dispatcher.config().start_retry_stall_us;
        let mut started = 0;

        for handle in self.dispatcher.handles() {
            if handle.state() != ThreadState::Idle {
                continue;
            }
            match handle.start(registry, false, retry) {
                Ok(cpu) => {
                    debug!("unit {} -> AP #{}", handle.index(), cpu);
                    started += 1;
                }
                Err(ThreadError::OutOfCapacity) => break,
                Err(err) => {
                    warn!("unit {} failed to start: {}", handle.index(), err);
                    return Err(err.into());
                }
            }
        }
        Ok(started)
    }

    /// Forward progress to the sink, never moving backwards.
    fn report(&mut self, progress: u64, sink: &mut dyn ProgressSink) {
        if progress > self.reported {
            self.reported = progress;
        }
        if !self.dispatcher.is_quiet() {
            sink.report(ProgressPhase::Decrypt, self.reported, self.total);
        }
    }

    /// Wait out running workers, discard the rest, hand back `err`.
    fn fail(&mut self, err: LoaderError) -> LoaderError {
        self.dispatcher.drain();
        err
    }
}
