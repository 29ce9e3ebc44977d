//! Decryption work dispatcher
//!
//! Turns work units into thread handles parked in a fixed slot table. Nothing
//! is started here; the coordinator starts queued handles as processors free
//! up. Without threading a unit runs right away on the calling processor.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crows_hwinit::{
    MpServices, ProcessorRegistry, ThreadContext, ThreadFault, ThreadHandle, ThreadState,
    ThreadWork,
};
use log::{debug, warn};

use crate::config::LoaderConfig;
use crate::crypto::BlockChainCipher;
use crate::decrypt::job::{BufferRegion, WorkUnit};
use crate::error::{LoaderError, Result};

/// What happened to a dispatched unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Ran to completion on the caller (or had nothing to do)
    Completed,
    /// Parked in its slot, waiting for the coordinator
    Queued,
}

pub struct Dispatcher<'r, M: MpServices> {
    registry: &'r ProcessorRegistry<M>,
    cipher: Arc<dyn BlockChainCipher>,
    config: LoaderConfig,
    slots: Vec<Option<Arc<ThreadHandle>>>,
    quiet: bool,
}

impl<'r, M: MpServices> Dispatcher<'r, M> {
    pub fn new(
        registry: &'r ProcessorRegistry<M>,
        cipher: Arc<dyn BlockChainCipher>,
        config: LoaderConfig,
    ) -> Self {
        let mut slots = Vec::with_capacity(config.thread_slots);
        slots.resize_with(config.thread_slots, || None);
        Self {
            registry,
            cipher,
            config,
            slots,
            quiet: false,
        }
    }

    pub fn registry(&self) -> &'r ProcessorRegistry<M> {
        self.registry
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn is_threaded(&self) -> bool {
        self.registry.is_threading_enabled()
    }

    /// How many units a job should be cut into.
    pub fn parallelism(&self) -> usize {
        if self.is_threaded() {
            self.registry.thread_limit().min(self.slots.len()).max(1)
        } else {
            1
        }
    }

    /// Hand one unit to the engine. `region` must be the unit's bytes.
    pub fn dispatch(&mut self, unit: WorkUnit, mut region: BufferRegion) -> Result<Dispatched> {
        if region.len() != unit.len {
            return Err(LoaderError::InvalidArgument);
        }
        if unit.is_empty() {
            return Ok(Dispatched::Completed);
        }

        if !self.is_threaded() {
            debug!("unit {}: {} bytes on the BSP", unit.index, unit.len);
            // SAFETY: the caller's buffer is alive for this call and the
            // region is the only view of these bytes.
            let bytes = unsafe { region.as_mut_slice() };
            self.cipher
                .decrypt_block_chain(bytes, &unit.key, &unit.iv, &mut |_| {})?;
            return Ok(Dispatched::Completed);
        }

        let slot = self
            .slots
            .get_mut(unit.index)
            .ok_or(LoaderError::OutOfCapacity)?;

        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                warn!("unit {} still has a live thread", unit.index);
                return Err(LoaderError::Busy);
            }
        }
        if let Some(stale) = slot.take() {
            stale.destroy();
        }

        let index = unit.index;
        let len = unit.len;
        self.quiet |= unit.quiet;

        let cipher = Arc::clone(&self.cipher);
        let work: ThreadWork = alloc::boxed::Box::new(move |ctx: &ThreadContext<'_>| {
            let mut region = region;
            // SAFETY: the coordinator keeps the buffer alive until this
            // handle reports finished.
            let bytes = unsafe { region.as_mut_slice() };
            cipher
                .decrypt_block_chain(bytes, &unit.key, &unit.iv, &mut |done| {
                    ctx.report_progress(done as u64)
                })
                .map_err(|err| ThreadFault(err.as_str()))
        });

        *slot = Some(ThreadHandle::create(index, Some(work))?);
        debug!("unit {}: {} bytes queued", index, len);
        Ok(Dispatched::Queued)
    }

    /// True when any dispatched unit asked for silence.
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Live handles, in slot order.
    pub fn handles(&self) -> impl Iterator<Item = &Arc<ThreadHandle>> {
        self.slots.iter().flatten()
    }

    pub fn handle(&self, index: usize) -> Option<&Arc<ThreadHandle>> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn has_work(&self) -> bool {
        self.handles().next().is_some()
    }

    /// Wait for every running handle, then drop all of them.
    ///
    /// Queued handles never ran and are simply discarded.
    pub fn drain(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(handle) = slot.take() {
                if handle.state() == ThreadState::Started {
                    let _ = handle.join();
                }
                handle.destroy();
            }
        }
        self.quiet = false;
    }
}

impl<M: MpServices> Drop for Dispatcher<'_, M> {
    fn drop(&mut self) {
        self.drain();
    }
}
