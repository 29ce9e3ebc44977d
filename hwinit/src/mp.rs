//! Firmware multiprocessing surface.
//!
//! The loader never calls `EFI_MP_SERVICES_PROTOCOL` itself. Whatever owns
//! the protocol (the UEFI entry glue, or a host mock in tests) implements
//! [`MpServices`] and hands it to the registry.
//!
//! # Contract
//!
//! ```text
//! processor_counts()    GetNumberOfProcessors
//! who_am_i()            WhoAmI
//! processor_status(i)   GetProcessorInfo(i).StatusFlag
//! enable_processor(i)   EnableDisableAP(i, TRUE, healthy)
//! startup_this_ap(i)    StartupThisAP(i, task, event)   non-blocking
//! stall(us)             BS->Stall
//! ```
//!
//! `startup_this_ap` must return without waiting for the task. The
//! completion signal is fired after the task returns *if* the firmware
//! manages to deliver its event; callers must not depend on it.

use alloc::boxed::Box;
use core::fmt;

// ═══════════════════════════════════════════════════════════════════════════
// STATUS FLAGS
// ═══════════════════════════════════════════════════════════════════════════

/// Processor is the bootstrap processor.
pub const PROCESSOR_AS_BSP_BIT: u32 = 0x0000_0001;
/// Processor is enabled.
pub const PROCESSOR_ENABLED_BIT: u32 = 0x0000_0002;
/// Processor passed its health check.
pub const PROCESSOR_HEALTH_STATUS_BIT: u32 = 0x0000_0004;

/// Raw `StatusFlag` word for one processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags(pub u32);

impl StatusFlags {
    pub const fn new(bootstrap: bool, enabled: bool, healthy: bool) -> Self {
        let mut bits = 0;
        if bootstrap {
            bits |= PROCESSOR_AS_BSP_BIT;
        }
        if enabled {
            bits |= PROCESSOR_ENABLED_BIT;
        }
        if healthy {
            bits |= PROCESSOR_HEALTH_STATUS_BIT;
        }
        Self(bits)
    }

    pub const fn is_bootstrap(&self) -> bool {
        self.0 & PROCESSOR_AS_BSP_BIT != 0
    }

    pub const fn is_enabled(&self) -> bool {
        self.0 & PROCESSOR_ENABLED_BIT != 0
    }

    pub const fn is_healthy(&self) -> bool {
        self.0 & PROCESSOR_HEALTH_STATUS_BIT != 0
    }
}

/// Result of `GetNumberOfProcessors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorCounts {
    pub total: usize,
    pub enabled: usize,
}

/// Body run on an application processor.
pub type ApTask = Box<dyn FnOnce() + Send + 'static>;

/// Fired by firmware once an [`ApTask`] returns. Delivery is best effort.
pub type CompletionSignal = Box<dyn FnOnce() + Send + 'static>;

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════

/// Firmware status codes the MP surface can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpError {
    /// No MP protocol on this platform
    Unsupported,
    /// Processor handle does not exist
    NotFound,
    /// Processor is busy with a previous task
    NotReady,
    /// Called from an AP, or hardware fault
    DeviceError,
    /// Bad argument (BSP as target, short buffer, ...)
    InvalidParameter,
    /// Enumeration aborted part way through
    Aborted,
}

impl MpError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unsupported => "MP services unsupported",
            Self::NotFound => "processor not found",
            Self::NotReady => "processor busy",
            Self::DeviceError => "MP device error",
            Self::InvalidParameter => "invalid MP parameter",
            Self::Aborted => "MP enumeration aborted",
        }
    }
}

impl fmt::Display for MpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Firmware multiprocessing services.
pub trait MpServices {
    /// Number of processors known to firmware.
    fn processor_counts(&self) -> Result<ProcessorCounts, MpError>;

    /// Index of the calling processor.
    fn who_am_i(&self) -> Result<usize, MpError>;

    /// Status flags of processor `index`.
    fn processor_status(&self, index: usize) -> Result<StatusFlags, MpError>;

    /// Enable application processor `index`, marking it healthy.
    fn enable_processor(&self, index: usize, healthy: bool) -> Result<(), MpError>;

    /// Start `task` on processor `index` without waiting for it.
    ///
    /// On error the task has not run and never will.
    fn startup_this_ap(
        &self,
        index: usize,
        task: ApTask,
        completion: CompletionSignal,
    ) -> Result<(), MpError>;

    /// Busy-wait for `microseconds`.
    fn stall(&self, microseconds: u64);
}

impl<T: MpServices + ?Sized> MpServices for &T {
    fn processor_counts(&self) -> Result<ProcessorCounts, MpError> {
        (**self).processor_counts()
    }

    fn who_am_i(&self) -> Result<usize, MpError> {
        (**self).who_am_i()
    }

    fn processor_status(&self, index: usize) -> Result<StatusFlags, MpError> {
        (**self).processor_status(index)
    }

    fn enable_processor(&self, index: usize, healthy: bool) -> Result<(), MpError> {
        (**self).enable_processor(index, healthy)
    }

    fn startup_this_ap(
        &self,
        index: usize,
        task: ApTask,
        completion: CompletionSignal,
    ) -> Result<(), MpError> {
        (**self).startup_this_ap(index, task, completion)
    }

    fn stall(&self, microseconds: u64) {
        (**self).stall(microseconds)
    }
}
