//! Processor Layer
//!
//! Everything the loader knows about the machine's logical processors.
//!
//! # Architecture
//!
//! ```text
//! UEFI entry glue:
//!   - owns EFI_MP_SERVICES_PROTOCOL
//!   - implements MpServices
//!
//! This crate:
//!   - ProcessorRegistry   enumerate, enable, track busy processors
//!   - ThreadHandle        one unit of work on one AP
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use crows_hwinit::{ProcessorRegistry, ThreadHandle};
//!
//! let registry = ProcessorRegistry::initialize(mp);
//! if registry.is_threading_enabled() {
//!     let handle = ThreadHandle::create(0, Some(work))?;
//!     handle.start(&registry, true, 5_000)?;
//!     handle.join()?;
//! }
//! ```
//!
//! # What This Crate Does NOT Do
//!
//! - Scheduling or preemption
//! - Interrupt-driven wakeups
//! - Talking to firmware directly

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod mp;
pub mod processor;
pub mod thread;

// ═══════════════════════════════════════════════════════════════════════════
// MP RE-EXPORTS
// ═══════════════════════════════════════════════════════════════════════════

pub use mp::{
    ApTask, CompletionSignal, MpError, MpServices, ProcessorCounts, StatusFlags,
    PROCESSOR_AS_BSP_BIT, PROCESSOR_ENABLED_BIT, PROCESSOR_HEALTH_STATUS_BIT,
};

// ═══════════════════════════════════════════════════════════════════════════
// REGISTRY RE-EXPORTS
// ═══════════════════════════════════════════════════════════════════════════

pub use processor::{LogicalProcessor, ProcessorRegistry, WorkingSet};

// ═══════════════════════════════════════════════════════════════════════════
// THREAD RE-EXPORTS
// ═══════════════════════════════════════════════════════════════════════════

pub use thread::{ThreadContext, ThreadError, ThreadFault, ThreadHandle, ThreadState, ThreadWork};
