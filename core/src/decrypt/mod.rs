//! Multiprocessor decryption engine
//!
//! ```text
//! DecryptJob::split ──► Dispatcher::dispatch ──► Coordinator::run
//!   (work units)          (slot table)            (start, aggregate, wait)
//! ```

pub mod coordinator;
pub mod dispatcher;
pub mod job;

pub use coordinator::{Coordinator, Tick, TickStats};
pub use dispatcher::{Dispatched, Dispatcher};
pub use job::{BufferRegion, DecryptJob, WorkUnit};
