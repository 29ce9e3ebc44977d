//! CROWS Loader Core
//!
//! Password-gated, multiprocessor payload decryption for the CROWS boot
//! stage. Designed to be no_std compatible.
//!
//! # Flow
//!
//! ```text
//! discover_payloads ─► select_payload ─► Loader::probe ─► Loader::decrypt_payload
//!   (volume root)        (operator)        (1 block)        (all APs)
//! ```
//!
//! [`session::BootSession`] strings these together for the firmware entry
//! point; the pieces are public for callers that want their own flow.

#![cfg_attr(not(test), no_std)]
#![allow(clippy::new_without_default)]

extern crate alloc;

pub mod config;
pub mod console;
pub mod crypto;
pub mod decrypt;
pub mod error;
pub mod loader;
pub mod logger;
pub mod payload;
pub mod progress;
pub mod session;
pub mod verify;
pub mod volume;

// ═══════════════════════════════════════════════════════════════════════════
// RE-EXPORTS
// ═══════════════════════════════════════════════════════════════════════════

pub use config::LoaderConfig;
pub use console::OperatorConsole;
pub use error::{LoaderError, Result};
pub use loader::{BootImage, DecryptedPayload, Loader};
pub use payload::{discover_payloads, select_payload, Classification, Payload, PayloadLayout};
pub use progress::{NullSink, ProgressBar, ProgressPhase, ProgressSink};
pub use session::{BootSession, SessionOutcome};
pub use volume::{BootVolume, DirEntry, PayloadFile};

pub use crows_hwinit as hwinit;
