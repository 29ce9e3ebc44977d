//! Loader configuration
//!
//! Every tunable the loader core reads lives here. The defaults match the
//! shipped loader; tests shrink the stalls and patience counts.

/// Loader tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Payload file suffix, matched case-insensitively
    pub payload_extension: &'static str,
    /// Candidates kept from one directory listing
    pub max_payloads: usize,
    /// Longest file name considered a payload
    pub max_filename_len: usize,
    /// Password bytes kept after normalization
    pub max_password_len: usize,
    /// Bytes read per load step
    pub load_chunk_len: usize,
    /// Coordinator yield between ticks (microseconds)
    pub tick_stall_us: u64,
    /// Stall between processor scans when starting a thread (microseconds)
    pub start_retry_stall_us: u64,
    /// Ticks with queued work, nothing running and no free processor
    pub start_patience_ticks: u32,
    /// Ticks after every worker finished while progress is still short
    pub settle_patience_ticks: u32,
    /// Work unit slots in the dispatcher
    pub thread_slots: usize,
    /// Loader executable hashed for the handoff hints
    pub loader_path: &'static str,
    /// Marker file identifying the decrypted filesystem
    pub canary_name: &'static str,
}

impl LoaderConfig {
    pub const fn default() -> Self {
        Self {
            payload_extension: ".CROWS",
            max_payloads: 32,
            max_filename_len: 64,
            max_password_len: 32,
            load_chunk_len: 16 * 1024,
            tick_stall_us: 50_000,
            start_retry_stall_us: 5_000,
            start_patience_ticks: 200,
            settle_patience_ticks: 40,
            thread_slots: 64,
            loader_path: "EFI\\BOOT\\BOOTX64.EFI",
            canary_name: "CROWS.CANARY",
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::default()
    }
}
