//! Error types for the loader core

use core::fmt;

use crows_hwinit::{MpError, ThreadError};

/// Result type for loader operations
pub type Result<T> = core::result::Result<T, LoaderError>;

/// Everything that can stop a boot attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderError {
    /// Caller bug; never retried
    InvalidArgument,

    /// No payloads, or a protocol/file is absent
    NotFound,

    /// Password check failed; re-prompt
    InvalidPassword,

    /// File smaller than header plus one cipher block
    TooShort,

    /// File length not a multiple of the cipher block
    Misaligned,

    /// Work unit already has an unfinished thread
    Busy,

    /// No processor could take queued work
    OutOfCapacity,

    /// Storage or firmware failure
    DeviceFault,

    /// Bad magic or inconsistent sealed block
    InvalidFormat,

    /// Payload written by a newer tool
    UnsupportedVersion,

    /// A worker reported failure
    DecryptFailed,
}

impl LoaderError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::NotFound => "not found",
            Self::InvalidPassword => "invalid password",
            Self::TooShort => "payload too short",
            Self::Misaligned => "payload not block aligned",
            Self::Busy => "work unit busy",
            Self::OutOfCapacity => "no processor capacity",
            Self::DeviceFault => "device fault",
            Self::InvalidFormat => "invalid payload format",
            Self::UnsupportedVersion => "unsupported payload version",
            Self::DecryptFailed => "decryption failed",
        }
    }

    /// Errors the caller may retry (after re-prompting or waiting).
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidPassword | Self::Busy | Self::OutOfCapacity
        )
    }
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ThreadError> for LoaderError {
    fn from(err: ThreadError) -> Self {
        match err {
            ThreadError::InvalidArgument => Self::InvalidArgument,
            ThreadError::AlreadyStarted => Self::Busy,
            ThreadError::AlreadyFinished | ThreadError::NotStarted => Self::InvalidArgument,
            ThreadError::OutOfCapacity => Self::OutOfCapacity,
            ThreadError::Unsupported => Self::NotFound,
            ThreadError::Firmware(err) => err.into(),
        }
    }
}

impl From<MpError> for LoaderError {
    fn from(err: MpError) -> Self {
        match err {
            MpError::Unsupported | MpError::NotFound => Self::NotFound,
            MpError::NotReady => Self::Busy,
            MpError::InvalidParameter => Self::InvalidArgument,
            MpError::DeviceError | MpError::Aborted => Self::DeviceFault,
        }
    }
}
