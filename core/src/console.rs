//! Operator console surface
//!
//! Line editing, echo and masking belong to whoever implements this; the
//! loader only sees finished lines of raw bytes.

use alloc::vec::Vec;
use core::fmt;

use crate::error::Result;

pub trait OperatorConsole {
    /// Show `prompt` and read one line. `secret` asks for masked echo.
    ///
    /// The returned bytes may still carry the terminating CR/LF.
    fn read_line(&mut self, prompt: &str, secret: bool) -> Result<Vec<u8>>;

    /// Print one line to the operator.
    fn notify(&mut self, message: fmt::Arguments<'_>);
}

impl<C: OperatorConsole + ?Sized> OperatorConsole for &mut C {
    fn read_line(&mut self, prompt: &str, secret: bool) -> Result<Vec<u8>> {
        (**self).read_line(prompt, secret)
    }

    fn notify(&mut self, message: fmt::Arguments<'_>) {
        (**self).notify(message)
    }
}
