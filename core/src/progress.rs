//! Progress reporting
//!
//! `percent = floor(100 * current / total)`, clamped to 0..=100.
//! The bar has 20 cells, one per 5%.

use core::fmt;

/// Number of cells in the progress bar.
pub const BAR_CELLS: usize = 20;

/// Which part of the boot the numbers belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// Reading the payload from the volume
    Load,
    /// Decrypting the payload body
    Decrypt,
}

impl ProgressPhase {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Load => "Loading",
            Self::Decrypt => "Decrypting",
        }
    }
}

/// Receiver of progress updates.
pub trait ProgressSink {
    fn report(&mut self, phase: ProgressPhase, current: u64, total: u64);
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn report(&mut self, phase: ProgressPhase, current: u64, total: u64) {
        (**self).report(phase, current, total)
    }
}

/// Sink that drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&mut self, _phase: ProgressPhase, _current: u64, _total: u64) {}
}

/// Whole percent done. An empty total counts as done.
pub fn percent(current: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (current as u128 * 100) / total as u128;
    pct.min(100) as u8
}

/// Filled cells for `percent`.
pub const fn bar_cells(percent: u8) -> usize {
    let cells = percent as usize / 5;
    if cells > BAR_CELLS {
        BAR_CELLS
    } else {
        cells
    }
}

/// Text progress bar, redrawn in place with a carriage return.
///
/// ```text
/// \r   42% [========            ] (44040192 / 104857600)
/// ```
pub struct ProgressBar<W: fmt::Write> {
    out: W,
    last: Option<(ProgressPhase, u8)>,
}

impl<W: fmt::Write> ProgressBar<W> {
    pub fn new(out: W) -> Self {
        Self { out, last: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&mut self, current: u64, total: u64) -> fmt::Result {
        let pct = percent(current, total);
        let filled = bar_cells(pct);
        write!(self.out, "\r  {:>3}% [", pct)?;
        for cell in 0..BAR_CELLS {
            self.out.write_char(if cell < filled { '=' } else { ' ' })?;
        }
        write!(self.out, "] ({} / {})", current.min(total), total)
    }
}

impl<W: fmt::Write> ProgressSink for ProgressBar<W> {
    fn report(&mut self, phase: ProgressPhase, current: u64, total: u64) {
        let pct = percent(current, total);
        if let Some((last_phase, last_pct)) = self.last {
            // Nothing new to draw.
            if last_phase == phase && last_pct == pct {
                return;
            }
            if last_phase != phase {
                let _ = self.out.write_str("\r\n");
            }
        }
        self.last = Some((phase, pct));
        let _ = self.render(current, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::String;

    #[test]
    fn test_percent_floor_and_clamp() {
        assert_eq!(percent(0, 200), 0);
        assert_eq!(percent(199, 200), 99);
        assert_eq!(percent(200, 200), 100);
        assert_eq!(percent(500, 200), 100);
        assert_eq!(percent(5, 0), 100);
        assert_eq!(percent(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn test_bar_cells() {
        assert_eq!(bar_cells(0), 0);
        assert_eq!(bar_cells(4), 0);
        assert_eq!(bar_cells(5), 1);
        assert_eq!(bar_cells(99), 19);
        assert_eq!(bar_cells(100), 20);
    }

    #[test]
    fn test_bar_rendering() {
        let mut bar = ProgressBar::new(String::new());
        bar.report(ProgressPhase::Decrypt, 42, 100);
        assert_eq!(
            bar.into_inner(),
            "\r   42% [========            ] (42 / 100)"
        );
    }

    #[test]
    fn test_bar_skips_unchanged_percent() {
        let mut bar = ProgressBar::new(String::new());
        bar.report(ProgressPhase::Load, 10, 1000);
        bar.report(ProgressPhase::Load, 11, 1000);
        let out = bar.into_inner();
        assert_eq!(out.matches('\r').count(), 1);
    }
}
