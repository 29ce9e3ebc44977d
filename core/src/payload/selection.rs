//! Payload selection
//!
//! Resolution order for one line of operator input:
//!
//! ```text
//! 1. quit sentinel ("q" / "quit")
//! 2. exact name, case-insensitive
//! 3. unique case-insensitive prefix
//! 4. otherwise ambiguous / not found, ask again
//! ```

use log::{debug, info};

use crate::console::OperatorConsole;
use crate::error::{LoaderError, Result};
use crate::payload::discovery::Payload;

const SELECT_PROMPT: &str = "Which payload? ('q' to quit and reboot): ";

/// Outcome of matching one line against the candidate names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Quit,
    Selected(usize),
    /// Prefix matched this many candidates
    Ambiguous(usize),
    NotFound,
    /// Blank line
    Empty,
}

/// What `select_payload` settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Chosen(usize),
    Quit,
}

/// Strip the line terminator and surrounding blanks.
fn clean_line(raw: &[u8]) -> &[u8] {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &raw[start..end]
}

pub fn is_quit(input: &[u8]) -> bool {
    input.eq_ignore_ascii_case(b"q") || input.eq_ignore_ascii_case(b"quit")
}

/// Match `input` against `names`.
pub fn resolve_choice<'a, I>(names: I, input: &[u8]) -> Choice
where
    I: IntoIterator<Item = &'a str>,
{
    let input = clean_line(input);
    if input.is_empty() {
        return Choice::Empty;
    }
    if is_quit(input) {
        return Choice::Quit;
    }

    let mut partial = None;
    let mut partial_count = 0;
    for (index, name) in names.into_iter().enumerate() {
        let name = name.as_bytes();
        if name.eq_ignore_ascii_case(input) {
            return Choice::Selected(index);
        }
        if name.len() > input.len() && name[..input.len()].eq_ignore_ascii_case(input) {
            partial = Some(index);
            partial_count += 1;
        }
    }

    match (partial_count, partial) {
        (1, Some(index)) => Choice::Selected(index),
        (0, _) => Choice::NotFound,
        (count, _) => Choice::Ambiguous(count),
    }
}

/// Ask the operator which payload to load until the answer is unambiguous.
///
/// A single candidate is chosen without asking.
pub fn select_payload<F, C: OperatorConsole>(
    candidates: &[Payload<F>],
    console: &mut C,
) -> Result<Selection> {
    match candidates.len() {
        0 => return Err(LoaderError::NotFound),
        1 => {
            info!("loading sole payload '{}'", candidates[0].name);
            return Ok(Selection::Chosen(0));
        }
        _ => {}
    }

    console.notify(format_args!(
        "Multiple payloads were discovered. Choose one to load by typing its name."
    ));
    console.notify(format_args!(
        "   You can also type the first few unique characters of a payload to select it."
    ));
    for payload in candidates {
        console.notify(format_args!("  - {}", payload.name));
    }

    loop {
        let line = console.read_line(SELECT_PROMPT, false)?;
        let choice = resolve_choice(candidates.iter().map(|p| p.name.as_str()), &line);
        debug!("selection input resolved to {:?}", choice);

        match choice {
            Choice::Empty => continue,
            Choice::Quit => return Ok(Selection::Quit),
            Choice::Selected(index) => {
                info!("selected payload '{}'", candidates[index].name);
                return Ok(Selection::Chosen(index));
            }
            Choice::Ambiguous(count) => console.notify(format_args!(
                "    {} payloads start with that name. Type more of it.",
                count
            )),
            Choice::NotFound => console.notify(format_args!(
                "    The selected payload name was not found. Try again."
            )),
        }
    }
}
