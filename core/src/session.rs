//! Boot session
//!
//! The operator-facing flow, start to handoff:
//!
//! ```text
//! discover ──► select ──► password ──► probe ──► load + decrypt ──► Boot
//!                ▲            │  ▲        │
//!                └──── 'b' ───┘  └─ bad ──┘
//!
//! 'q' at either prompt ──► Shutdown
//! ```
//!
//! Selection and password mistakes are retried forever. Anything that goes
//! wrong after a password is accepted ends the session with an error.

use alloc::format;
use alloc::vec::Vec;

use crows_hwinit::MpServices;
use log::{error, info, warn};
use zeroize::Zeroize;

use crate::console::OperatorConsole;
use crate::error::{LoaderError, Result};
use crate::loader::{BootImage, Loader};
use crate::payload::discovery::{
    discover_payloads, loader_digest, require_payloads, Classification, Payload,
};
use crate::payload::format::Password;
use crate::payload::selection::{select_payload, Selection};
use crate::progress::ProgressSink;
use crate::volume::BootVolume;

/// How a session ended without an error.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Hand this image to the chain-load stage
    Boot(BootImage),
    /// Operator asked to quit; the caller reboots
    Shutdown,
}

enum Authentication {
    Accepted(Password),
    Back,
    Quit,
}

pub struct BootSession<'l, 'r, V: BootVolume, C: OperatorConsole, M: MpServices> {
    loader: &'l Loader<'r, M>,
    volume: V,
    console: C,
}

impl<'l, 'r, V: BootVolume, C: OperatorConsole, M: MpServices> BootSession<'l, 'r, V, C, M> {
    pub fn new(loader: &'l Loader<'r, M>, volume: V, console: C) -> Self {
        Self {
            loader,
            volume,
            console,
        }
    }

    pub fn console(&mut self) -> &mut C {
        &mut self.console
    }

    /// Drive the session until the operator boots something or quits.
    pub fn run(&mut self, sink: &mut dyn ProgressSink) -> Result<SessionOutcome> {
        let config = *self.loader.config();
        let loader_hash = loader_digest(&mut self.volume, &config, self.loader.hasher());

        let found = discover_payloads(&mut self.volume, &config)?;
        let classification = match require_payloads(found) {
            Ok(classification) => classification,
            Err(err) => {
                error!("no {} payload on the boot volume", config.payload_extension);
                self.console.notify(format_args!(
                    "No compatible payload was found on the boot volume."
                ));
                return Err(err);
            }
        };
        let from_menu = matches!(classification, Classification::Multiple(_));
        let mut candidates = classification.into_candidates();

        loop {
            let index = match select_payload(&candidates, &mut self.console)? {
                Selection::Chosen(index) => index,
                Selection::Quit => {
                    info!("operator quit at selection");
                    return Ok(SessionOutcome::Shutdown);
                }
            };

            let payload = &mut candidates[index];
            let password = match authenticate(self.loader, &mut self.console, payload, from_menu)? {
                Authentication::Accepted(password) => password,
                Authentication::Back => continue,
                Authentication::Quit => {
                    info!("operator quit at password prompt");
                    return Ok(SessionOutcome::Shutdown);
                }
            };

            self.console
                .notify(format_args!("Loading payload '{}'...", payload.name));
            let decrypted = self
                .loader
                .decrypt_payload(&mut payload.file, &password, sink)
                .map_err(|err| {
                    error!("'{}' failed after password accepted: {}", payload.name, err);
                    err
                })?;
            drop(password);

            return Ok(SessionOutcome::Boot(BootImage {
                payload_name: payload.name.clone(),
                payload: decrypted,
                loader_digest: loader_hash,
                canary_name: config.canary_name,
            }));
        }
    }
}

/// Prompt until a password is accepted, or the operator backs out.
fn authenticate<F, C, M>(
    loader: &Loader<'_, M>,
    console: &mut C,
    payload: &mut Payload<F>,
    from_menu: bool,
) -> Result<Authentication>
where
    F: crate::volume::PayloadFile,
    C: OperatorConsole,
    M: MpServices,
{
    let prompt = if from_menu {
        format!(
            "Enter the password for '{}' ('q' to reboot; 'b' to go back): ",
            payload.name
        )
    } else {
        format!("Enter the password for '{}' ('q' to reboot): ", payload.name)
    };
    let max_len = loader.config().max_password_len;

    loop {
        let mut line: Vec<u8> = console.read_line(&prompt, true)?;
        let password = Password::normalize(&line, max_len);
        line.zeroize();

        match password.as_bytes() {
            b"" => continue,
            b"q" => return Ok(Authentication::Quit),
            b"b" if from_menu => return Ok(Authentication::Back),
            _ => {}
        }

        match loader.probe(&mut payload.file, password.as_bytes()) {
            Ok(accepted) => return Ok(Authentication::Accepted(accepted)),
            Err(LoaderError::InvalidPassword) => {
                warn!("wrong password for '{}'", payload.name);
                console.notify(format_args!("Invalid password. Try again."));
            }
            Err(err) if from_menu && is_structural(err) => {
                warn!("'{}' is unusable: {}", payload.name, err);
                console.notify(format_args!(
                    "'{}' cannot be loaded ({}). Choose another payload.",
                    payload.name, err
                ));
                return Ok(Authentication::Back);
            }
            Err(err) => {
                error!("cannot check '{}': {}", payload.name, err);
                return Err(err);
            }
        }
    }
}

/// File-level defects: another payload may still be fine.
fn is_structural(err: LoaderError) -> bool {
    matches!(
        err,
        LoaderError::TooShort
            | LoaderError::Misaligned
            | LoaderError::InvalidFormat
            | LoaderError::UnsupportedVersion
    )
}
