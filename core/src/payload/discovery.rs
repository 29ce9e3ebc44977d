//! Payload discovery
//!
//! Only the root directory of the boot volume is searched.

use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::crypto::{Digest, PayloadHasher};
use crate::error::{LoaderError, Result};
use crate::volume::{read_to_end, BootVolume, PayloadFile};

/// How a payload came to be the one loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Only candidate on the volume
    Sole,
    /// Picked by name from a menu
    MultiSelect,
}

/// An encrypted candidate boot image, opened for reading.
pub struct Payload<F> {
    pub name: String,
    pub size: u64,
    pub file: F,
    pub origin: Origin,
}

impl<F> core::fmt::Debug for Payload<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Payload")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Result of listing the volume.
pub enum Classification<F> {
    None,
    Single(Payload<F>),
    Multiple(Vec<Payload<F>>),
}

impl<F> Classification<F> {
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Single(_) => 1,
            Self::Multiple(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Candidate list, with origins already set.
    pub fn into_candidates(self) -> Vec<Payload<F>> {
        match self {
            Self::None => Vec::new(),
            Self::Single(payload) => alloc::vec![payload],
            Self::Multiple(list) => list,
        }
    }
}

/// Case-insensitive suffix match. The name must be longer than the suffix.
pub fn has_payload_extension(name: &str, extension: &str) -> bool {
    let (name, ext) = (name.as_bytes(), extension.as_bytes());
    name.len() > ext.len() && name[name.len() - ext.len()..].eq_ignore_ascii_case(ext)
}

/// List payload candidates in the volume's root directory.
pub fn discover_payloads<V: BootVolume>(
    volume: &mut V,
    config: &LoaderConfig,
) -> Result<Classification<V::File>> {
    let entries = volume.root_entries()?;
    debug!(
        "scanning {} root entries, up to {} payloads",
        entries.len(),
        config.max_payloads
    );

    let mut found = Vec::new();
    for entry in entries {
        if found.len() >= config.max_payloads {
            warn!("payload limit {} reached, ignoring the rest", config.max_payloads);
            break;
        }
        if entry.is_directory
            || entry.name.len() > config.max_filename_len
            || !has_payload_extension(&entry.name, config.payload_extension)
        {
            continue;
        }

        let mut file = volume.open(&entry.name)?;
        let size = file.size()?;
        info!("discovered '{}' ({} bytes)", entry.name, size);
        found.push(Payload {
            name: entry.name,
            size,
            file,
            origin: Origin::Sole,
        });
    }

    Ok(match found.len() {
        0 => Classification::None,
        1 => Classification::Single(found.remove(0)),
        _ => {
            for payload in found.iter_mut() {
                payload.origin = Origin::MultiSelect;
            }
            Classification::Multiple(found)
        }
    })
}

/// Hash the loader executable for the handoff hints.
///
/// Failure only costs the hint, so it is logged and swallowed.
pub fn loader_digest<V: BootVolume>(
    volume: &mut V,
    config: &LoaderConfig,
    hasher: &dyn PayloadHasher,
) -> Option<Digest> {
    let image = volume
        .open(config.loader_path)
        .and_then(|mut file| read_to_end(&mut file));
    match image {
        Ok(bytes) => Some(hasher.hash(&bytes)),
        Err(err) => {
            warn!("could not hash '{}': {}", config.loader_path, err);
            None
        }
    }
}

/// `NotFound` for an empty classification, the classification otherwise.
pub fn require_payloads<F>(classification: Classification<F>) -> Result<Classification<F>> {
    if classification.is_empty() {
        return Err(LoaderError::NotFound);
    }
    Ok(classification)
}
