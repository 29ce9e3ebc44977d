//! Password probe
//!
//! Decrypts exactly one block (the sealed block) to test a password, so a
//! wrong guess costs one AES block instead of the whole payload.

use log::{debug, warn};
use zeroize::Zeroize;

use crate::config::LoaderConfig;
use crate::crypto::{BlockChainCipher, PayloadHasher, BLOCK_LEN};
use crate::error::{LoaderError, Result};
use crate::payload::format::{verify_check, Password, PayloadHeader, PayloadLayout};
use crate::volume::PayloadFile;

/// Test `raw_password` against `file`.
///
/// Length checks run before any cryptography. On success the normalized
/// password bytes are returned for the full decryption pass.
pub fn probe<F: PayloadFile>(
    file: &mut F,
    raw_password: &[u8],
    config: &LoaderConfig,
    cipher: &dyn BlockChainCipher,
    hasher: &dyn PayloadHasher,
) -> Result<Password> {
    let size = file.size()?;
    debug!("probing payload of {} bytes", size);
    PayloadLayout::check_length(size).map_err(|err| {
        warn!("payload rejected: {}", err);
        err
    })?;

    let mut head = [0u8; PayloadLayout::PROBE_LEN];
    file.read_exact_at(0, &mut head)?;
    let header = PayloadHeader::parse(&head)?;

    let password = Password::normalize(raw_password, config.max_password_len);
    let mut key = password.derive_key(hasher);

    let mut sealed = [0u8; BLOCK_LEN];
    sealed.copy_from_slice(&head[PayloadLayout::HEADER_LEN..PayloadLayout::PROBE_LEN]);
    let result = cipher
        .decrypt_block_chain(&mut sealed, &key, &header.iv, &mut |_| {})
        .and_then(|()| verify_check(&key, &sealed, &header.check));

    sealed.zeroize();
    key.zeroize();

    match result {
        Ok(()) => {
            debug!("password accepted ({} bytes)", password.len());
            Ok(password)
        }
        Err(LoaderError::InvalidPassword) => {
            warn!("password rejected");
            Err(LoaderError::InvalidPassword)
        }
        Err(err) => Err(err),
    }
}
