//! Cipher and digest primitives
//!
//! The decryption engine only ever sees these two traits. The shipped
//! implementations wrap the RustCrypto `aes` and `sha2` crates.

use aes::cipher::{BlockDecrypt, KeyInit};
use aes::{Aes256, Block};
use sha2::{Digest as _, Sha256};

use crate::error::{LoaderError, Result};

/// AES block length
pub const BLOCK_LEN: usize = 16;
/// AES-256 key length
pub const KEY_LEN: usize = 32;
/// SHA-256 output length
pub const DIGEST_LEN: usize = 32;

pub type Key = [u8; KEY_LEN];
pub type Iv = [u8; BLOCK_LEN];
pub type Digest = [u8; DIGEST_LEN];

// ═══════════════════════════════════════════════════════════════════════════
// CIPHER
// ═══════════════════════════════════════════════════════════════════════════

/// In-place CBC decryption of a block-aligned buffer.
pub trait BlockChainCipher: Send + Sync {
    /// Decrypt `buffer` chaining from `iv`.
    ///
    /// `progress` receives the number of bytes of `buffer` finished so far;
    /// the last call always reports `buffer.len()`.
    fn decrypt_block_chain(
        &self,
        buffer: &mut [u8],
        key: &Key,
        iv: &Iv,
        progress: &mut dyn FnMut(usize),
    ) -> Result<()>;
}

/// AES-256-CBC over the `aes` crate.
#[derive(Debug, Clone, Copy)]
pub struct Aes256Cbc {
    /// Bytes between progress callbacks
    progress_stride: usize,
}

impl Aes256Cbc {
    pub const DEFAULT_STRIDE: usize = 64 * 1024;

    pub const fn new() -> Self {
        Self::with_stride(Self::DEFAULT_STRIDE)
    }

    /// `stride` is rounded up to a whole block.
    pub const fn with_stride(stride: usize) -> Self {
        let blocks = if stride < BLOCK_LEN { 1 } else { stride / BLOCK_LEN };
        Self {
            progress_stride: blocks * BLOCK_LEN,
        }
    }
}

impl Default for Aes256Cbc {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockChainCipher for Aes256Cbc {
    fn decrypt_block_chain(
        &self,
        buffer: &mut [u8],
        key: &Key,
        iv: &Iv,
        progress: &mut dyn FnMut(usize),
    ) -> Result<()> {
        if buffer.len() % BLOCK_LEN != 0 {
            return Err(LoaderError::Misaligned);
        }

        let cipher = Aes256::new_from_slice(key).map_err(|_| LoaderError::InvalidArgument)?;
        let mut chain = *iv;
        let mut done = 0usize;

        for block in buffer.chunks_exact_mut(BLOCK_LEN) {
            let mut ciphertext = [0u8; BLOCK_LEN];
            ciphertext.copy_from_slice(block);

            cipher.decrypt_block(Block::from_mut_slice(block));
            for (byte, prev) in block.iter_mut().zip(chain.iter()) {
                *byte ^= prev;
            }
            chain = ciphertext;

            done += BLOCK_LEN;
            if done % self.progress_stride == 0 {
                progress(done);
            }
        }

        if done % self.progress_stride != 0 || done == 0 {
            progress(done);
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DIGEST
// ═══════════════════════════════════════════════════════════════════════════

/// One-shot message digest.
pub trait PayloadHasher: Send + Sync {
    fn hash(&self, data: &[u8]) -> Digest;
}

/// SHA-256 over the `sha2` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl PayloadHasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> Digest {
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&Sha256::digest(data));
        out
    }
}
