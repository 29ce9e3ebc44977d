//! Cipher doubles for engine tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crows_core::crypto::{Aes256Cbc, BlockChainCipher, Iv, Key};
use crows_core::{LoaderError, Result};

/// Real AES-256-CBC that counts how often it was asked to work.
#[derive(Clone, Default)]
pub struct CountingCipher {
    inner: Aes256Cbc,
    calls: Arc<AtomicUsize>,
}

impl CountingCipher {
    pub fn new(stride: usize) -> Self {
        Self {
            inner: Aes256Cbc::with_stride(stride),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BlockChainCipher for CountingCipher {
    fn decrypt_block_chain(
        &self,
        buffer: &mut [u8],
        key: &Key,
        iv: &Iv,
        progress: &mut dyn FnMut(usize),
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decrypt_block_chain(buffer, key, iv, progress)
    }
}

/// Decrypts correctly but never reports progress.
pub struct SilentCipher;

impl BlockChainCipher for SilentCipher {
    fn decrypt_block_chain(
        &self,
        buffer: &mut [u8],
        key: &Key,
        iv: &Iv,
        _progress: &mut dyn FnMut(usize),
    ) -> Result<()> {
        Aes256Cbc::new().decrypt_block_chain(buffer, key, iv, &mut |_| {})
    }
}

/// Gives up halfway through every unit.
pub struct FailingCipher;

impl BlockChainCipher for FailingCipher {
    fn decrypt_block_chain(
        &self,
        buffer: &mut [u8],
        _key: &Key,
        _iv: &Iv,
        progress: &mut dyn FnMut(usize),
    ) -> Result<()> {
        progress(buffer.len() / 2);
        Err(LoaderError::DeviceFault)
    }
}
