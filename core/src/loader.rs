//! Payload loader
//!
//! Owns the primitives and the processor registry reference, and runs the
//! two expensive steps once a payload is chosen: the password probe and the
//! full load + parallel decrypt.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crows_hwinit::{MpServices, ProcessorRegistry};
use log::{debug, error, info};
use zeroize::Zeroize;

use crate::config::LoaderConfig;
use crate::crypto::{Aes256Cbc, BlockChainCipher, Digest, Key, PayloadHasher, Sha256Hasher};
use crate::decrypt::{BufferRegion, Coordinator, DecryptJob, Dispatcher};
use crate::error::{LoaderError, Result};
use crate::payload::format::{verify_check, Password, PayloadHeader, PayloadLayout};
use crate::progress::{ProgressPhase, ProgressSink};
use crate::verify;
use crate::volume::PayloadFile;

/// A fully decrypted payload.
pub struct DecryptedPayload {
    /// Header followed by the decrypted body
    pub buffer: Vec<u8>,
    pub image_offset: usize,
    pub image_len: usize,
    /// SHA-256 of the payload as read from the volume
    pub digest: Digest,
}

impl DecryptedPayload {
    pub fn image(&self) -> &[u8] {
        &self.buffer[self.image_offset..self.image_offset + self.image_len]
    }
}

impl core::fmt::Debug for DecryptedPayload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DecryptedPayload")
            .field("buffer_len", &self.buffer.len())
            .field("image_offset", &self.image_offset)
            .field("image_len", &self.image_len)
            .finish()
    }
}

/// What the chain-load stage receives.
#[derive(Debug)]
pub struct BootImage {
    pub payload_name: String,
    pub payload: DecryptedPayload,
    /// Hash of the loader executable, if it could be read
    pub loader_digest: Option<Digest>,
    /// Marker file the decrypted filesystem must contain
    pub canary_name: &'static str,
}

impl BootImage {
    pub fn image(&self) -> &[u8] {
        self.payload.image()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOADER
// ═══════════════════════════════════════════════════════════════════════════

pub struct Loader<'r, M: MpServices> {
    registry: &'r ProcessorRegistry<M>,
    config: LoaderConfig,
    cipher: Arc<dyn BlockChainCipher>,
    hasher: Arc<dyn PayloadHasher>,
}

impl<'r, M: MpServices> Loader<'r, M> {
    /// Loader with AES-256-CBC and SHA-256.
    pub fn new(registry: &'r ProcessorRegistry<M>, config: LoaderConfig) -> Self {
        Self::with_primitives(
            registry,
            config,
            Arc::new(Aes256Cbc::new()),
            Arc::new(Sha256Hasher),
        )
    }

    pub fn with_primitives(
        registry: &'r ProcessorRegistry<M>,
        config: LoaderConfig,
        cipher: Arc<dyn BlockChainCipher>,
        hasher: Arc<dyn PayloadHasher>,
    ) -> Self {
        Self {
            registry,
            config,
            cipher,
            hasher,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &'r ProcessorRegistry<M> {
        self.registry
    }

    pub fn hasher(&self) -> &dyn PayloadHasher {
        &*self.hasher
    }

    /// Cheap single-block password check.
    pub fn probe<F: PayloadFile>(&self, file: &mut F, raw_password: &[u8]) -> Result<Password> {
        verify::probe(file, raw_password, &self.config, &*self.cipher, &*self.hasher)
    }

    /// Load `file`, decrypt it on every usable processor, and hand it back.
    ///
    /// `password` should come from a successful [`Loader::probe`].
    pub fn decrypt_payload<F: PayloadFile>(
        &self,
        file: &mut F,
        password: &Password,
        sink: &mut dyn ProgressSink,
    ) -> Result<DecryptedPayload> {
        let size = file.size()?;
        PayloadLayout::check_length(size)?;
        let total = usize::try_from(size).map_err(|_| LoaderError::DeviceFault)?;

        let mut buffer = self.load(file, total, sink)?;
        let digest = self.hasher.hash(&buffer);
        let header = PayloadHeader::parse(&buffer)?;

        let mut key = password.derive_key(&*self.hasher);
        let result = self.decrypt_body(&mut buffer, &key, &header, sink);
        key.zeroize();
        let image_len = result?;

        info!("payload decrypted, image is {} bytes", image_len);
        Ok(DecryptedPayload {
            buffer,
            image_offset: PayloadLayout::image_offset(),
            image_len,
            digest,
        })
    }

    /// Read the whole file in chunks, reporting load progress.
    fn load<F: PayloadFile>(
        &self,
        file: &mut F,
        total: usize,
        sink: &mut dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(total).map_err(|_| {
            error!("cannot allocate {} bytes for the payload", total);
            LoaderError::DeviceFault
        })?;
        buffer.resize(total, 0);

        file.set_position(0)?;
        let chunk = self.config.load_chunk_len.max(1);
        let mut loaded = 0;
        while loaded < total {
            let end = (loaded + chunk).min(total);
            match file.read(&mut buffer[loaded..end])? {
                0 => {
                    error!("payload ended at {} of {} bytes", loaded, total);
                    return Err(LoaderError::DeviceFault);
                }
                n => loaded += n,
            }
            sink.report(ProgressPhase::Load, loaded as u64, total as u64);
        }
        sink.report(ProgressPhase::Load, total as u64, total as u64);
        debug!("loaded {} bytes", total);
        Ok(buffer)
    }

    /// Decrypt everything after the header in place. Returns the image length.
    fn decrypt_body(
        &self,
        buffer: &mut [u8],
        key: &Key,
        header: &PayloadHeader,
        sink: &mut dyn ProgressSink,
    ) -> Result<usize> {
        let body_start = PayloadLayout::body_offset();
        let body_len = buffer.len() - body_start;

        let mut dispatcher = Dispatcher::new(self.registry, Arc::clone(&self.cipher), self.config);
        let job = DecryptJob::split(
            &buffer[body_start..],
            key,
            &header.iv,
            dispatcher.parallelism(),
            false,
        )?;
        debug!(
            "decrypting {} bytes as {} unit(s), threaded: {}",
            body_len,
            job.units.len(),
            dispatcher.is_threaded()
        );

        {
            // SAFETY: `buffer` is not touched again until the dispatcher is
            // gone, and the dispatcher (directly, or through the coordinator)
            // waits for every started thread before it goes.
            let regions = unsafe { BufferRegion::carve(&mut buffer[body_start..], &job.units)? };
            for (unit, region) in job.units.iter().cloned().zip(regions) {
                dispatcher.dispatch(unit, region)?;
            }

            if dispatcher.is_threaded() {
                Coordinator::new(&mut dispatcher, body_len as u64).run(sink)?;
            } else {
                sink.report(ProgressPhase::Decrypt, body_len as u64, body_len as u64);
            }
            drop(dispatcher);
        }

        let sealed = &buffer[body_start..body_start + PayloadLayout::SEALED_LEN];
        verify_check(key, sealed, &header.check).map_err(|_| {
            error!("decrypted payload does not match its check value");
            LoaderError::DecryptFailed
        })?;

        PayloadLayout::image_length(&buffer[body_start..])
    }
}
