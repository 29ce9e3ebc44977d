//! Decryption jobs and work units
//!
//! A job covers the encrypted body of one payload. It is cut into
//! block-aligned, disjoint work units; each unit carries its own copy of the
//! key and the IV that CBC needs to start mid-stream, which is simply the
//! ciphertext block in front of it. That block has to be captured before
//! anyone decrypts in place, so `split` runs on the untouched ciphertext.

use alloc::vec::Vec;
use core::marker::PhantomData;

use log::debug;
use zeroize::Zeroize;

use crate::crypto::{Iv, Key, BLOCK_LEN};
use crate::error::{LoaderError, Result};

// ═══════════════════════════════════════════════════════════════════════════
// WORK UNIT
// ═══════════════════════════════════════════════════════════════════════════

/// One decryption task: a byte range of the job plus key material.
#[derive(Clone)]
pub struct WorkUnit {
    /// Slot / thread index
    pub index: usize,
    /// Start of the range, relative to the job buffer
    pub offset: usize,
    pub len: usize,
    /// Do not report intermediate progress for this unit
    pub quiet: bool,
    pub key: Key,
    /// IV for exactly this range
    pub iv: Iv,
}

impl WorkUnit {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for WorkUnit {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl core::fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("index", &self.index)
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("quiet", &self.quiet)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// JOB
// ═══════════════════════════════════════════════════════════════════════════

pub struct DecryptJob {
    pub total_len: usize,
    pub units: Vec<WorkUnit>,
}

impl DecryptJob {
    /// Cut `ciphertext` into at most `parts` units.
    ///
    /// Units are as even as whole blocks allow; earlier units get the
    /// remainder. An empty buffer yields one empty unit.
    pub fn split(
        ciphertext: &[u8],
        key: &Key,
        iv: &Iv,
        parts: usize,
        quiet: bool,
    ) -> Result<Self> {
        let total_len = ciphertext.len();
        if total_len % BLOCK_LEN != 0 {
            return Err(LoaderError::Misaligned);
        }

        let blocks = total_len / BLOCK_LEN;
        let parts = parts.max(1).min(blocks.max(1));
        let per_unit = blocks / parts;
        let remainder = blocks % parts;

        let mut units = Vec::with_capacity(parts);
        let mut offset = 0;
        for index in 0..parts {
            let unit_blocks = per_unit + usize::from(index < remainder);
            let len = unit_blocks * BLOCK_LEN;

            let mut unit_iv = *iv;
            if offset > 0 {
                unit_iv.copy_from_slice(&ciphertext[offset - BLOCK_LEN..offset]);
            }

            units.push(WorkUnit {
                index,
                offset,
                len,
                quiet,
                key: *key,
                iv: unit_iv,
            });
            offset += len;
        }

        debug!("split {} bytes into {} units", total_len, units.len());
        Ok(Self { total_len, units })
    }

    /// True when any unit asked for silence.
    pub fn is_quiet(&self) -> bool {
        self.units.iter().any(|u| u.quiet)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// BUFFER REGION
// ═══════════════════════════════════════════════════════════════════════════

/// Exclusive window into a job buffer, movable to another processor.
///
/// Carries no lifetime so it can ride inside a `'static` thread body. The
/// creator guarantees the buffer stays alive and untouched until every
/// thread holding a region has finished.
pub struct BufferRegion {
    ptr: *mut u8,
    len: usize,
    _marker: PhantomData<[u8]>,
}

// SAFETY: a region is the only handle to its bytes (see `carve`).
unsafe impl Send for BufferRegion {}

impl BufferRegion {
    /// Cut one disjoint region per unit out of `buffer`.
    ///
    /// # Safety
    ///
    /// `buffer` must outlive every returned region and must not be read or
    /// written through any other path until all of them are dropped or
    /// their threads have finished.
    pub unsafe fn carve(buffer: &mut [u8], units: &[WorkUnit]) -> Result<Vec<Self>> {
        let mut regions = Vec::with_capacity(units.len());
        let mut cursor = 0;
        for unit in units {
            if unit.offset != cursor || unit.end() > buffer.len() {
                return Err(LoaderError::InvalidArgument);
            }
            regions.push(Self {
                // SAFETY: offset is within `buffer` (checked above).
                ptr: unsafe { buffer.as_mut_ptr().add(unit.offset) },
                len: unit.len,
                _marker: PhantomData,
            });
            cursor = unit.end();
        }
        Ok(regions)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of this region.
    ///
    /// # Safety
    ///
    /// Same contract as [`BufferRegion::carve`]: the backing buffer is alive
    /// and nobody else touches these bytes.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}
