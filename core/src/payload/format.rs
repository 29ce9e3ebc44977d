//! Payload file format
//!
//! ```text
//! offset  size  field
//! 0       8     magic            "CROWSPLD"
//! 8       2     version          1 (LE)
//! 10      6     reserved         zero
//! 16      16    iv               CBC IV of the first body block
//! 32      32    check            HMAC-SHA256(key, plaintext of body block 0)
//! ---- encrypted body, AES-256-CBC ----
//! 64      16    sealed block     image_length u64 LE, 8 reserved bytes
//! 80      n     image            zero padded to a block
//! ```
//!
//! key = SHA-256(normalized password). Offsets are only spelled out in
//! [`PayloadLayout`]; everything else goes through it.

use alloc::vec::Vec;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::{Iv, Key, PayloadHasher, BLOCK_LEN, DIGEST_LEN};
use crate::error::{LoaderError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const PAYLOAD_MAGIC: [u8; 8] = *b"CROWSPLD";
pub const PAYLOAD_VERSION: u16 = 1;

// ═══════════════════════════════════════════════════════════════════════════
// LAYOUT
// ═══════════════════════════════════════════════════════════════════════════

/// Byte positions inside a payload file.
pub struct PayloadLayout;

impl PayloadLayout {
    pub const MAGIC_OFFSET: usize = 0;
    pub const VERSION_OFFSET: usize = 8;
    pub const IV_OFFSET: usize = 16;
    pub const CHECK_OFFSET: usize = 32;
    /// Plaintext header; the body starts here
    pub const HEADER_LEN: usize = 64;
    /// First body block, carries the image length
    pub const SEALED_LEN: usize = BLOCK_LEN;
    /// What the password probe reads
    pub const PROBE_LEN: usize = Self::HEADER_LEN + Self::SEALED_LEN;
    /// Image length field, relative to the decrypted body
    pub const IMAGE_LENGTH_OFFSET: usize = 0;

    /// Start of the encrypted body in the file.
    pub const fn body_offset() -> usize {
        Self::HEADER_LEN
    }

    /// Start of the image in the (decrypted) payload buffer.
    pub const fn image_offset() -> usize {
        Self::HEADER_LEN + Self::SEALED_LEN
    }

    /// Structural checks that need nothing but the file length.
    pub fn check_length(len: u64) -> Result<()> {
        if len % BLOCK_LEN as u64 != 0 {
            return Err(LoaderError::Misaligned);
        }
        if len < Self::PROBE_LEN as u64 {
            return Err(LoaderError::TooShort);
        }
        Ok(())
    }

    /// Image length recorded in the decrypted sealed block.
    ///
    /// `body` is the decrypted body (sealed block first).
    pub fn image_length(body: &[u8]) -> Result<usize> {
        let field = body
            .get(Self::IMAGE_LENGTH_OFFSET..Self::IMAGE_LENGTH_OFFSET + 8)
            .ok_or(LoaderError::TooShort)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(field);

        let len = u64::from_le_bytes(raw);
        let room = (body.len() - Self::SEALED_LEN.min(body.len())) as u64;
        if len > room {
            return Err(LoaderError::InvalidFormat);
        }
        Ok(len as usize)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HEADER
// ═══════════════════════════════════════════════════════════════════════════

/// Parsed plaintext header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    pub version: u16,
    pub iv: Iv,
    pub check: [u8; DIGEST_LEN],
}

impl PayloadHeader {
    pub fn new(iv: Iv, check: [u8; DIGEST_LEN]) -> Self {
        Self {
            version: PAYLOAD_VERSION,
            iv,
            check,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PayloadLayout::HEADER_LEN {
            return Err(LoaderError::TooShort);
        }
        let magic = &bytes[PayloadLayout::MAGIC_OFFSET..PayloadLayout::MAGIC_OFFSET + 8];
        if magic != PAYLOAD_MAGIC {
            return Err(LoaderError::InvalidFormat);
        }

        let v = PayloadLayout::VERSION_OFFSET;
        let version = u16::from_le_bytes([bytes[v], bytes[v + 1]]);
        if version != PAYLOAD_VERSION {
            return Err(LoaderError::UnsupportedVersion);
        }

        let mut iv = [0u8; BLOCK_LEN];
        iv.copy_from_slice(&bytes[PayloadLayout::IV_OFFSET..PayloadLayout::IV_OFFSET + BLOCK_LEN]);
        let mut check = [0u8; DIGEST_LEN];
        check.copy_from_slice(
            &bytes[PayloadLayout::CHECK_OFFSET..PayloadLayout::CHECK_OFFSET + DIGEST_LEN],
        );

        Ok(Self { version, iv, check })
    }

    pub fn to_bytes(&self) -> [u8; PayloadLayout::HEADER_LEN] {
        let mut out = [0u8; PayloadLayout::HEADER_LEN];
        out[PayloadLayout::MAGIC_OFFSET..PayloadLayout::MAGIC_OFFSET + 8]
            .copy_from_slice(&PAYLOAD_MAGIC);
        out[PayloadLayout::VERSION_OFFSET..PayloadLayout::VERSION_OFFSET + 2]
            .copy_from_slice(&self.version.to_le_bytes());
        out[PayloadLayout::IV_OFFSET..PayloadLayout::IV_OFFSET + BLOCK_LEN]
            .copy_from_slice(&self.iv);
        out[PayloadLayout::CHECK_OFFSET..PayloadLayout::CHECK_OFFSET + DIGEST_LEN]
            .copy_from_slice(&self.check);
        out
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PASSWORD / KEY
// ═══════════════════════════════════════════════════════════════════════════

/// Normalized password bytes. Zeroed on drop.
#[derive(PartialEq, Eq)]
pub struct Password(Zeroizing<Vec<u8>>);

impl Password {
    /// Strip trailing CR/LF and cap at `max_len` bytes.
    pub fn normalize(raw: &[u8], max_len: usize) -> Self {
        let mut end = raw.len();
        while end > 0 && matches!(raw[end - 1], b'\r' | b'\n') {
            end -= 1;
        }
        Self(Zeroizing::new(raw[..end.min(max_len)].to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// AES-256 key for this password.
    pub fn derive_key(&self, hasher: &dyn PayloadHasher) -> Key {
        hasher.hash(&self.0)
    }
}

impl core::fmt::Debug for Password {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Password(<{} bytes>)", self.0.len())
    }
}

/// Keyed check over the plaintext of body block 0.
pub fn password_check(key: &Key, sealed: &[u8]) -> Result<[u8; DIGEST_LEN]> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| LoaderError::InvalidArgument)?;
    mac.update(sealed);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Constant-time comparison of the keyed check against the header.
pub fn verify_check(key: &Key, sealed: &[u8], expected: &[u8; DIGEST_LEN]) -> Result<()> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| LoaderError::InvalidArgument)?;
    mac.update(sealed);
    mac.verify_slice(expected)
        .map_err(|_| LoaderError::InvalidPassword)
}
