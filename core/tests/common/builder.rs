//! Builds encrypted payload files

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes256, Block};

use crows_core::crypto::{PayloadHasher, Sha256Hasher, BLOCK_LEN};
use crows_core::payload::format::{password_check, PayloadHeader, PayloadLayout};

pub struct PayloadBuilder {
    image: Vec<u8>,
    password: Vec<u8>,
    iv: [u8; BLOCK_LEN],
    version: Option<u16>,
    declared_len: Option<u64>,
    bad_magic: bool,
}

impl PayloadBuilder {
    pub fn new(image: &[u8], password: &[u8]) -> Self {
        Self {
            image: image.to_vec(),
            password: password.to_vec(),
            iv: *b"crows-test-iv-01",
            version: None,
            declared_len: None,
            bad_magic: false,
        }
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = Some(version);
        self
    }

    /// Lie about the image length in the sealed block.
    pub fn declared_len(mut self, len: u64) -> Self {
        self.declared_len = Some(len);
        self
    }

    pub fn bad_magic(mut self) -> Self {
        self.bad_magic = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let key = Sha256Hasher.hash(&self.password);

        let mut body = vec![0u8; PayloadLayout::SEALED_LEN];
        let len = self.declared_len.unwrap_or(self.image.len() as u64);
        body[PayloadLayout::IMAGE_LENGTH_OFFSET..PayloadLayout::IMAGE_LENGTH_OFFSET + 8]
            .copy_from_slice(&len.to_le_bytes());
        body.extend_from_slice(&self.image);
        while body.len() % BLOCK_LEN != 0 {
            body.push(0);
        }

        let check = password_check(&key, &body[..PayloadLayout::SEALED_LEN]).unwrap();
        let mut header = PayloadHeader::new(self.iv, check);
        if let Some(version) = self.version {
            header.version = version;
        }
        let mut out = header.to_bytes().to_vec();
        if self.bad_magic {
            out[0] ^= 0xFF;
        }

        encrypt_cbc(&mut body, &key, &self.iv);
        out.extend_from_slice(&body);
        out
    }
}

/// Reference AES-256-CBC encryption.
pub fn encrypt_cbc(buf: &mut [u8], key: &[u8; 32], iv: &[u8; BLOCK_LEN]) {
    let cipher = Aes256::new_from_slice(key).unwrap();
    let mut chain = *iv;
    for block in buf.chunks_exact_mut(BLOCK_LEN) {
        for (byte, prev) in block.iter_mut().zip(chain.iter()) {
            *byte ^= prev;
        }
        cipher.encrypt_block(Block::from_mut_slice(block));
        chain.copy_from_slice(block);
    }
}

/// Deterministic, non-repeating test image.
pub fn test_image(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 8)) as u8)
        .collect()
}
