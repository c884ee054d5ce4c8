//! AES-128 CFB-128 stream cipher for encryption at rest.
//!
//! The payload is encrypted as one continuous stream: the engine keeps a
//! single cipher instance positioned at the append cursor, so a load replays
//! the stream and subsequent appends continue it. CFB feeds ciphertext back
//! into the shift register, which means an instance that has *decrypted* a
//! prefix is in exactly the state needed to *encrypt* the next append.
//!
//! Input and output may alias; all operations work in place.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use rand::RngCore;

/// Key and IV length in bytes.
pub const AES_KEY_LEN: usize = 16;

/// Streaming AES-128 CFB-128 encryptor/decryptor.
pub struct AesCfb {
    key: [u8; AES_KEY_LEN],
    cipher: Aes128,
    vector: [u8; AES_KEY_LEN],
    number: usize,
}

impl AesCfb {
    /// Creates a cipher from caller key material, seeded in legacy mode (the
    /// shift register starts from the key bytes). Keys shorter than 16 bytes
    /// are zero-padded, longer ones truncated.
    #[must_use]
    pub fn new(key_material: &[u8]) -> Self {
        let mut key = [0u8; AES_KEY_LEN];
        let take = key_material.len().min(AES_KEY_LEN);
        key[..take].copy_from_slice(&key_material[..take]);
        let cipher = Aes128::new(GenericArray::from_slice(&key));
        Self {
            key,
            cipher,
            vector: key,
            number: 0,
        }
    }

    /// Creates a cipher seeded from an explicit IV.
    #[must_use]
    pub fn with_iv(key_material: &[u8], iv: &[u8; AES_KEY_LEN]) -> Self {
        let mut this = Self::new(key_material);
        this.reset(iv);
        this
    }

    /// Reseeds the shift register from `iv` and rewinds the block offset.
    pub fn reset(&mut self, iv: &[u8; AES_KEY_LEN]) {
        self.vector = *iv;
        self.number = 0;
    }

    /// Reseeds from the key bytes, for files that predate per-file random IVs.
    pub fn reset_legacy(&mut self) {
        self.vector = self.key;
        self.number = 0;
    }

    /// Returns the key this cipher was constructed with.
    #[must_use]
    pub fn key(&self) -> [u8; AES_KEY_LEN] {
        self.key
    }

    /// Encrypts `data` in place, advancing the stream position.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        self.crypt(data, false);
    }

    /// Decrypts `data` in place, advancing the stream position.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        self.crypt(data, true);
    }

    fn crypt(&mut self, data: &mut [u8], decrypt: bool) {
        let mut n = self.number;
        for byte in data {
            if n == 0 {
                let mut block = GenericArray::from(self.vector);
                self.cipher.encrypt_block(&mut block);
                self.vector = block.into();
            }
            if decrypt {
                let cipher_byte = *byte;
                *byte = cipher_byte ^ self.vector[n];
                self.vector[n] = cipher_byte;
            } else {
                let cipher_byte = *byte ^ self.vector[n];
                self.vector[n] = cipher_byte;
                *byte = cipher_byte;
            }
            n = (n + 1) % AES_KEY_LEN;
        }
        self.number = n;
    }

    /// Fills `iv` from the thread RNG. One IV is generated per full rewrite
    /// and persisted in the meta file.
    pub fn fill_random_iv(iv: &mut [u8; AES_KEY_LEN]) {
        rand::thread_rng().fill_bytes(iv);
    }
}

impl std::fmt::Debug for AesCfb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never expose key material in logs
        f.debug_struct("AesCfb")
            .field("number", &self.number)
            .finish_non_exhaustive()
    }
}
