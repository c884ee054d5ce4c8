//! Tests for the `crypt` module

use super::crypt::{AesCfb, AES_KEY_LEN};

const KEY: &[u8] = b"0123456789abcdef";
const IV: [u8; AES_KEY_LEN] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
];

const PLAIN: &[u8] = b"Hello, mmap with AES CFB 128. This line crosses several cipher blocks.";

#[test]
fn test_roundtrip_with_fresh_instances() {
    let mut data = PLAIN.to_vec();

    AesCfb::with_iv(KEY, &IV).encrypt(&mut data);
    assert_ne!(data.as_slice(), PLAIN);

    AesCfb::with_iv(KEY, &IV).decrypt(&mut data);
    assert_eq!(data.as_slice(), PLAIN);
}

#[test]
fn test_chunked_stream_equals_one_shot() {
    let mut whole = PLAIN.to_vec();
    AesCfb::with_iv(KEY, &IV).encrypt(&mut whole);

    for chunk_size in [1usize, 7, 16, 33] {
        let mut chunked = PLAIN.to_vec();
        let mut crypter = AesCfb::with_iv(KEY, &IV);
        for chunk in chunked.chunks_mut(chunk_size) {
            crypter.encrypt(chunk);
        }
        assert_eq!(chunked, whole, "chunk size {chunk_size} diverged");
    }
}

#[test]
fn test_decrypt_resumes_where_encrypt_left_off() {
    // a loader decrypts the existing payload, then the same instance
    // encrypts the next append; a fresh reader must agree
    let (head, tail) = PLAIN.split_at(29);

    let mut stored = head.to_vec();
    AesCfb::with_iv(KEY, &IV).encrypt(&mut stored);

    let mut crypter = AesCfb::with_iv(KEY, &IV);
    let mut replay = stored.clone();
    crypter.decrypt(&mut replay);
    assert_eq!(replay, head);

    let mut appended = tail.to_vec();
    crypter.encrypt(&mut appended);
    stored.extend_from_slice(&appended);

    let mut full = stored;
    AesCfb::with_iv(KEY, &IV).decrypt(&mut full);
    assert_eq!(full.as_slice(), PLAIN);
}

#[test]
fn test_full_duplex_instances_alternate() {
    // encrypting a chunk and decrypting the resulting ciphertext leave both
    // instances holding the same register, so two peers can swap roles
    // chunk by chunk over one shared stream
    let mut crypt1 = AesCfb::with_iv(KEY, &IV);
    let mut crypt2 = AesCfb::with_iv(KEY, &IV);

    let mut decoded = Vec::new();
    for (i, chunk) in PLAIN.chunks(9).enumerate() {
        let mut buf = chunk.to_vec();
        if i % 2 == 0 {
            crypt1.encrypt(&mut buf);
            crypt2.decrypt(&mut buf);
        } else {
            crypt2.encrypt(&mut buf);
            crypt1.decrypt(&mut buf);
        }
        decoded.extend_from_slice(&buf);
    }
    assert_eq!(decoded.as_slice(), PLAIN);
}

#[test]
fn test_reset_restores_stream_start() {
    let mut crypter = AesCfb::with_iv(KEY, &IV);

    let mut first = PLAIN.to_vec();
    crypter.encrypt(&mut first);

    crypter.reset(&IV);
    let mut second = PLAIN.to_vec();
    crypter.encrypt(&mut second);

    assert_eq!(first, second);
}

#[test]
fn test_legacy_reset_seeds_from_key() {
    let mut data = PLAIN.to_vec();
    let mut crypter = AesCfb::new(KEY);
    crypter.encrypt(&mut data);

    let mut reader = AesCfb::with_iv(KEY, &IV);
    reader.reset_legacy();
    reader.decrypt(&mut data);

    assert_eq!(data.as_slice(), PLAIN);
}

#[test]
fn test_short_key_is_zero_padded() {
    let mut padded = [0u8; AES_KEY_LEN];
    padded[..5].copy_from_slice(b"short");

    let mut a = PLAIN.to_vec();
    AesCfb::with_iv(b"short", &IV).encrypt(&mut a);
    let mut b = PLAIN.to_vec();
    AesCfb::with_iv(&padded, &IV).encrypt(&mut b);

    assert_eq!(a, b);
}

#[test]
fn test_different_ivs_give_different_ciphertext() {
    let mut other_iv = IV;
    other_iv[0] ^= 0x80;

    let mut a = PLAIN.to_vec();
    AesCfb::with_iv(KEY, &IV).encrypt(&mut a);
    let mut b = PLAIN.to_vec();
    AesCfb::with_iv(KEY, &other_iv).encrypt(&mut b);

    assert_ne!(a, b);
}

#[test]
fn test_fill_random_iv_varies() {
    let mut a = [0u8; AES_KEY_LEN];
    let mut b = [0u8; AES_KEY_LEN];
    AesCfb::fill_random_iv(&mut a);
    AesCfb::fill_random_iv(&mut b);
    // 128 random bits colliding is not a thing
    assert_ne!(a, b);
}
