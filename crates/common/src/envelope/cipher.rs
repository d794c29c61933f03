//! AES-128-CBC + HMAC-SHA256 sealing and opening of message bodies.
//!
//! **Ordering:** `open` authenticates before it decrypts. Ciphertext whose MAC
//! does not verify is never handed to the block cipher.
//!
//! Every failure inside `open` collapses into the single
//! [`EnvelopeError::Authentication`] variant so callers cannot learn whether
//! the MAC, the base64, the IV length or the padding was at fault.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroize;

use super::keys::KeyMaterial;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Byte length of the CBC initialisation vector.
pub const IV_LEN: usize = 16;

/// Field separator of the wire string.
pub const SEPARATOR: char = '$';

/// Errors produced by the envelope layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The HMAC could not be keyed (unreachable with a well-formed [`KeyMaterial`]).
    #[error("invalid hmac key length")]
    InvalidKeyLength,

    /// The wire string is malformed, tampered with, or sealed under other keys.
    #[error("envelope failed authentication")]
    Authentication,
}

/// Seal `plaintext` under `keys` with a fresh random IV.
///
/// Returns `base64(ciphertext) $ base64(iv) $ base64(hmac)`.
///
/// # Errors
///
/// Returns [`EnvelopeError::InvalidKeyLength`] only if the MAC key is rejected
/// by the HMAC implementation.
pub fn seal(plaintext: &[u8], keys: &KeyMaterial) -> Result<String, EnvelopeError> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    seal_with_iv(plaintext, keys, iv)
}

/// Seal `plaintext` under `keys` with a caller-supplied IV.
///
/// Reusing an IV under the same cipher key leaks plaintext relationships;
/// outside of tests use [`seal`].
///
/// # Errors
///
/// See [`seal`].
pub fn seal_with_iv(
    plaintext: &[u8],
    keys: &KeyMaterial,
    iv: [u8; IV_LEN],
) -> Result<String, EnvelopeError> {
    let ciphertext = Aes128CbcEnc::new(&(*keys.cipher_key()).into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let ct_b64 = STANDARD.encode(&ciphertext);
    let iv_b64 = STANDARD.encode(iv);
    let tag = compute_mac(keys, &ct_b64, &iv_b64)?;

    Ok(format!(
        "{ct_b64}{SEPARATOR}{iv_b64}{SEPARATOR}{}",
        STANDARD.encode(tag)
    ))
}

/// Authenticate and decrypt a wire string produced by [`seal`].
///
/// # Errors
///
/// Returns [`EnvelopeError::Authentication`] for any malformed, tampered or
/// foreign-keyed input.
pub fn open(wire: &str, keys: &KeyMaterial) -> Result<Vec<u8>, EnvelopeError> {
    let mut fields = wire.split(SEPARATOR);
    let (Some(ct_b64), Some(iv_b64), Some(mac_b64), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(EnvelopeError::Authentication);
    };

    let expected = compute_mac(keys, ct_b64, iv_b64)?;
    let provided = STANDARD
        .decode(mac_b64)
        .map_err(|_| EnvelopeError::Authentication)?;
    if !constant_time_eq(&expected, &provided) {
        return Err(EnvelopeError::Authentication);
    }

    let iv: [u8; IV_LEN] = STANDARD
        .decode(iv_b64)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(EnvelopeError::Authentication)?;
    let mut ciphertext = STANDARD
        .decode(ct_b64)
        .map_err(|_| EnvelopeError::Authentication)?;

    let result = Aes128CbcDec::new(&(*keys.cipher_key()).into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| EnvelopeError::Authentication);
    ciphertext.zeroize();
    result
}

/// Like [`open`], but additionally requires the plaintext to be UTF-8.
///
/// # Errors
///
/// Returns [`EnvelopeError::Authentication`] if [`open`] fails or the
/// plaintext is not valid UTF-8.
pub fn open_str(wire: &str, keys: &KeyMaterial) -> Result<String, EnvelopeError> {
    let plaintext = open(wire, keys)?;
    String::from_utf8(plaintext).map_err(|e| {
        e.into_bytes().zeroize();
        EnvelopeError::Authentication
    })
}

/// Compare two byte strings without an early exit on the first mismatch.
///
/// Unequal lengths fail immediately; equal lengths are always compared in
/// full. The per-byte fold is `subtle`'s, which keeps the optimiser from
/// turning it back into an early-exit loop.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// HMAC-SHA256 over the base64 text of the ciphertext followed by the base64
/// text of the IV.
fn compute_mac(
    keys: &KeyMaterial,
    ct_b64: &str,
    iv_b64: &str,
) -> Result<[u8; 32], EnvelopeError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(keys.mac_key())
        .map_err(|_| EnvelopeError::InvalidKeyLength)?;
    mac.update(ct_b64.as_bytes());
    mac.update(iv_b64.as_bytes());
    let mut tag = [0u8; 32];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_keys() -> KeyMaterial {
        KeyMaterial::load("AAECAwQFBgcICQoLDA0ODw==", "EBESExQVFhcYGRobHB0eHw==").unwrap()
    }

    fn other_keys() -> KeyMaterial {
        KeyMaterial::load("ICEiIyQlJicoKSorLC0uLw==", "MDEyMzQ1Njc4OTo7PD0+Pw==").unwrap()
    }

    #[test]
    fn seal_then_open_hello() {
        let keys = fixture_keys();
        let wire = seal(b"hello", &keys).unwrap();
        assert_eq!(open_str(&wire, &keys).unwrap(), "hello");
    }

    #[test]
    fn round_trip_various_lengths() {
        let keys = fixture_keys();
        for len in [0usize, 1, 15, 16, 17, 31, 32, 33, 1000] {
            let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let wire = seal(&plaintext, &keys).unwrap();
            assert_eq!(open(&wire, &keys).unwrap(), plaintext, "length {len}");
        }
    }

    #[test]
    fn round_trip_multibyte_utf8() {
        let keys = fixture_keys();
        let text = r#"{"city":"Zürich","note":"配送"}"#;
        let wire = seal(text.as_bytes(), &keys).unwrap();
        assert_eq!(open_str(&wire, &keys).unwrap(), text);
    }

    #[test]
    fn wire_has_three_base64_fields() {
        let keys = fixture_keys();
        let wire = seal_with_iv(b"hello", &keys, [9u8; IV_LEN]).unwrap();
        let parts: Vec<&str> = wire.split('$').collect();
        assert_eq!(parts.len(), 3);
        // One padded block of ciphertext.
        assert_eq!(STANDARD.decode(parts[0]).unwrap().len(), 16);
        assert_eq!(STANDARD.decode(parts[1]).unwrap(), [9u8; IV_LEN]);
        assert_eq!(STANDARD.decode(parts[2]).unwrap().len(), 32);
    }

    #[test]
    fn full_block_plaintext_gets_extra_padding_block() {
        let keys = fixture_keys();
        let wire = seal_with_iv(&[b'a'; 16], &keys, [0u8; IV_LEN]).unwrap();
        let ct_b64 = wire.split('$').next().unwrap();
        assert_eq!(STANDARD.decode(ct_b64).unwrap().len(), 32);
    }

    #[test]
    fn mac_covers_base64_ciphertext_then_base64_iv() {
        let keys = fixture_keys();
        let wire = seal(b"interop", &keys).unwrap();
        let parts: Vec<&str> = wire.split('$').collect();

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&[
            0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d,
            0x1e, 0x1f,
        ])
        .unwrap();
        mac.update(format!("{}{}", parts[0], parts[1]).as_bytes());
        let expected = STANDARD.encode(mac.finalize().into_bytes());
        assert_eq!(parts[2], expected);
    }

    #[test]
    fn fixed_iv_is_deterministic() {
        let keys = fixture_keys();
        let a = seal_with_iv(b"same", &keys, [3u8; IV_LEN]).unwrap();
        let b = seal_with_iv(b"same", &keys, [3u8; IV_LEN]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn random_iv_gives_fresh_output() {
        let keys = fixture_keys();
        let a = seal(b"same", &keys).unwrap();
        let b = seal(b"same", &keys).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.split('$').nth(1), b.split('$').nth(1));
    }

    #[test]
    fn any_single_character_change_is_rejected() {
        let keys = fixture_keys();
        let wire = seal(br#"{"items":[1,2,3]}"#, &keys).unwrap();
        for (i, c) in wire.char_indices() {
            if c == '$' {
                continue;
            }
            let replacement = if c == 'A' { 'B' } else { 'A' };
            let mut tampered = wire.clone();
            tampered.replace_range(i..i + 1, &replacement.to_string());
            assert_eq!(
                open(&tampered, &keys),
                Err(EnvelopeError::Authentication),
                "tampering at {i} went unnoticed"
            );
        }
    }

    #[test]
    fn swapped_iv_is_rejected() {
        let keys = fixture_keys();
        let a = seal(b"first", &keys).unwrap();
        let b = seal(b"second", &keys).unwrap();
        let a_parts: Vec<&str> = a.split('$').collect();
        let b_parts: Vec<&str> = b.split('$').collect();
        let spliced = format!("{}${}${}", a_parts[0], b_parts[1], a_parts[2]);
        assert!(open(&spliced, &keys).is_err());
    }

    #[test]
    fn wrong_keys_are_rejected() {
        let wire = seal(b"secret", &fixture_keys()).unwrap();
        assert_eq!(
            open(&wire, &other_keys()),
            Err(EnvelopeError::Authentication)
        );
    }

    #[test]
    fn wrong_separator_count_is_rejected() {
        let keys = fixture_keys();
        let wire = seal(b"x", &keys).unwrap();
        let parts: Vec<&str> = wire.split('$').collect();
        for candidate in [
            String::new(),
            parts[0].to_owned(),
            format!("{}${}", parts[0], parts[1]),
            format!("{wire}$"),
            format!("{wire}${}", parts[2]),
        ] {
            assert_eq!(
                open(&candidate, &keys),
                Err(EnvelopeError::Authentication),
                "accepted {candidate:?}"
            );
        }
    }

    #[test]
    fn bad_base64_mac_is_rejected() {
        let keys = fixture_keys();
        let wire = seal(b"x", &keys).unwrap();
        let parts: Vec<&str> = wire.split('$').collect();
        let bad = format!("{}${}$!!!not-base64!!!", parts[0], parts[1]);
        assert_eq!(open(&bad, &keys), Err(EnvelopeError::Authentication));
    }

    #[test]
    fn authenticated_short_iv_is_rejected() {
        // A correctly MACed envelope whose IV field is not 16 bytes.
        let keys = fixture_keys();
        let ct_b64 = STANDARD.encode([0u8; 16]);
        let iv_b64 = STANDARD.encode([0u8; 8]);
        let tag = STANDARD.encode(compute_mac(&keys, &ct_b64, &iv_b64).unwrap());
        let wire = format!("{ct_b64}${iv_b64}${tag}");
        assert_eq!(open(&wire, &keys), Err(EnvelopeError::Authentication));
    }

    #[test]
    fn authenticated_garbage_ciphertext_is_rejected() {
        // Ciphertext that is not a whole number of blocks cannot unpad.
        let keys = fixture_keys();
        let ct_b64 = STANDARD.encode([0u8; 15]);
        let iv_b64 = STANDARD.encode([0u8; IV_LEN]);
        let tag = STANDARD.encode(compute_mac(&keys, &ct_b64, &iv_b64).unwrap());
        let wire = format!("{ct_b64}${iv_b64}${tag}");
        assert_eq!(open(&wire, &keys), Err(EnvelopeError::Authentication));
    }

    #[test]
    fn non_utf8_plaintext_rejected_by_open_str() {
        let keys = fixture_keys();
        let wire = seal(&[0xff, 0xfe, 0xfd], &keys).unwrap();
        assert!(open(&wire, &keys).is_ok());
        assert_eq!(open_str(&wire, &keys), Err(EnvelopeError::Authentication));
    }

    #[test]
    fn constant_time_eq_cases() {
        assert!(constant_time_eq(b"", b""));
        assert!(constant_time_eq(b"abcdef", b"abcdef"));
        assert!(!constant_time_eq(b"abcdef", b"abcdeg"));
        assert!(!constant_time_eq(b"abcdef", b"bbcdef"));
        assert!(!constant_time_eq(b"abcdef", b"abcde"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    /// Coarse check: the cost must not track the first differing byte. An
    /// early-exit compare over 4 KiB is orders of magnitude faster when the
    /// first byte differs; the bound below leaves room for scheduler noise.
    #[test]
    fn constant_time_eq_cost_ignores_mismatch_position() {
        use std::hint::black_box;
        use std::time::{Duration, Instant};

        const LEN: usize = 4096;
        let base = vec![0x5au8; LEN];
        let mut first = base.clone();
        first[0] ^= 1;
        let mut last = base.clone();
        last[LEN - 1] ^= 1;

        let fastest = |other: &[u8]| -> Duration {
            (0..7)
                .map(|_| {
                    let start = Instant::now();
                    for _ in 0..200 {
                        black_box(constant_time_eq(black_box(&base), black_box(other)));
                    }
                    start.elapsed()
                })
                .min()
                .unwrap()
        };

        let early = fastest(&first[..]).as_nanos().max(1);
        let late = fastest(&last[..]).as_nanos().max(1);
        let ratio = late.max(early) as f64 / late.min(early) as f64;
        assert!(ratio < 4.0, "first-byte {early}ns vs last-byte {late}ns");
    }

    #[tokio::test]
    async fn concurrent_seal_and_open() {
        let keys = std::sync::Arc::new(fixture_keys());
        let mut handles = Vec::new();
        for n in 0..32 {
            let keys = keys.clone();
            handles.push(tokio::spawn(async move {
                let text = format!("message {n}");
                let wire = seal(text.as_bytes(), &keys).unwrap();
                assert_eq!(open_str(&wire, &keys).unwrap(), text);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }
}
