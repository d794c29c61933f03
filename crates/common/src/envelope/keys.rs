//! [`KeyMaterial`]: the long-lived cipher and MAC key pair.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Byte length of the AES-128 cipher key.
pub const CIPHER_KEY_LEN: usize = 16;

/// Byte length of the HMAC-SHA256 key.
pub const MAC_KEY_LEN: usize = 16;

/// Which half of the key pair a [`KeyError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// The block-cipher key.
    Cipher,
    /// The HMAC key.
    Mac,
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyKind::Cipher => f.write_str("cipher key"),
            KeyKind::Mac => f.write_str("hmac key"),
        }
    }
}

/// Errors produced while loading key material.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The value is not valid standard base64.
    #[error("{0} is not valid base64")]
    InvalidEncoding(KeyKind),

    /// The decoded key has the wrong length.
    #[error("{kind} has invalid length: expected 16 bytes, got {len}")]
    InvalidLength {
        /// Offending key.
        kind: KeyKind,
        /// Decoded length.
        len: usize,
    },

    /// The cipher key and the MAC key are the same bytes.
    #[error("cipher key and hmac key must be independent")]
    IdenticalKeys,
}

/// The cipher key and the independent MAC key shared by every request.
///
/// Built once at startup and never mutated afterwards; handlers share it
/// behind an `Arc`. The key bytes are wiped when the value is dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    cipher_key: [u8; CIPHER_KEY_LEN],
    mac_key: [u8; MAC_KEY_LEN],
}

impl KeyMaterial {
    /// Draw a fresh key pair from the OS CSPRNG.
    ///
    /// The two keys are drawn independently; neither is derived from the other.
    pub fn generate() -> Self {
        let mut cipher_key = [0u8; CIPHER_KEY_LEN];
        let mut mac_key = [0u8; MAC_KEY_LEN];
        OsRng.fill_bytes(&mut cipher_key);
        loop {
            OsRng.fill_bytes(&mut mac_key);
            if mac_key != cipher_key {
                break;
            }
        }
        Self {
            cipher_key,
            mac_key,
        }
    }

    /// Decode a key pair from its base64 provisioning form.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if either value is not base64, does not decode to
    /// exactly 16 bytes, or if both values decode to the same key.
    pub fn load(cipher_key_b64: &str, mac_key_b64: &str) -> Result<Self, KeyError> {
        let cipher_key = decode_key::<CIPHER_KEY_LEN>(cipher_key_b64, KeyKind::Cipher)?;
        let mac_key = decode_key::<MAC_KEY_LEN>(mac_key_b64, KeyKind::Mac)?;
        if cipher_key == mac_key {
            return Err(KeyError::IdenticalKeys);
        }
        Ok(Self {
            cipher_key,
            mac_key,
        })
    }

    /// Build a key pair from raw bytes. Intended for fixtures.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::IdenticalKeys`] if both keys are equal.
    pub fn from_bytes(
        cipher_key: [u8; CIPHER_KEY_LEN],
        mac_key: [u8; MAC_KEY_LEN],
    ) -> Result<Self, KeyError> {
        if cipher_key == mac_key {
            return Err(KeyError::IdenticalKeys);
        }
        Ok(Self {
            cipher_key,
            mac_key,
        })
    }

    /// Base64 of the cipher key, for persisting to a key file.
    pub fn cipher_key_b64(&self) -> String {
        STANDARD.encode(self.cipher_key)
    }

    /// Base64 of the MAC key, for persisting to a key file.
    pub fn mac_key_b64(&self) -> String {
        STANDARD.encode(self.mac_key)
    }

    pub(crate) fn cipher_key(&self) -> &[u8; CIPHER_KEY_LEN] {
        &self.cipher_key
    }

    pub(crate) fn mac_key(&self) -> &[u8; MAC_KEY_LEN] {
        &self.mac_key
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material — not even in debug builds.
        f.write_str("KeyMaterial([REDACTED])")
    }
}

fn decode_key<const N: usize>(value: &str, kind: KeyKind) -> Result<[u8; N], KeyError> {
    let mut bytes = STANDARD
        .decode(value.trim())
        .map_err(|_| KeyError::InvalidEncoding(kind))?;
    if bytes.len() != N {
        let len = bytes.len();
        bytes.zeroize();
        return Err(KeyError::InvalidLength { kind, len });
    }
    let mut key = [0u8; N];
    key.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(key)
}
