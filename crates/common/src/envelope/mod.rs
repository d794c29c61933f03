//! The authenticated envelope wrapped around every request and response body.
//!
//! This module is free of HTTP and I/O. Every call is independent and may run
//! concurrently against one shared [`KeyMaterial`].
//!
//! # Wire format
//!
//! ```text
//! base64(ciphertext) $ base64(iv) $ base64(HMAC-SHA256(mac_key, base64(ciphertext) || base64(iv)))
//! ```
//!
//! `ciphertext` is AES-128-CBC with PKCS#7 padding over the plaintext bytes.
//! Base64 is the standard alphabet with padding.

pub mod cipher;
pub mod keys;

pub use cipher::{constant_time_eq, open, open_str, seal, seal_with_iv, EnvelopeError, IV_LEN};
pub use keys::{KeyError, KeyKind, KeyMaterial};
