//! AES-256-GCM envelopes.
//!
//! Wire format: nonce(12) + ciphertext + GCM tag(16), one contiguous
//! buffer. The nonce is drawn fresh from the OS RNG on every `seal`.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};

use crate::error::CryptoError;
use crate::keys::Key;

pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `key`. Returns nonce + ciphertext + tag.
pub fn seal(plaintext: &[u8], key: &Key) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an envelope produced by [`seal`].
///
/// Every failure is `AuthenticationFailure`, whether the input was too
/// short, tampered with, or opened with the wrong key.
pub fn open(envelope: &[u8], key: &Key) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < NONCE_SIZE {
        return Err(CryptoError::AuthenticationFailure);
    }
    let (nonce, ciphertext) = envelope.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailure)
}
