use std::fmt;

use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
};
use sha2::Sha256;

use crate::error::CryptoError;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// Per-drop password salt size in bytes.
pub const SALT_SIZE: usize = 16;

/// Minimum PBKDF2 rounds. Lowering this needs a security review.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// A 256-bit symmetric key, either random (carried in the link fragment)
/// or derived from a password.
#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// Generate a random key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::MalformedKey { expected: KEY_SIZE })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encode for the URL fragment. URL-safe alphabet, no padding, so the
    /// text never needs percent-encoding after `#`.
    pub fn to_text(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Decode a key from its fragment text.
    ///
    /// Accepts the URL-safe alphabet as well as standard base64 (with or
    /// without padding), since older links carried the standard form.
    pub fn from_text(text: &str) -> Result<Self, CryptoError> {
        let normalized: String = text
            .trim()
            .trim_end_matches('=')
            .chars()
            .map(|c| match c {
                '+' => '-',
                '/' => '_',
                other => other,
            })
            .collect();
        let bytes = URL_SAFE_NO_PAD
            .decode(normalized.as_bytes())
            .map_err(|_| CryptoError::MalformedKey { expected: KEY_SIZE })?;
        Self::from_slice(&bytes)
    }

    /// PBKDF2-HMAC-SHA256 over the password with a per-drop salt.
    ///
    /// Deterministic for identical inputs, so the recipient re-derives the
    /// same key from the re-entered password and the stored salt.
    pub fn derive_from_password(
        password: &str,
        salt: &Salt,
        iterations: u32,
    ) -> Result<Self, CryptoError> {
        if iterations < PBKDF2_ITERATIONS {
            return Err(CryptoError::IterationsTooLow {
                min: PBKDF2_ITERATIONS,
                got: iterations,
            });
        }
        let mut key = [0u8; KEY_SIZE];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut key);
        Ok(Self(key))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(<redacted>)")
    }
}

/// Random 128-bit salt, stored next to the drop record. Not secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        Self(salt)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    /// Standard base64, the form persisted as `password_salt`.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| CryptoError::MalformedSalt { expected: SALT_SIZE })?;
        let salt: [u8; SALT_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::MalformedSalt { expected: SALT_SIZE })?;
        Ok(Self(salt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        assert_ne!(Key::generate(), Key::generate());
    }

    #[test]
    fn text_roundtrip_is_fragment_safe() {
        let key = Key::generate();
        let text = key.to_text();
        assert_eq!(text.len(), 43);
        assert!(
            text.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_eq!(Key::from_text(&text).unwrap(), key);
    }

    #[test]
    fn standard_base64_still_decodes() {
        let key = Key::from_bytes([0xfb; KEY_SIZE]);
        let standard = BASE64.encode(key.as_bytes());
        assert!(standard.contains('+') || standard.contains('/'));
        assert!(standard.ends_with('='));
        assert_eq!(Key::from_text(&standard).unwrap(), key);
    }

    #[test]
    fn wrong_length_is_malformed() {
        let short = URL_SAFE_NO_PAD.encode([7u8; 16]);
        assert_eq!(
            Key::from_text(&short),
            Err(CryptoError::MalformedKey { expected: KEY_SIZE })
        );
        assert!(Key::from_text("not base64 !!").is_err());
        assert!(Key::from_slice(&[0u8; 33]).is_err());
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = Key::from_bytes([0xab; KEY_SIZE]);
        assert_eq!(format!("{:?}", key), "Key(<redacted>)");
    }

    #[test]
    fn password_derivation_is_deterministic() {
        let salt = Salt::generate();
        let a = Key::derive_from_password("hunter2", &salt, PBKDF2_ITERATIONS).unwrap();
        let b = Key::derive_from_password("hunter2", &salt, PBKDF2_ITERATIONS).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_salt_gives_different_key() {
        let a = Key::derive_from_password("hunter2", &Salt::generate(), PBKDF2_ITERATIONS).unwrap();
        let b = Key::derive_from_password("hunter2", &Salt::generate(), PBKDF2_ITERATIONS).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn low_iteration_count_rejected() {
        let err = Key::derive_from_password("pw", &Salt::generate(), 10_000).unwrap_err();
        assert_eq!(
            err,
            CryptoError::IterationsTooLow {
                min: PBKDF2_ITERATIONS,
                got: 10_000
            }
        );
    }

    #[test]
    fn salt_base64_roundtrip() {
        let salt = Salt::generate();
        assert_eq!(Salt::from_base64(&salt.to_base64()).unwrap(), salt);
        assert!(Salt::from_base64(&BASE64.encode([1u8; 8])).is_err());
    }
}
