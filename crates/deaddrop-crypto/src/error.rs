use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Malformed key: expected {expected} bytes")]
    MalformedKey { expected: usize },

    #[error("Malformed salt: expected {expected} bytes")]
    MalformedSalt { expected: usize },

    #[error("Key length mismatch: {left} vs {right} bytes")]
    LengthMismatch { left: usize, right: usize },

    /// Wrong key, tampered ciphertext, and truncated input all land here.
    #[error("cannot decrypt")]
    AuthenticationFailure,

    #[error("PBKDF2 iteration count {got} is below the minimum of {min}")]
    IterationsTooLow { min: u32, got: u32 },

    #[error("Encryption failed")]
    EncryptionFailed,
}
