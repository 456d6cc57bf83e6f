use crate::error::CryptoError;
use crate::keys::Key;

/// Merge the link key and the password key into the effective key.
///
/// XOR is commutative and associative, so argument order does not matter.
/// Neither input alone reveals anything about the result.
pub fn combine(a: &Key, b: &Key) -> Result<Key, CryptoError> {
    let bytes = xor_bytes(a.as_bytes(), b.as_bytes())?;
    Key::from_slice(&bytes)
}

/// Byte-wise XOR of two equal-length buffers.
pub fn xor_bytes(a: &[u8], b: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if a.len() != b.len() {
        return Err(CryptoError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}
