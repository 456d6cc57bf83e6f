/// Deaddrop Crypto Library
///
/// Everything here runs on the uploader's and recipient's machines. The
/// server only ever stores envelopes and (for password drops) the salt.
///
/// - `keys`: 256-bit link keys, salts, and PBKDF2-SHA256 password keys
/// - `envelope`: AES-256-GCM sealing with a fresh nonce per call
/// - `combine`: XOR of link key and password key into the effective key
/// - `share`: the upload/download flows built from the three above

pub mod combine;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod share;

pub use combine::combine;
pub use envelope::{open, seal};
pub use error::CryptoError;
pub use keys::{Key, Salt};
