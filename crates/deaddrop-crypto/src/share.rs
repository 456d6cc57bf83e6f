use crate::combine::combine;
use crate::envelope::{open, seal};
use crate::error::CryptoError;
use crate::keys::{Key, PBKDF2_ITERATIONS, Salt};

/// Output of the uploader side: what goes to the server and what goes into
/// the link.
#[derive(Debug)]
pub struct ProtectedDrop {
    /// Sealed bytes handed to the server.
    pub envelope: Vec<u8>,
    /// Text for the URL fragment. Never sent to the server.
    pub link_key: String,
    /// Base64 salt, present only for password drops. Stored server-side.
    pub password_salt: Option<String>,
}

/// Seal a file for sharing, optionally behind a password.
pub fn protect(plaintext: &[u8], password: Option<&str>) -> Result<ProtectedDrop, CryptoError> {
    let link_key = Key::generate();

    let (effective, password_salt) = match password {
        Some(password) => {
            let salt = Salt::generate();
            let password_key = Key::derive_from_password(password, &salt, PBKDF2_ITERATIONS)?;
            (combine(&link_key, &password_key)?, Some(salt.to_base64()))
        }
        None => (link_key.clone(), None),
    };

    Ok(ProtectedDrop {
        envelope: seal(plaintext, &effective)?,
        link_key: link_key.to_text(),
        password_salt,
    })
}

/// Recipient side: rebuild the effective key and open the envelope.
///
/// A password drop opened without its password or salt fails the same way
/// a wrong password does.
pub fn unprotect(
    envelope: &[u8],
    link_key: &str,
    password: Option<&str>,
    password_salt: Option<&str>,
) -> Result<Vec<u8>, CryptoError> {
    let link_key = Key::from_text(link_key)?;

    let effective = match (password, password_salt) {
        (Some(password), Some(salt)) => {
            let salt = Salt::from_base64(salt)?;
            let password_key = Key::derive_from_password(password, &salt, PBKDF2_ITERATIONS)?;
            combine(&link_key, &password_key)?
        }
        (None, None) => link_key,
        _ => return Err(CryptoError::AuthenticationFailure),
    };

    open(envelope, &effective)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_only_drop_roundtrip() {
        let drop = protect(b"quarterly numbers", None).unwrap();
        assert!(drop.password_salt.is_none());

        let plaintext = unprotect(&drop.envelope, &drop.link_key, None, None).unwrap();
        assert_eq!(plaintext, b"quarterly numbers");
    }

    #[test]
    fn password_drop_needs_both_halves() {
        let drop = protect(b"launch codes", Some("correct horse")).unwrap();
        let salt = drop.password_salt.as_deref();
        assert!(salt.is_some());

        let plaintext =
            unprotect(&drop.envelope, &drop.link_key, Some("correct horse"), salt).unwrap();
        assert_eq!(plaintext, b"launch codes");

        assert_eq!(
            unprotect(&drop.envelope, &drop.link_key, Some("battery staple"), salt),
            Err(CryptoError::AuthenticationFailure)
        );
        assert_eq!(
            unprotect(&drop.envelope, &drop.link_key, None, None),
            Err(CryptoError::AuthenticationFailure)
        );
        assert_eq!(
            unprotect(&drop.envelope, &drop.link_key, Some("correct horse"), None),
            Err(CryptoError::AuthenticationFailure)
        );
    }

    #[test]
    fn tampered_link_key_is_malformed_not_auth_failure() {
        let drop = protect(b"x", None).unwrap();
        let truncated = &drop.link_key[..20];
        assert!(matches!(
            unprotect(&drop.envelope, truncated, None, None),
            Err(CryptoError::MalformedKey { .. })
        ));
    }
}
