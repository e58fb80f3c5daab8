//! Encryption at rest for database files.
//!
//! Batches are sealed with AES-256-GCM. The key is derived from the
//! environment or database password with HKDF-SHA256 and a random salt
//! stored in each file's header, so the same password yields a different
//! key per file. Keys are zeroized on drop.
//!
//! Without the `encryption` feature every constructor fails with
//! [`Errno::INVALID`], so opening with a password is refused rather than
//! silently storing plaintext.

#[cfg(feature = "encryption")]
pub(crate) use sealed::*;

#[cfg(not(feature = "encryption"))]
pub(crate) use stub::*;

/// Size of the per-file salt.
pub(crate) const SALT_SIZE: usize = 16;

/// Plaintext sealed into every encrypted header so a wrong password is
/// detected before any batch is read.
pub(crate) const VERIFIER: &[u8] = b"recdb-password-verifier-v1";

#[cfg(feature = "encryption")]
mod sealed {
    use super::SALT_SIZE;
    use crate::errno::{Errno, Result};
    use aes_gcm::{
        aead::{generic_array::GenericArray, Aead, KeyInit},
        Aes256Gcm, Nonce,
    };
    use rand::RngCore;
    use zeroize::{Zeroize, ZeroizeOnDrop};

    const KEY_SIZE: usize = 32;
    const NONCE_SIZE: usize = 12;
    const TAG_SIZE: usize = 16;

    /// Derived AES-256 key.
    #[derive(Clone, Zeroize, ZeroizeOnDrop)]
    struct EncryptionKey {
        bytes: [u8; KEY_SIZE],
    }

    impl EncryptionKey {
        fn derive_from_password(password: &[u8], salt: &[u8]) -> Result<Self> {
            use hkdf::Hkdf;
            use sha2::Sha256;

            let hk = Hkdf::<Sha256>::new(Some(salt), password);
            let mut bytes = [0u8; KEY_SIZE];
            hk.expand(b"recdb-file-key-v1", &mut bytes)
                .map_err(|_| Errno::INVALID)?;
            Ok(Self { bytes })
        }
    }

    /// Generates a fresh file salt.
    pub(crate) fn generate_salt() -> Result<[u8; SALT_SIZE]> {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        Ok(salt)
    }

    /// Seals and opens batches of one file.
    pub(crate) struct Cipher {
        cipher: Aes256Gcm,
    }

    impl Cipher {
        pub(crate) fn new(password: &str, salt: &[u8]) -> Result<Self> {
            let key = EncryptionKey::derive_from_password(password.as_bytes(), salt)?;
            let cipher = Aes256Gcm::new(GenericArray::from_slice(&key.bytes));
            Ok(Self { cipher })
        }

        /// Output layout: `nonce (12) || ciphertext || tag (16)`.
        pub(crate) fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
            let mut nonce_bytes = [0u8; NONCE_SIZE];
            rand::thread_rng().fill_bytes(&mut nonce_bytes);
            let nonce = Nonce::from_slice(&nonce_bytes);

            let ciphertext = self
                .cipher
                .encrypt(nonce, plaintext)
                .map_err(|_| Errno::INVALID)?;

            let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
            sealed.extend_from_slice(&nonce_bytes);
            sealed.extend(ciphertext);
            Ok(sealed)
        }

        /// Fails with [`Errno::ACCESS`] when the key does not match.
        pub(crate) fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
            if sealed.len() < NONCE_SIZE + TAG_SIZE {
                return Err(Errno::ACCESS);
            }
            let (nonce, body) = sealed.split_at(NONCE_SIZE);
            self.cipher
                .decrypt(Nonce::from_slice(nonce), body)
                .map_err(|_| Errno::ACCESS)
        }
    }

    impl std::fmt::Debug for Cipher {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Cipher").field("cipher", &"Aes256Gcm").finish()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn seal_open_roundtrip() {
            let salt = generate_salt().unwrap();
            let cipher = Cipher::new("secret", &salt).unwrap();
            let sealed = cipher.seal(b"batch bytes").unwrap();
            assert_ne!(&sealed[NONCE_SIZE..], b"batch bytes");
            assert_eq!(cipher.open(&sealed).unwrap(), b"batch bytes");
        }

        #[test]
        fn wrong_password_is_access_denied() {
            let salt = generate_salt().unwrap();
            let sealed = Cipher::new("right", &salt).unwrap().seal(b"x").unwrap();
            let wrong = Cipher::new("wrong", &salt).unwrap();
            assert_eq!(wrong.open(&sealed), Err(Errno::ACCESS));
        }

        #[test]
        fn salt_changes_key() {
            let a = Cipher::new("pw", &[1; SALT_SIZE]).unwrap();
            let b = Cipher::new("pw", &[2; SALT_SIZE]).unwrap();
            let sealed = a.seal(b"x").unwrap();
            assert!(b.open(&sealed).is_err());
        }

        #[test]
        fn short_input_is_rejected() {
            let cipher = Cipher::new("pw", &[0; SALT_SIZE]).unwrap();
            assert_eq!(cipher.open(&[0; 8]), Err(Errno::ACCESS));
        }
    }
}

#[cfg(not(feature = "encryption"))]
mod stub {
    use super::SALT_SIZE;
    use crate::errno::{Errno, Result};

    /// Always fails when encryption is disabled.
    pub(crate) fn generate_salt() -> Result<[u8; SALT_SIZE]> {
        Err(Errno::INVALID)
    }

    /// Cipher placeholder when encryption is disabled.
    #[derive(Debug)]
    pub(crate) struct Cipher {
        _private: (),
    }

    impl Cipher {
        pub(crate) fn new(_password: &str, _salt: &[u8]) -> Result<Self> {
            Err(Errno::INVALID)
        }

        pub(crate) fn seal(&self, _plaintext: &[u8]) -> Result<Vec<u8>> {
            Err(Errno::INVALID)
        }

        pub(crate) fn open(&self, _sealed: &[u8]) -> Result<Vec<u8>> {
            Err(Errno::INVALID)
        }
    }
}
