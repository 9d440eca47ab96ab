use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::nonce::{self, NONCE_LEN};
use crate::error::{ConfigError, Result};

/// GCM authentication tag appended by both algorithms.
pub const TAG_LEN: usize = 16;

/// Bytes added to a plaintext once it is sealed.
pub const SEAL_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// Symmetric algorithms accepted for value encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    /// AES-128-GCM with a 128-bit key.
    Aes128,
    /// AES-256-GCM with a 256-bit key.
    Aes256,
}

impl CipherAlgorithm {
    /// Exact key length the algorithm requires.
    pub const fn key_len(self) -> usize {
        match self {
            CipherAlgorithm::Aes128 => 16,
            CipherAlgorithm::Aes256 => 32,
        }
    }
}

/// Active value key.
///
/// Sealed values are laid out as `nonce ‖ ciphertext ‖ tag`. The entry key is bound
/// as associated data so ciphertext cannot be replayed under another name.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ValueCipher {
    #[zeroize(skip)]
    algorithm: CipherAlgorithm,
    key: Vec<u8>,
}

impl core::fmt::Debug for ValueCipher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ValueCipher")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl ValueCipher {
    /// Build a cipher, rejecting material whose length does not match the algorithm.
    pub fn new(material: &[u8], algorithm: CipherAlgorithm) -> Result<Self> {
        if material.len() != algorithm.key_len() {
            return Err(ConfigError::InvalidParam(
                "key length does not match algorithm",
            ));
        }
        Ok(Self {
            algorithm,
            key: material.to_vec(),
        })
    }

    pub const fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.seal_with_nonce(&nonce::random(), aad, plaintext)
    }

    pub(crate) fn seal_with_nonce(
        &self,
        nonce: &[u8; NONCE_LEN],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        let ciphertext = match self.algorithm {
            CipherAlgorithm::Aes128 => Aes128Gcm::new_from_slice(&self.key)
                .map_err(|_| ConfigError::Crypto)?
                .encrypt(nonce.into(), payload),
            CipherAlgorithm::Aes256 => Aes256Gcm::new_from_slice(&self.key)
                .map_err(|_| ConfigError::Crypto)?
                .encrypt(nonce.into(), payload),
        }
        .map_err(|_| ConfigError::Crypto)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a value produced by [`ValueCipher::seal`].
    ///
    /// Fails with [`ConfigError::Crypto`] when the value was sealed under a different
    /// key, which is what happens to old entries after a rotation.
    pub fn open(&self, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(ConfigError::Crypto);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce: &[u8; NONCE_LEN] = nonce.try_into().map_err(|_| ConfigError::Crypto)?;
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        match self.algorithm {
            CipherAlgorithm::Aes128 => Aes128Gcm::new_from_slice(&self.key)
                .map_err(|_| ConfigError::Crypto)?
                .decrypt(nonce.into(), payload),
            CipherAlgorithm::Aes256 => Aes256Gcm::new_from_slice(&self.key)
                .map_err(|_| ConfigError::Crypto)?
                .decrypt(nonce.into(), payload),
        }
        .map_err(|_| ConfigError::Crypto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::{RngCore, SeedableRng};

    fn material(len: usize, seed: u8) -> Vec<u8> {
        let mut rng = ChaCha20Rng::from_seed([seed; 32]);
        let mut key = vec![0u8; len];
        rng.fill_bytes(&mut key);
        key
    }

    #[test]
    fn rejects_mismatched_key_lengths() {
        assert!(ValueCipher::new(&material(32, 1), CipherAlgorithm::Aes128).is_err());
        assert!(ValueCipher::new(&material(16, 1), CipherAlgorithm::Aes256).is_err());
        assert!(ValueCipher::new(&material(16, 1), CipherAlgorithm::Aes128).is_ok());
    }

    #[test]
    fn seal_open_both_algorithms() {
        for algorithm in [CipherAlgorithm::Aes128, CipherAlgorithm::Aes256] {
            let cipher = ValueCipher::new(&material(algorithm.key_len(), 2), algorithm)
                .expect("cipher");
            let sealed = cipher.seal(b"wifi.pass", b"hunter2").expect("seal");
            assert_eq!(sealed.len(), b"hunter2".len() + SEAL_OVERHEAD);
            assert!(!sealed.windows(7).any(|w| w == b"hunter2"));
            assert_eq!(cipher.open(b"wifi.pass", &sealed).expect("open"), b"hunter2");
        }
    }

    #[test]
    fn open_fails_under_other_key_or_name() {
        let cipher = ValueCipher::new(&material(16, 3), CipherAlgorithm::Aes128).unwrap();
        let rotated = ValueCipher::new(&material(16, 4), CipherAlgorithm::Aes128).unwrap();
        let sealed = cipher
            .seal_with_nonce(&[0xAB; NONCE_LEN], b"k", b"secret")
            .unwrap();

        assert!(matches!(rotated.open(b"k", &sealed), Err(ConfigError::Crypto)));
        assert!(matches!(cipher.open(b"other", &sealed), Err(ConfigError::Crypto)));
        assert!(matches!(cipher.open(b"k", &sealed[..10]), Err(ConfigError::Crypto)));
    }

    #[test]
    fn debug_output_hides_key_material() {
        let cipher = ValueCipher::new(&[0x41; 16], CipherAlgorithm::Aes128).unwrap();
        let rendered = format!("{cipher:?}");
        assert!(rendered.contains("Aes128"));
        assert!(!rendered.contains("65"));
    }
}
