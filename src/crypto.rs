//! Credential sealing
//!
//! Aggregator access credentials are long-lived secrets, so they are sealed
//! with ChaCha20-Poly1305 before they reach the database.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Prefix identifying the sealing format
const SEALED_PREFIX: &str = "v1:";

const NONCE_LEN: usize = 12;

/// Cipher errors
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Encryption key must be a base64 string or 32-byte ascii value")]
    InvalidKey,

    #[error("Sealed credential is malformed")]
    Malformed,

    #[error("Failed to encrypt credential")]
    Encrypt,

    #[error("Failed to decrypt credential")]
    Decrypt,
}

/// Seals and opens access credentials
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Build from a configured key (base64 or 32 ascii bytes)
    pub fn from_encoded_key(raw: &str) -> Result<Self, CipherError> {
        let trimmed = raw.trim();
        let decoded = match BASE64.decode(trimmed) {
            Ok(bytes) if bytes.len() == 32 => bytes,
            _ if trimmed.len() == 32 => trimmed.as_bytes().to_vec(),
            _ => return Err(CipherError::InvalidKey),
        };

        let key: [u8; 32] = decoded.try_into().map_err(|_| CipherError::InvalidKey)?;
        Ok(Self::new(key))
    }

    /// Derive a key from another process secret when no dedicated key is configured
    pub fn derived_from(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"cashai-credential-key:");
        hasher.update(secret.as_bytes());
        Self::new(hasher.finalize().into())
    }

    /// Seal a plaintext credential into `v1:<base64(nonce || ciphertext)>`
    pub fn seal(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", SEALED_PREFIX, BASE64.encode(payload)))
    }

    /// Open a value produced by [`CredentialCipher::seal`]
    pub fn open(&self, sealed: &str) -> Result<String, CipherError> {
        let encoded = sealed
            .strip_prefix(SEALED_PREFIX)
            .ok_or(CipherError::Malformed)?;
        let payload = BASE64.decode(encoded).map_err(|_| CipherError::Malformed)?;
        if payload.len() <= NONCE_LEN {
            return Err(CipherError::Malformed);
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Decrypt)
    }
}
