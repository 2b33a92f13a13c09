//! Encryption of marketplace tokens at rest.
//!
//! Tokens are sealed with AES-256-GCM under a process-wide key. Every call to
//! [`CredentialVault::encrypt`] draws a fresh random 96-bit nonce from the system CSPRNG;
//! nonce reuse would be catastrophic for GCM. The opaque string stored in the database is
//! `base64(nonce).|.base64(ciphertext+tag)` -- the `.|.` separator can never appear
//! inside the base64 alphabet, so splitting is unambiguous regardless of the plaintext.

use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM},
    rand::{SecureRandom, SystemRandom},
};
use thiserror::Error;

/// Separator between the encoded nonce and the encoded ciphertext.
pub const CIPHER_SEPARATOR: &str = ".|.";

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("The vault key must be exactly 32 bytes: {0}")]
    InvalidKey(String),
    #[error("Stored ciphertext is malformed: {0}")]
    MalformedCiphertext(String),
    #[error("Decryption failed: wrong key or tampered ciphertext")]
    DecryptFailed,
    #[error("Encryption failed")]
    EncryptFailed,
}

/// Seals and opens opaque secret strings with AES-256-GCM.
#[derive(Clone)]
pub struct CredentialVault {
    key: [u8; 32],
}

impl CredentialVault {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Build a vault from a base64-encoded 256-bit key, as supplied via configuration.
    pub fn from_base64_key(encoded: &str) -> Result<Self, VaultError> {
        let bytes = base64::decode(encoded).map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        let key: [u8; 32] =
            bytes.try_into().map_err(|_| VaultError::InvalidKey("decoded key is not 32 bytes".to_string()))?;
        Ok(Self::new(key))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let key = UnboundKey::new(&AES_256_GCM, &self.key).map_err(|_| VaultError::EncryptFailed)?;
        let key = LessSafeKey::new(key);
        let rng = SystemRandom::new();
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes).map_err(|_| VaultError::EncryptFailed)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);
        let mut in_out = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out).map_err(|_| VaultError::EncryptFailed)?;
        Ok(format!("{}{}{}", base64::encode(nonce_bytes), CIPHER_SEPARATOR, base64::encode(in_out)))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, VaultError> {
        let (nonce_part, cipher_part) = stored
            .split_once(CIPHER_SEPARATOR)
            .ok_or_else(|| VaultError::MalformedCiphertext("missing nonce separator".to_string()))?;
        let nonce_bytes =
            base64::decode(nonce_part).map_err(|e| VaultError::MalformedCiphertext(e.to_string()))?;
        let nonce_bytes: [u8; NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| VaultError::MalformedCiphertext("nonce is not 96 bits".to_string()))?;
        let mut in_out =
            base64::decode(cipher_part).map_err(|e| VaultError::MalformedCiphertext(e.to_string()))?;
        let key = UnboundKey::new(&AES_256_GCM, &self.key).map_err(|_| VaultError::DecryptFailed)?;
        let key = LessSafeKey::new(key);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);
        let plaintext =
            key.open_in_place(nonce, Aad::empty(), &mut in_out).map_err(|_| VaultError::DecryptFailed)?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| VaultError::DecryptFailed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_vault() -> CredentialVault {
        CredentialVault::new([7u8; 32])
    }

    #[test]
    fn round_trip_for_ordinary_tokens() {
        let vault = test_vault();
        let token = "APP_USR-5503910054141466-102715-abcdef123456-468424240";
        let stored = vault.encrypt(token).unwrap();
        assert_ne!(stored, token);
        assert_eq!(vault.decrypt(&stored).unwrap(), token);
    }

    #[test]
    fn round_trip_for_strings_containing_the_separator() {
        let vault = test_vault();
        let tricky = "left.|.right.|.";
        let stored = vault.encrypt(tricky).unwrap();
        assert_eq!(vault.decrypt(&stored).unwrap(), tricky);
    }

    #[test]
    fn encrypting_twice_yields_different_ciphertexts() {
        let vault = test_vault();
        let a = vault.encrypt("same plaintext").unwrap();
        let b = vault.encrypt("same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn missing_separator_is_malformed() {
        let vault = test_vault();
        let err = vault.decrypt("not-a-valid-blob").unwrap_err();
        assert!(matches!(err, VaultError::MalformedCiphertext(_)));
    }

    #[test]
    fn garbage_base64_is_malformed() {
        let vault = test_vault();
        let err = vault.decrypt("!!!.|.???").unwrap_err();
        assert!(matches!(err, VaultError::MalformedCiphertext(_)));
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let stored = test_vault().encrypt("secret").unwrap();
        let other = CredentialVault::new([8u8; 32]);
        let err = other.decrypt(&stored).unwrap_err();
        assert!(matches!(err, VaultError::DecryptFailed));
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let vault = test_vault();
        let stored = vault.encrypt("secret").unwrap();
        let (nonce, cipher) = stored.split_once(CIPHER_SEPARATOR).unwrap();
        let mut bytes = base64::decode(cipher).unwrap();
        bytes[0] ^= 0x01;
        let tampered = format!("{}{}{}", nonce, CIPHER_SEPARATOR, base64::encode(bytes));
        assert!(matches!(vault.decrypt(&tampered).unwrap_err(), VaultError::DecryptFailed));
    }
}
