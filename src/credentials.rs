//! Mailbox credential decryption.
//!
//! The stored app-password is `hex(iv):hex(ciphertext)`, AES-256-CBC with
//! PKCS#7 padding under a fixed 32-byte key supplied by configuration.

use std::fmt;
use std::str::FromStr;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use secrecy::{ExposeSecret, SecretString};

use crate::error::CredentialError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

/// Login/password pair for one mailbox session. Re-derived every cycle.
#[derive(Debug, Clone)]
pub struct MailCredential {
    pub login: String,
    pub password: SecretString,
}

/// Parsed `hex(iv):hex(ciphertext)` value.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedCredential {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl fmt::Debug for EncryptedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedCredential")
            .field("iv", &hex::encode(self.iv))
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

impl fmt::Display for EncryptedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(self.iv), hex::encode(&self.ciphertext))
    }
}

impl FromStr for EncryptedCredential {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let [iv_hex, ct_hex] = parts.as_slice() else {
            return Err(CredentialError::MalformedInput { parts: parts.len() });
        };

        let iv = hex::decode(iv_hex).map_err(|e| CredentialError::InvalidHex {
            field: "iv",
            reason: e.to_string(),
        })?;
        let iv: [u8; IV_LEN] = iv
            .as_slice()
            .try_into()
            .map_err(|_| CredentialError::InvalidIv { len: iv.len() })?;

        let ciphertext = hex::decode(ct_hex).map_err(|e| CredentialError::InvalidHex {
            field: "ciphertext",
            reason: e.to_string(),
        })?;

        Ok(Self { iv, ciphertext })
    }
}

/// AES-256-CBC cipher bound to the fixed credential key.
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; KEY_LEN],
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialCipher { key: [REDACTED] }")
    }
}

impl CredentialCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Build from a 64-character hex key.
    pub fn from_hex(key_hex: &str) -> Result<Self, CredentialError> {
        let key_hex = key_hex.trim();
        if key_hex.len() != KEY_LEN * 2 {
            return Err(CredentialError::InvalidKey { len: key_hex.len() });
        }
        let bytes = hex::decode(key_hex).map_err(|e| CredentialError::InvalidHex {
            field: "key",
            reason: e.to_string(),
        })?;
        let key: [u8; KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CredentialError::InvalidKey { len: key_hex.len() })?;
        Ok(Self::new(key))
    }

    /// Build from a secret hex key held in configuration.
    pub fn from_secret(key_hex: &SecretString) -> Result<Self, CredentialError> {
        Self::from_hex(key_hex.expose_secret())
    }

    /// Decrypt a `hex(iv):hex(ciphertext)` string into the plaintext password.
    ///
    /// Any failure yields an error; partial plaintext is never returned.
    pub fn decrypt(&self, encoded: &str) -> Result<SecretString, CredentialError> {
        let encrypted: EncryptedCredential = encoded.parse()?;
        self.decrypt_parts(&encrypted)
    }

    pub fn decrypt_parts(
        &self,
        encrypted: &EncryptedCredential,
    ) -> Result<SecretString, CredentialError> {
        let decryptor = Aes256CbcDec::new_from_slices(&self.key, &encrypted.iv)
            .map_err(|e| CredentialError::Decrypt(e.to_string()))?;
        let plaintext = decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(&encrypted.ciphertext)
            .map_err(|e| CredentialError::Decrypt(e.to_string()))?;
        let password = String::from_utf8(plaintext).map_err(|_| CredentialError::InvalidUtf8)?;
        Ok(SecretString::from(password))
    }

    /// Encrypt a password under a caller-chosen IV.
    pub fn encrypt_with_iv(&self, plaintext: &str, iv: [u8; IV_LEN]) -> EncryptedCredential {
        // Key and IV lengths are fixed by the types, so construction cannot fail.
        let encryptor = Aes256CbcEnc::new(&self.key.into(), &iv.into());
        let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        EncryptedCredential { iv, ciphertext }
    }

    /// Encrypt a password under a fresh random IV, in the stored string form.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let iv: [u8; IV_LEN] = rand::random();
        self.encrypt_with_iv(plaintext, iv).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn cipher() -> CredentialCipher {
        CredentialCipher::from_hex(KEY_HEX).unwrap()
    }

    #[test]
    fn roundtrip_with_fixed_iv() {
        let iv = [7u8; IV_LEN];
        let encoded = cipher().encrypt_with_iv("abcd efgh ijkl mnop", iv).to_string();
        assert!(encoded.starts_with(&format!("{}:", hex::encode(iv))));

        let password = cipher().decrypt(&encoded).unwrap();
        assert_eq!(password.expose_secret(), "abcd efgh ijkl mnop");
    }

    #[test]
    fn roundtrip_with_random_iv() {
        let encoded = cipher().encrypt("s3nh@-app");
        let password = cipher().decrypt(&encoded).unwrap();
        assert_eq!(password.expose_secret(), "s3nh@-app");
    }

    #[test]
    fn short_password_fits_one_block() {
        let encrypted = cipher().encrypt_with_iv(
            "password",
            [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
        );
        assert_eq!(encrypted.ciphertext.len(), 16);
        let password = cipher().decrypt_parts(&encrypted).unwrap();
        assert_eq!(password.expose_secret(), "password");
    }

    #[test]
    fn wrong_part_count_rejected() {
        assert!(matches!(
            cipher().decrypt("deadbeef"),
            Err(CredentialError::MalformedInput { parts: 1 })
        ));
        assert!(matches!(
            cipher().decrypt("aa:bb:cc"),
            Err(CredentialError::MalformedInput { parts: 3 })
        ));
    }

    #[test]
    fn invalid_hex_rejected() {
        let iv = hex::encode([0u8; IV_LEN]);
        assert!(matches!(
            cipher().decrypt(&format!("{iv}:zz")),
            Err(CredentialError::InvalidHex { field: "ciphertext", .. })
        ));
        assert!(matches!(
            cipher().decrypt("not-hex:00"),
            Err(CredentialError::InvalidHex { field: "iv", .. })
        ));
    }

    #[test]
    fn short_iv_rejected() {
        assert!(matches!(
            cipher().decrypt("0011:00112233445566778899aabbccddeeff"),
            Err(CredentialError::InvalidIv { len: 2 })
        ));
    }

    #[test]
    fn truncated_ciphertext_rejected() {
        let encoded = cipher().encrypt_with_iv("a longer password value", [1; IV_LEN]);
        let truncated = EncryptedCredential {
            iv: encoded.iv,
            ciphertext: encoded.ciphertext[..encoded.ciphertext.len() - 3].to_vec(),
        };
        assert!(matches!(
            cipher().decrypt_parts(&truncated),
            Err(CredentialError::Decrypt(_))
        ));
    }

    #[test]
    fn empty_ciphertext_rejected() {
        let iv = hex::encode([0u8; IV_LEN]);
        assert!(cipher().decrypt(&format!("{iv}:")).is_err());
    }

    #[test]
    fn wrong_key_never_yields_plaintext() {
        let encoded = cipher().encrypt("hunter2");
        let other = CredentialCipher::new([0xAB; KEY_LEN]);
        // A wrong key almost always breaks the padding; when it happens not to,
        // the plaintext is still garbage.
        if let Ok(password) = other.decrypt(&encoded) {
            assert_ne!(password.expose_secret(), "hunter2");
        }
    }

    #[test]
    fn key_length_enforced() {
        assert!(matches!(
            CredentialCipher::from_hex("00ff"),
            Err(CredentialError::InvalidKey { len: 4 })
        ));
        let bad = "zz".repeat(KEY_LEN);
        assert!(matches!(
            CredentialCipher::from_hex(&bad),
            Err(CredentialError::InvalidHex { field: "key", .. })
        ));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let rendered = format!("{:?}", cipher());
        assert!(!rendered.contains("0001"));
        assert!(rendered.contains("REDACTED"));
    }
}
