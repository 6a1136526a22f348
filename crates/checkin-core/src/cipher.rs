// # Contact Cipher
//
// Symmetric encryption of a single string field (the subscriber's contact
// address) for storage at rest.
//
// ## Algorithm
//
// - Key: SHA-256 of the configured master secret (32 bytes, AES-256)
// - Mode: AES-256-GCM, authenticated; tampered tokens fail to decrypt
// - IV: 12 random bytes from the OS RNG, fresh on every `encrypt`
//
// ## Token Format
//
// ```text
// <hex iv>:<hex ciphertext+tag>
// ```
//
// Tokens are plain ASCII so they can live in the JSON store as-is.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TOKEN_DELIMITER: char = ':';

/// Fixed-length key derived from the master secret
///
/// The raw secret is hashed once at construction and never kept. Key bytes
/// are wiped on drop and never printed.
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; KEY_LEN]>);

impl MasterKey {
    /// Derive the key from an external secret value
    pub fn derive(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::config("Master secret cannot be empty"));
        }

        let digest = Sha256::digest(secret.as_bytes());
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&digest);
        Ok(Self(key))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<REDACTED>)")
    }
}

/// Encrypts and decrypts contact addresses
///
/// # Example
///
/// ```rust
/// use checkin_core::cipher::{Cipher, MasterKey};
///
/// let cipher = Cipher::new(&MasterKey::derive("correct horse battery staple").unwrap());
/// let token = cipher.encrypt("a@x.com").unwrap();
/// assert_eq!(cipher.decrypt(&token).unwrap().as_str(), "a@x.com");
/// ```
#[derive(Clone)]
pub struct Cipher {
    aead: Aes256Gcm,
}

impl Cipher {
    /// Create a cipher bound to the given key
    pub fn new(key: &MasterKey) -> Self {
        Self {
            aead: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0[..])),
        }
    }

    /// Encrypt a plaintext string into a storable token
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let body = self
            .aead
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| Error::Other("Contact encryption failed".to_string()))?;

        Ok(format!(
            "{}{}{}",
            hex::encode(iv),
            TOKEN_DELIMITER,
            hex::encode(body)
        ))
    }

    /// Decrypt a token produced by [`Cipher::encrypt`] under the same key
    ///
    /// The plaintext is returned in a buffer that is wiped when dropped.
    pub fn decrypt(&self, token: &str) -> Result<Zeroizing<String>> {
        let (iv_hex, body_hex) = token
            .split_once(TOKEN_DELIMITER)
            .ok_or_else(|| Error::decrypt("token has no IV delimiter"))?;

        if iv_hex.is_empty() {
            return Err(Error::decrypt("token IV is missing"));
        }

        let iv = hex::decode(iv_hex).map_err(|e| Error::decrypt(format!("bad IV encoding: {}", e)))?;
        if iv.len() != IV_LEN {
            return Err(Error::decrypt(format!(
                "IV must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            )));
        }

        let body =
            hex::decode(body_hex).map_err(|e| Error::decrypt(format!("bad body encoding: {}", e)))?;

        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(&iv), body.as_ref())
            .map_err(|_| Error::decrypt("authentication failed"))?;

        let plaintext = Zeroizing::new(plaintext);
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| Error::decrypt("plaintext is not valid UTF-8"))?;
        Ok(Zeroizing::new(text.to_string()))
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("algorithm", &"aes-256-gcm")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(secret: &str) -> Cipher {
        Cipher::new(&MasterKey::derive(secret).unwrap())
    }

    #[test]
    fn test_decrypt_inverts_encrypt() {
        let c = cipher("s3cret");
        let long = "x".repeat(4096);
        for plaintext in ["a@x.com", "", "ünïcødé@exämple.org", long.as_str()] {
            let token = c.encrypt(plaintext).unwrap();
            assert_eq!(c.decrypt(&token).unwrap().as_str(), plaintext);
        }
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let c = cipher("s3cret");
        let a = c.encrypt("a@x.com").unwrap();
        let b = c.encrypt("a@x.com").unwrap();
        assert_ne!(a, b);

        let (iv_a, _) = a.split_once(':').unwrap();
        let (iv_b, _) = b.split_once(':').unwrap();
        assert_ne!(iv_a, iv_b);
        assert_eq!(iv_a.len(), IV_LEN * 2);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = cipher("secret-one").encrypt("a@x.com").unwrap();
        let err = cipher("secret-two").decrypt(&token).unwrap_err();
        assert!(matches!(err, Error::Decrypt(_)));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let c = cipher("s3cret");
        let good = c.encrypt("a@x.com").unwrap();
        let (iv, body) = good.split_once(':').unwrap();

        let cases = [
            String::new(),
            "no-delimiter".to_string(),
            format!(":{}", body),
            format!("zz{}:{}", &iv[2..], body),
            format!("{}:{}", &iv[..10], body),
            format!("{}:{}", iv, "not-hex"),
            format!("{}:", iv),
        ];

        for token in cases {
            let err = c.decrypt(&token).unwrap_err();
            assert!(matches!(err, Error::Decrypt(_)), "token {:?} gave {:?}", token, err);
        }
    }

    #[test]
    fn test_tampered_body_rejected() {
        let c = cipher("s3cret");
        let token = c.encrypt("a@x.com").unwrap();
        let (iv, body) = token.split_once(':').unwrap();

        let mut bytes = hex::decode(body).unwrap();
        bytes[0] ^= 0x01;
        let tampered = format!("{}:{}", iv, hex::encode(bytes));

        assert!(matches!(c.decrypt(&tampered), Err(Error::Decrypt(_))));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(MasterKey::derive(""), Err(Error::Config(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = MasterKey::derive("s3cret").unwrap();
        assert_eq!(format!("{:?}", key), "MasterKey(<REDACTED>)");
    }
}
