//! Recording URL encryption
//!
//! Recording URLs are sensitive (they dereference to caller audio), so they
//! are sealed with AES-256-GCM before touching the database. Each user gets
//! their own key derived from the master secret, and every operation uses a
//! fresh random nonce; ciphertexts are `base64(nonce ‖ ct)`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use hmac::{Hmac, Mac};
use reverie_core::UserId;
use sha2::Sha256;

use crate::error::{AdapterError, Result};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

/// Per-user authenticated encryption for recording URLs.
pub struct RecordingCipher {
    master_key: Vec<u8>,
}

impl RecordingCipher {
    pub fn new(master_key: impl AsRef<[u8]>) -> Self {
        Self {
            master_key: master_key.as_ref().to_vec(),
        }
    }

    fn user_cipher(&self, user: &UserId) -> Aes256Gcm {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.master_key)
            .expect("hmac accepts any key length");
        mac.update(user.as_str().as_bytes());
        let derived = mac.finalize().into_bytes();
        let key = Key::<Aes256Gcm>::from_slice(derived.as_slice());
        Aes256Gcm::new(key)
    }

    pub fn encrypt_recording_url(&self, user: &UserId, url: &str) -> Result<String> {
        let cipher = self.user_cipher(user);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, url.as_bytes())
            .map_err(|_| AdapterError::permanent("recording url encryption failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    }

    pub fn decrypt_recording_url(&self, user: &UserId, sealed: &str) -> Result<String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(sealed)
            .map_err(|_| AdapterError::permanent("sealed recording url is not base64"))?;
        if bytes.len() < NONCE_LEN {
            return Err(AdapterError::permanent("sealed recording url too short"));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let cipher = self.user_cipher(user);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| AdapterError::permanent("recording url decryption failed"))?;

        String::from_utf8(plaintext)
            .map_err(|_| AdapterError::permanent("decrypted recording url is not utf-8"))
    }
}
