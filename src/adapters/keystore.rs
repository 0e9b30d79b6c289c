//! AES-256-CBC keystore
//!
//! Encrypted keys are stored by the backend as `iv_hex:ciphertext_hex` with a
//! random 16-byte IV and PKCS#7 padding. The plaintext is the hex private key.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::ports::{KeyDecryptor, KeyError, SigningKey};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

pub struct AesCbcKeystore {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl AesCbcKeystore {
    /// Build from a 64-character hex encryption key
    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(
            hex::decode(hex_key.trim())
                .map_err(|e| KeyError::InvalidEncryptionKey(e.to_string()))?,
        );
        if bytes.len() != KEY_LEN {
            return Err(KeyError::InvalidEncryptionKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }

    /// Encrypt a plaintext key into `iv_hex:ciphertext_hex`
    pub fn encrypt(&self, plaintext: &str) -> Result<String, KeyError> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new_from_slices(&self.key[..], &iv)
            .map_err(|e| KeyError::InvalidEncryptionKey(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(format!("{}:{}", hex::encode(iv), hex::encode(ciphertext)))
    }
}

impl KeyDecryptor for AesCbcKeystore {
    fn decrypt(&self, encrypted: &str) -> Result<SigningKey, KeyError> {
        let (iv_hex, ct_hex) = encrypted
            .trim()
            .split_once(':')
            .ok_or_else(|| KeyError::Malformed("expected 'iv_hex:ciphertext_hex'".to_string()))?;

        let iv = hex::decode(iv_hex).map_err(|e| KeyError::Malformed(format!("iv: {}", e)))?;
        if iv.len() != IV_LEN {
            return Err(KeyError::Malformed(format!("iv must be {} bytes", IV_LEN)));
        }
        let ciphertext =
            hex::decode(ct_hex).map_err(|e| KeyError::Malformed(format!("ciphertext: {}", e)))?;

        let plaintext = Zeroizing::new(
            Aes256CbcDec::new_from_slices(&self.key[..], &iv)
                .map_err(|e| KeyError::InvalidEncryptionKey(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
                .map_err(|_| KeyError::DecryptionFailed)?,
        );

        let key = std::str::from_utf8(&plaintext).map_err(|_| KeyError::DecryptionFailed)?;
        Ok(SigningKey::new(key.trim()))
    }
}
