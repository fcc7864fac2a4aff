use crate::config::KeyMaterial;
use crate::domain::card::{CVV_LENGTH, Cvv, Expiry, Pan};
use crate::error::{BankError, Result};
use aes_gcm::Aes256Gcm;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};

/// AES-GCM nonce used for every derivation.
///
/// A constant nonce is what makes the derivation repeatable: the same PAN and
/// expiry under the same key always seal to the same ciphertext, so the code
/// can be recomputed on every read instead of stored. The trade-off is that
/// the construction is only as strong as a keyed PRF over distinct inputs;
/// it must not be reused to encrypt anything else under this key.
const FIXED_NONCE: [u8; 12] = [0; 12];

/// Derives card verification codes from `(PAN, expiry)`.
///
/// Holds nothing but the keyed cipher, so one instance can be shared by
/// concurrent callers.
#[derive(Clone)]
pub struct CvvDeriver {
    cipher: Aes256Gcm,
}

impl CvvDeriver {
    pub fn new(key: &KeyMaterial) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| BankError::Config(format!("invalid CVV key: {e}")))?;
        Ok(Self { cipher })
    }

    pub fn derive(&self, pan: &Pan, expiry: Expiry) -> Result<Cvv> {
        let plaintext = format!("{}|{}", pan.as_str(), expiry);
        let nonce = GenericArray::from_slice(&FIXED_NONCE);
        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| BankError::Generation(format!("CVV derivation failed: {e}")))?;

        let mut head = [0u8; CVV_LENGTH];
        head.copy_from_slice(&sealed[..CVV_LENGTH]);
        Ok(Cvv::from_bytes(head))
    }
}
