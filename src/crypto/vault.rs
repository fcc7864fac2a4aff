use crate::config::KeyMaterial;
use crate::domain::card::Pan;
use crate::error::{BankError, Result};
use crypto_box::{PublicKey, SecretKey};
use rand::rngs::OsRng;

/// Encrypts PANs for storage and opens them again on read.
pub trait PanVault: Send + Sync {
    fn seal(&self, pan: &Pan) -> Result<Vec<u8>>;
    fn open(&self, ciphertext: &[u8]) -> Result<Pan>;
}

/// Public-key sealing with X25519 sealed boxes.
///
/// Sealing only needs the public key; opening needs the secret key that the
/// public key was derived from.
pub struct SealedBoxVault {
    secret: SecretKey,
    public: PublicKey,
}

impl SealedBoxVault {
    pub fn new(secret_key: &KeyMaterial) -> Self {
        let secret = SecretKey::from(*secret_key.as_bytes());
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl PanVault for SealedBoxVault {
    fn seal(&self, pan: &Pan) -> Result<Vec<u8>> {
        self.public
            .seal(&mut OsRng, pan.as_str().as_bytes())
            .map_err(|e| BankError::Encryption(format!("sealing PAN failed: {e}")))
    }

    fn open(&self, ciphertext: &[u8]) -> Result<Pan> {
        let plaintext = self
            .secret
            .unseal(ciphertext)
            .map_err(|e| BankError::Decryption(format!("opening PAN failed: {e}")))?;
        let number = String::from_utf8(plaintext)
            .map_err(|_| BankError::Decryption("PAN is not valid UTF-8".to_string()))?;
        Pan::parse(&number).map_err(|e| BankError::Decryption(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pan() -> Pan {
        Pan::parse("4111111111111111").unwrap()
    }

    #[test]
    fn test_seal_and_open() {
        let vault = SealedBoxVault::new(&KeyMaterial::new([9; 32]));
        let sealed = vault.seal(&pan()).unwrap();

        assert!(!sealed.windows(16).any(|w| w == pan().as_str().as_bytes()));
        assert_eq!(vault.open(&sealed).unwrap(), pan());
    }

    #[test]
    fn test_sealing_is_randomized() {
        let vault = SealedBoxVault::new(&KeyMaterial::new([9; 32]));
        assert_ne!(vault.seal(&pan()).unwrap(), vault.seal(&pan()).unwrap());
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let sealed = SealedBoxVault::new(&KeyMaterial::new([9; 32]))
            .seal(&pan())
            .unwrap();
        let other = SealedBoxVault::new(&KeyMaterial::new([10; 32]));
        assert!(matches!(other.open(&sealed), Err(BankError::Decryption(_))));
    }

    #[test]
    fn test_open_garbage_fails() {
        let vault = SealedBoxVault::new(&KeyMaterial::new([9; 32]));
        assert!(matches!(vault.open(b"short"), Err(BankError::Decryption(_))));
    }
}
