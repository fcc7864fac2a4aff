use crate::error::{BankError, Result};
use chrono::{DateTime, Utc};
use std::fmt;

pub const KEY_LENGTH: usize = 32;
pub const DEFAULT_SCHEME_DIGIT: u8 = 4;
pub const DEFAULT_CARD_VALIDITY_YEARS: u32 = 4;
pub const MAX_CARD_VALIDITY_YEARS: u32 = 50;
pub const DEFAULT_MAX_CREDIT_TERM_MONTHS: u32 = 600;

/// 32 bytes of secret key material. `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial([u8; KEY_LENGTH]);

impl KeyMaterial {
    pub fn new(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parses a 64-character hex string.
    pub fn from_hex(name: &str, value: &str) -> Result<Self> {
        let bytes = hex::decode(value.trim())
            .map_err(|e| BankError::Config(format!("{name} is not valid hex: {e}")))?;
        let bytes: [u8; KEY_LENGTH] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            BankError::Config(format!(
                "{name} must be {KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

/// Everything the engines need from the outside world at construction time.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Key of the AEAD used to derive CVVs.
    pub cvv_key: KeyMaterial,
    /// Secret half of the key pair that seals PANs at rest.
    pub pan_key: KeyMaterial,
    /// Leading digit of every generated PAN.
    pub card_scheme_digit: u8,
    pub card_validity_years: u32,
    pub max_credit_term_months: u32,
}

impl EngineConfig {
    pub fn new(cvv_key: KeyMaterial, pan_key: KeyMaterial) -> Self {
        Self {
            cvv_key,
            pan_key,
            card_scheme_digit: DEFAULT_SCHEME_DIGIT,
            card_validity_years: DEFAULT_CARD_VALIDITY_YEARS,
            max_credit_term_months: DEFAULT_MAX_CREDIT_TERM_MONTHS,
        }
    }

    pub fn from_hex_keys(cvv_key: &str, pan_key: &str) -> Result<Self> {
        let config = Self::new(
            KeyMaterial::from_hex("CVV key", cvv_key)?,
            KeyMaterial::from_hex("PAN key", pan_key)?,
        );
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=9).contains(&self.card_scheme_digit) {
            return Err(BankError::Config(format!(
                "card scheme digit must be 1-9, got {}",
                self.card_scheme_digit
            )));
        }
        if !(1..=MAX_CARD_VALIDITY_YEARS).contains(&self.card_validity_years) {
            return Err(BankError::Config(format!(
                "card validity must be 1-{MAX_CARD_VALIDITY_YEARS} years, got {}",
                self.card_validity_years
            )));
        }
        if self.max_credit_term_months == 0 {
            return Err(BankError::Config(
                "maximum credit term must be at least one month".to_string(),
            ));
        }
        if self.cvv_key == self.pan_key {
            return Err(BankError::Config(
                "CVV key and PAN key must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
