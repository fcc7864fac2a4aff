use crate::domain::card::{PAN_LENGTH, Pan};
use crate::error::{BankError, Result};
use rand::RngCore;
use rand::rngs::OsRng;

/// A cryptographically secure byte source, shareable across tasks.
pub trait RandomSource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()>;
}

/// The operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| BankError::Generation(format!("random source failed: {e}")))
    }
}

/// Largest multiple of 10 that fits in a byte; bytes at or above it are
/// rejected so every digit is equally likely.
const DIGIT_REJECTION_BOUND: u8 = 250;

/// Fills `digits` with values uniformly distributed over 0-9.
pub fn random_digits(source: &dyn RandomSource, digits: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    let mut buf = [0u8; 32];
    while filled < digits.len() {
        source.fill_bytes(&mut buf)?;
        for &byte in buf.iter().filter(|&&b| b < DIGIT_REJECTION_BOUND) {
            if filled == digits.len() {
                break;
            }
            digits[filled] = byte % 10;
            filled += 1;
        }
    }
    Ok(())
}

/// Generates a PAN: the scheme digit, fourteen random digits and the Luhn
/// check digit.
pub fn generate_pan(source: &dyn RandomSource, scheme_digit: u8) -> Result<Pan> {
    let mut payload = [0u8; PAN_LENGTH - 1];
    payload[0] = scheme_digit;
    random_digits(source, &mut payload[1..])?;
    Pan::from_payload(&payload)
        .map_err(|e| BankError::Generation(format!("scheme digit {scheme_digit}: {e}")))
}
