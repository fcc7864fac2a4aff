use super::account::AccountId;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type CardId = i64;

pub const PAN_LENGTH: usize = 16;
pub const CVV_LENGTH: usize = 3;

/// Computes the Luhn check digit for `payload`, a sequence of digit values
/// (0-9) that will be followed by the check digit.
///
/// Starting from the rightmost payload digit, every second digit is doubled
/// and reduced by 9 when the result exceeds 9.
pub fn luhn_check_digit(payload: &[u8]) -> u8 {
    let sum: u32 = payload
        .iter()
        .rev()
        .enumerate()
        .map(|(position, &digit)| {
            let digit = u32::from(digit);
            if position % 2 == 0 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                digit
            }
        })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// Returns true when `number` is all ASCII digits and its last digit is the
/// Luhn check digit of the rest.
pub fn luhn_valid(number: &str) -> bool {
    if number.len() < 2 || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u8> = number.bytes().map(|b| b - b'0').collect();
    let (payload, check) = digits.split_at(digits.len() - 1);
    luhn_check_digit(payload) == check[0]
}

/// A 16-digit, Luhn-valid primary account number.
///
/// `Debug` only shows the last four digits.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pan(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPan;

impl fmt::Display for InvalidPan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a {PAN_LENGTH}-digit Luhn-valid card number")
    }
}

impl std::error::Error for InvalidPan {}

impl Pan {
    pub fn parse(number: &str) -> Result<Self, InvalidPan> {
        if number.len() == PAN_LENGTH && luhn_valid(number) {
            Ok(Self(number.to_string()))
        } else {
            Err(InvalidPan)
        }
    }

    /// Builds a PAN from its first fifteen digit values, appending the check
    /// digit.
    pub fn from_payload(payload: &[u8; PAN_LENGTH - 1]) -> Result<Self, InvalidPan> {
        if payload.iter().any(|&digit| digit > 9) {
            return Err(InvalidPan);
        }
        let mut number: String = payload.iter().map(|&d| char::from(b'0' + d)).collect();
        number.push(char::from(b'0' + luhn_check_digit(payload)));
        Ok(Self(number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn last_four(&self) -> &str {
        &self.0[PAN_LENGTH - 4..]
    }

    pub fn masked(&self) -> String {
        format!("{}{}", "*".repeat(PAN_LENGTH - 4), self.last_four())
    }
}

impl fmt::Debug for Pan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pan").field(&self.masked()).finish()
    }
}

impl fmt::Display for Pan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Pan {
    type Error = InvalidPan;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pan> for String {
    fn from(pan: Pan) -> Self {
        pan.0
    }
}

/// Card expiry, month (1-12) and four-digit year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Expiry {
    pub month: u32,
    pub year: i32,
}

impl Expiry {
    /// Expiry for a card issued at `issued_at` and valid for `years` years:
    /// same month, year shifted. `None` if the year does not fit.
    pub fn from_issue(issued_at: DateTime<Utc>, years: u32) -> Option<Self> {
        let year = i32::try_from(years)
            .ok()
            .and_then(|years| issued_at.year().checked_add(years))?;
        Some(Self {
            month: issued_at.month(),
            year,
        })
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:04}", self.month, self.year)
    }
}

/// A three-digit card verification value. Never persisted.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Cvv(String);

impl Cvv {
    /// Maps each byte to one ASCII digit (`byte % 10`).
    pub fn from_bytes(bytes: [u8; CVV_LENGTH]) -> Self {
        Self(bytes.iter().map(|b| char::from(b'0' + b % 10)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Cvv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cvv(***)")
    }
}

/// A card as handed to callers: plaintext PAN and a freshly derived CVV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub id: CardId,
    pub account_id: AccountId,
    pub pan: Pan,
    pub expiry: Expiry,
    pub cvv: Cvv,
    pub cardholder_name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A card as persisted: the PAN only as ciphertext, no CVV at all.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct StoredCard {
    pub id: CardId,
    pub account_id: AccountId,
    pub encrypted_pan: Vec<u8>,
    pub expiry: Expiry,
    pub cardholder_name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCard {
    pub account_id: AccountId,
    pub encrypted_pan: Vec<u8>,
    pub expiry: Expiry,
    pub cardholder_name: String,
    pub created_at: DateTime<Utc>,
}

impl StoredCard {
    pub fn from_new(id: CardId, new: NewCard) -> Self {
        Self {
            id,
            account_id: new.account_id,
            encrypted_pan: new.encrypted_pan,
            expiry: new.expiry,
            cardholder_name: new.cardholder_name,
            active: true,
            created_at: new.created_at,
        }
    }

    pub fn reveal(self, pan: Pan, cvv: Cvv) -> Card {
        Card {
            id: self.id,
            account_id: self.account_id,
            pan,
            expiry: self.expiry,
            cvv,
            cardholder_name: self.cardholder_name,
            active: self.active,
            created_at: self.created_at,
        }
    }
}
