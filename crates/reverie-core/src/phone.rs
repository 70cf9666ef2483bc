//! E.164 phone number validation

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A validated E.164 phone number (e.g. `+16175551212`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse and validate an E.164 number: leading `+`, 8 to 15 digits,
    /// first digit non-zero.
    pub fn parse(raw: &str) -> Result<Self> {
        let digits = raw
            .strip_prefix('+')
            .ok_or_else(|| CoreError::InvalidPhoneNumber(format!("{raw}: missing leading '+'")))?;

        if !(8..=15).contains(&digits.len()) {
            return Err(CoreError::InvalidPhoneNumber(format!(
                "{raw}: expected 8-15 digits, got {}",
                digits.len()
            )));
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::InvalidPhoneNumber(format!(
                "{raw}: non-digit characters"
            )));
        }
        if digits.starts_with('0') {
            return Err(CoreError::InvalidPhoneNumber(format!(
                "{raw}: country code cannot start with 0"
            )));
        }

        Ok(PhoneNumber(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_e164() {
        let n = PhoneNumber::parse("+16175551212").unwrap();
        assert_eq!(n.as_str(), "+16175551212");
        PhoneNumber::parse("+442071838750").unwrap();
    }

    #[test]
    fn rejects_missing_plus() {
        assert!(PhoneNumber::parse("16175551212").is_err());
    }

    #[test]
    fn rejects_short_and_long() {
        assert!(PhoneNumber::parse("+1234567").is_err());
        assert!(PhoneNumber::parse("+1234567890123456").is_err());
    }

    #[test]
    fn rejects_non_digits() {
        assert!(PhoneNumber::parse("+1617555121a").is_err());
        assert!(PhoneNumber::parse("+1 617 555 1212").is_err());
    }

    #[test]
    fn rejects_leading_zero_country_code() {
        assert!(PhoneNumber::parse("+06175551212").is_err());
    }
}
