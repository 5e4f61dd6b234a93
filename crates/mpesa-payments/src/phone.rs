//! Phone Number Normalization
//!
//! Every phone number that reaches the store is in the canonical
//! international form `2547XXXXXXXX` / `2541XXXXXXXX` (12 digits).
//!
//! | Input           | Canonical        |
//! |-----------------|------------------|
//! | `0712 345 678`  | `254712345678`   |
//! | `712345678`     | `254712345678`   |
//! | `+254712345678` | `254712345678`   |
//! | `254712345678.0` (gateway only) | `254712345678` |

use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// Kenyan country calling code
pub const COUNTRY_CODE: &str = "254";

/// Canonical phone number (`254` followed by 9 subscriber digits)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalize a phone number typed by a user.
    ///
    /// Separators (spaces, dashes, brackets, a leading `+`) are ignored.
    pub fn parse(input: &str) -> Result<Self> {
        let digits: String = input.chars().filter(char::is_ascii_digit).collect();

        if digits.is_empty() {
            return Err(PaymentError::Validation("Phone number is required".into()));
        }

        let canonical = if digits.starts_with(COUNTRY_CODE) && digits.len() == 12 {
            digits
        } else if digits.starts_with('0') && digits.len() == 10 {
            format!("{COUNTRY_CODE}{}", &digits[1..])
        } else if digits.starts_with('7') && digits.len() == 9 {
            format!("{COUNTRY_CODE}{digits}")
        } else {
            return Err(PaymentError::Validation(format!(
                "Invalid phone number format. Expected 07XXXXXXXX or 2547XXXXXXXX, got {input}"
            )));
        };

        Ok(Self(canonical))
    }

    /// Normalize a phone number echoed back by the gateway.
    ///
    /// The callback serializes the payer's number as a float, so
    /// `254712345678.0` is accepted in addition to everything [`parse`](Self::parse) takes.
    pub fn from_gateway(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        Self::parse(trimmed.strip_suffix(".0").unwrap_or(trimmed))
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

impl TryFrom<String> for PhoneNumber {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_formats() {
        assert_eq!(PhoneNumber::parse("0712345678").unwrap().as_str(), "254712345678");
        assert_eq!(PhoneNumber::parse("712345678").unwrap().as_str(), "254712345678");
        assert_eq!(PhoneNumber::parse("0712 345-678").unwrap().as_str(), "254712345678");
    }

    #[test]
    fn test_canonical_is_unchanged() {
        let once = PhoneNumber::parse("+254 712 345 678").unwrap();
        assert_eq!(once.as_str(), "254712345678");

        let twice = PhoneNumber::parse(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_gateway_float_form() {
        let phone = PhoneNumber::from_gateway("254712345678.0").unwrap();
        assert_eq!(phone.as_str(), "254712345678");

        // User input never carries a fractional part
        assert!(PhoneNumber::parse("254712345678.0").is_err());
    }

    #[test]
    fn test_rejects_malformed() {
        for input in ["", "123", "1712345678", "812345678", "25471234567", "07123456789"] {
            let err = PhoneNumber::parse(input).unwrap_err();
            assert!(matches!(err, PaymentError::Validation(_)), "{input} should fail");
        }
    }

    #[test]
    fn test_error_names_formats() {
        let err = PhoneNumber::parse("123").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("07XXXXXXXX"));
        assert!(msg.contains("123"));
    }

    #[test]
    fn test_serde_round_trip_normalizes() {
        let phone: PhoneNumber = serde_json::from_str("\"0712345678\"").unwrap();
        assert_eq!(serde_json::to_string(&phone).unwrap(), "\"254712345678\"");
    }
}
