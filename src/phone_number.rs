//! Phone number parsing and normalisation.
//!
//! Inbound numbers are free-form strings such as `"+44 20 7946 0958"` or
//! `"(415) 555-2671"`. A leading `+` means the country calling code is part
//! of the number; otherwise the configured default country code applies.
//! Country metadata comes from the `phonenumber` crate, which also drops the
//! national trunk prefix.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::InvalidChoice;

const MIN_NATIONAL_DIGITS: usize = 4;
const MAX_NATIONAL_DIGITS: usize = 14;
const MAX_TOTAL_DIGITS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneNumberError {
    #[error("This field may not be blank.")]
    Blank,

    #[error("Enter a valid phone number.")]
    InvalidCharacter,

    #[error("The phone number entered is not valid.")]
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountryCodeSource {
    FromNumberWithPlusSign,
    FromDefaultCountry,
}

impl CountryCodeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CountryCodeSource::FromNumberWithPlusSign => "from_number_with_plus_sign",
            CountryCodeSource::FromDefaultCountry => "from_default_country",
        }
    }
}

impl FromStr for CountryCodeSource {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "from_number_with_plus_sign" => Ok(CountryCodeSource::FromNumberWithPlusSign),
            "from_default_country" => Ok(CountryCodeSource::FromDefaultCountry),
            other => Err(InvalidChoice(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhoneNumber {
    /// National significant number, digits only.
    pub value: String,
    pub country_code: u16,
    pub country_code_source: CountryCodeSource,
}

impl PhoneNumber {
    /// Parses `input`, stripping separators and any national trunk prefix,
    /// so `+44 20 7946 0025` and `+44 020 7946 0025` give the same number.
    pub fn parse(input: &str, default_country_code: u16) -> Result<Self, PhoneNumberError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(PhoneNumberError::Blank);
        }

        let (has_plus, rest) = match trimmed.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let mut digits = String::with_capacity(rest.len());
        for c in rest.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => return Err(PhoneNumberError::InvalidCharacter),
            }
        }

        let (international, source) = if has_plus {
            (format!("+{digits}"), CountryCodeSource::FromNumberWithPlusSign)
        } else {
            (
                format!("+{default_country_code}{digits}"),
                CountryCodeSource::FromDefaultCountry,
            )
        };

        let parsed =
            phonenumber::parse(None, &international).map_err(|_| PhoneNumberError::Invalid)?;
        let national = parsed.national();
        let value = format!("{}{}", "0".repeat(usize::from(national.zeros())), national.value());
        let country_code = parsed.code().value();

        let total = value.len() + country_code.to_string().len();
        if !(MIN_NATIONAL_DIGITS..=MAX_NATIONAL_DIGITS).contains(&value.len())
            || total > MAX_TOTAL_DIGITS
        {
            return Err(PhoneNumberError::Invalid);
        }

        Ok(PhoneNumber {
            value,
            country_code,
            country_code_source: source,
        })
    }

    pub fn e164(&self) -> String {
        format!("+{}{}", self.country_code, self.value)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.e164())
    }
}
