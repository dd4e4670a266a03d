//! Session code grammar
//!
//! A session code is exactly four characters from `[A-Z0-9]`, stored
//! uppercase. Input is case-insensitive.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A validated four-character session code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Parse a code from client input. Uppercases, then validates
    /// length and alphabet.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let upper = input.trim().to_ascii_uppercase();
        if upper.len() != 4 || !upper.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(Error::InvalidSessionCode(input.to_string()));
        }
        Ok(Self(upper))
    }

    /// The uppercase code string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Error> {
        Self::parse(&value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}
