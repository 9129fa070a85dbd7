//! core::address
//!
//! Validated site addresses.
//!
//! # Validation
//!
//! An address is 26 to 35 ASCII alphanumeric characters. Invalid values
//! cannot be represented, so every key the registry holds is known to be
//! well-formed.
//!
//! # Identity
//!
//! Addresses are stored with the casing they were first registered under,
//! but identity is case-insensitive: `1ABC...` and `1abc...` name the same
//! site. Use [`Address::same_site`] when comparing.
//!
//! # Examples
//!
//! ```
//! use sitekeeper::core::address::Address;
//!
//! let addr = Address::new("1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D").unwrap();
//! assert_eq!(addr.as_str(), "1HeLLo4uzjaLetFx6NH3PMwFP3qbRbTf3D");
//! assert!(addr.same_site("1hello4uzjaletfx6nh3pmwfp3qbrbtf3d"));
//!
//! assert!(Address::new("too-short").is_err());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum address length in characters.
pub const MIN_LEN: usize = 26;

/// Maximum address length in characters.
pub const MAX_LEN: usize = 35;

/// Errors from address validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address '{0}': must be 26-35 characters, got {1}")]
    BadLength(String, usize),

    #[error("invalid address '{0}': only ASCII letters and digits are allowed")]
    BadCharacter(String),
}

/// A validated site address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Create a new validated address.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] if the length is outside 26..=35 or the
    /// value contains anything but ASCII letters and digits.
    pub fn new(value: impl Into<String>) -> Result<Self, AddressError> {
        let value = value.into();
        Self::validate(&value)?;
        Ok(Self(value))
    }

    /// Check whether a string is a syntactically valid address.
    pub fn is_valid(value: &str) -> bool {
        Self::validate(value).is_ok()
    }

    fn validate(value: &str) -> Result<(), AddressError> {
        // Byte length equals char length once we know it is all ASCII,
        // so check characters first.
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AddressError::BadCharacter(value.to_string()));
        }
        let len = value.len();
        if !(MIN_LEN..=MAX_LEN).contains(&len) {
            return Err(AddressError::BadLength(value.to_string(), len));
        }
        Ok(())
    }

    /// Get the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded form used for identity comparisons.
    pub fn canonical(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Whether `other` names the same site, ignoring case.
    pub fn same_site(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
