//! Core identifier types for tether.
//!
//! This module provides strongly-typed identifiers for users, broker accounts,
//! and connected applications. All identifiers are validated on construction so
//! downstream code never sees an empty or malformed key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length accepted for any opaque identifier.
pub const MAX_ID_LEN: usize = 128;

/// Validate an opaque identifier and return its trimmed form.
fn validate_opaque(value: &str) -> Result<String, IdError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty);
    }
    let len = trimmed.chars().count();
    if len > MAX_ID_LEN {
        return Err(IdError::TooLong {
            max: MAX_ID_LEN,
            got: len,
        });
    }
    if let Some(c) = trimmed.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(IdError::InvalidCharacter(c));
    }
    Ok(trimmed.to_string())
}

/// Implements the string plumbing shared by every identifier newtype.
macro_rules! string_id {
    ($name:ident, $parse:path) => {
        impl $name {
            /// Return the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $parse(s).map(Self)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

/// A chat-platform user identifier.
///
/// This is the stable primary key every connection record is organized around.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

string_id!(UserId, validate_opaque);

/// An opaque account identifier issued by the authorization broker.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

string_id!(AccountId, validate_opaque);

/// The broker's identifier for a user who signed in interactively.
///
/// Distinct from [`UserId`]: the broker may key a person differently from the
/// chat platform.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalUserId(String);

string_id!(ExternalUserId, validate_opaque);

impl From<&UserId> for ExternalUserId {
    fn from(user_id: &UserId) -> Self {
        // Both share the same validation rules.
        Self(user_id.0.clone())
    }
}

/// A normalized connected-application name (e.g. `google_drive`).
///
/// Normalization lower-cases the input and collapses whitespace and `-` runs
/// into a single `_`, so `"Google Drive"`, `"google-drive"` and
/// `"google_drive"` all name the same app.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppName(String);

string_id!(AppName, AppName::normalize);

impl AppName {
    /// Normalize a raw application name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty after trimming, too long, or
    /// contains characters other than ASCII alphanumerics, `_`, `.`, `-` or
    /// whitespace.
    pub fn normalize(raw: &str) -> Result<String, IdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdError::Empty);
        }

        let mut out = String::with_capacity(trimmed.len());
        let mut pending_sep = false;
        for c in trimmed.chars() {
            if c.is_whitespace() || c == '-' || c == '_' {
                pending_sep = true;
                continue;
            }
            if !(c.is_ascii_alphanumeric() || c == '.') {
                return Err(IdError::InvalidCharacter(c));
            }
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        }

        if out.is_empty() {
            return Err(IdError::Empty);
        }
        if out.len() > MAX_ID_LEN {
            return Err(IdError::TooLong {
                max: MAX_ID_LEN,
                got: out.len(),
            });
        }
        Ok(out)
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is empty or only whitespace.
    #[error("identifier is empty")]
    Empty,

    /// The input exceeds the maximum identifier length.
    #[error("identifier too long: max {max} characters, got {got}")]
    TooLong {
        /// The maximum number of characters.
        max: usize,
        /// The actual number of characters.
        got: usize,
    },

    /// The input contains a character that is not allowed.
    #[error("invalid character in identifier: {0:?}")]
    InvalidCharacter(char),
}
