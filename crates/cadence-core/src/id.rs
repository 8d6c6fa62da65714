//! Strongly-typed identifiers for participants and studies.
//!
//! A participant is addressed by an opaque *health code* rather than an
//! account identifier, so scheduled activities can be stored without any
//! direct link to identity. Study identifiers are short, human-assigned keys.
//!
//! # Example
//!
//! ```rust
//! use cadence_core::id::{HealthCode, StudyId};
//!
//! let participant = HealthCode::new("b6a1c8f0-healthcode").unwrap();
//! let study = StudyId::new("asthma-study").unwrap();
//!
//! // IDs are different types - this won't compile:
//! // let wrong: StudyId = participant;
//! # let _ = (participant, study);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Opaque identifier of a study participant's health data.
///
/// Health codes must be non-blank and contain no whitespace. They are
/// treated as sensitive: log them through [`crate::observability::Redacted`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthCode(String);

impl HealthCode {
    /// Creates a new health code after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the health code is blank or contains whitespace.
    pub fn new(code: impl Into<String>) -> Result<Self> {
        let code = code.into();
        validate_token("health code", &code)?;
        Ok(Self(code))
    }

    /// Returns the health code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HealthCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for HealthCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for HealthCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Identifier of a study.
///
/// Study identifiers must be:
/// - Non-empty
/// - Lowercase alphanumeric with hyphens
/// - At most 63 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudyId(String);

impl StudyId {
    /// Creates a new study ID after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the study ID is invalid.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Returns the study ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidId {
                message: "study ID cannot be empty".to_string(),
            });
        }

        if id.len() > 63 {
            return Err(Error::InvalidId {
                message: format!("study ID '{id}' is too long (maximum 63 characters)"),
            });
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(Error::InvalidId {
                message: format!(
                    "study ID '{id}' contains invalid characters (only lowercase letters, digits, and hyphens allowed)"
                ),
            });
        }

        Ok(())
    }
}

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for StudyId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for StudyId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

fn validate_token(kind: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidId {
            message: format!("{kind} cannot be blank"),
        });
    }
    if value.chars().any(char::is_whitespace) {
        return Err(Error::InvalidId {
            message: format!("{kind} '{value}' cannot contain whitespace"),
        });
    }
    Ok(())
}
