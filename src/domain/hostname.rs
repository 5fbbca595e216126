// Copyright (c) 2025 - Cowboy AI, Inc.
//! Domain Name Value Object with DNS Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Domain name validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainNameError {
    #[error("Domain name is empty")]
    Empty,

    #[error("Domain name exceeds maximum length of 253 characters: {0}")]
    TooLong(usize),

    #[error("Label exceeds maximum length of 63 characters: {0}")]
    LabelTooLong(String),

    #[error("Invalid character in domain name: {0}")]
    InvalidCharacter(char),

    #[error("Label cannot start or end with hyphen: {0}")]
    InvalidLabelFormat(String),

    #[error("Top-level label cannot be all numeric: {0}")]
    NumericLabel(String),
}

/// DNS domain name value object
///
/// Stored lowercase. Follows RFC 1123:
/// - Total length ≤ 253 characters
/// - Each label ≤ 63 characters, alphanumerics and hyphens only
/// - Labels cannot start or end with hyphens
/// - The top-level label cannot be all numeric
///
/// # Examples
///
/// ```rust
/// use backend_stack::domain::DomainName;
///
/// let domain = DomainName::new("example.com").unwrap();
/// assert_eq!(domain.wildcard(), "*.example.com");
/// assert_eq!(domain.subdomain("api").unwrap().as_str(), "api.example.com");
///
/// assert!(DomainName::new("").is_err());
/// assert!(DomainName::new("-invalid.com").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainName(String);

impl DomainName {
    /// Maximum total length (RFC 1123)
    pub const MAX_LENGTH: usize = 253;

    /// Maximum length for a single label (RFC 1123)
    pub const MAX_LABEL_LENGTH: usize = 63;

    /// Create a new domain name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, DomainNameError> {
        let name = name.into().trim_end_matches('.').to_ascii_lowercase();

        if name.is_empty() {
            return Err(DomainNameError::Empty);
        }

        if name.len() > Self::MAX_LENGTH {
            return Err(DomainNameError::TooLong(name.len()));
        }

        let labels: Vec<&str> = name.split('.').collect();
        for label in &labels {
            Self::validate_label(label)?;
        }

        if let Some(tld) = labels.last() {
            if labels.len() > 1 && tld.chars().all(|c| c.is_ascii_digit()) {
                return Err(DomainNameError::NumericLabel(tld.to_string()));
            }
        }

        Ok(Self(name))
    }

    /// Validate a single DNS label
    pub fn validate_label(label: &str) -> Result<(), DomainNameError> {
        if label.is_empty() {
            return Err(DomainNameError::Empty);
        }

        if label.len() > Self::MAX_LABEL_LENGTH {
            return Err(DomainNameError::LabelTooLong(label.to_string()));
        }

        if let Some(ch) = label
            .chars()
            .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '-')
        {
            return Err(DomainNameError::InvalidCharacter(ch));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(DomainNameError::InvalidLabelFormat(label.to_string()));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `*.{domain}`, the alternative name covering every direct subdomain
    pub fn wildcard(&self) -> String {
        format!("*.{}", self.0)
    }

    /// `{label}.{domain}`
    pub fn subdomain(&self, label: &str) -> Result<Self, DomainNameError> {
        Self::validate_label(label)?;
        Self::new(format!("{}.{}", label, self.0))
    }

    /// Whether `self` equals `zone` or lies beneath it
    pub fn is_within(&self, zone: &DomainName) -> bool {
        self.0 == zone.0 || self.0.ends_with(&format!(".{}", zone.0))
    }

    /// Get labels as a vector
    pub fn labels(&self) -> Vec<&str> {
        self.0.split('.').collect()
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DomainName {
    type Error = DomainNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for DomainName {
    type Error = DomainNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DomainName> for String {
    fn from(value: DomainName) -> Self {
        value.0
    }
}
