//! Remote Glucose Sources
//!
//! The poller talks to the upstream glucose API only through the
//! [`GlucoseSource`] trait: log in, report whether a session is live,
//! resolve the account to follow, and fetch raw records for a time range.
//!
//! - [`HttpSource`]: REST implementation (password-grant token, bearer requests)

mod http;

pub use http::{HttpSource, HttpSourceConfig};

use crate::storage::{normalize_timestamp, ParseError, Reading};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Upstream glucose data provider
#[async_trait]
pub trait GlucoseSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Whether a usable session is currently held
    fn is_authenticated(&self) -> bool;

    /// Establish a session
    async fn login(&self) -> Result<(), SourceError>;

    /// Identifier of the account whose readings are fetched, if one is visible
    async fn resolve_account_id(&self) -> Result<Option<String>, SourceError>;

    /// Raw records for `account_id` between `from` and `to`
    async fn fetch_readings(
        &self,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, SourceError>;
}

/// Errors reported by a glucose source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

/// One upstream record before validation
///
/// Both fields are optional: upstream data is not trusted to be complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub timestamp: Option<String>,
    pub value: Option<f64>,
}

impl RawRecord {
    pub fn new(timestamp: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: Some(timestamp.into()),
            value: Some(value),
        }
    }

    /// Validate into a [`Reading`], normalizing the timestamp to UTC
    pub fn parse(&self) -> Result<Reading, ParseError> {
        let timestamp = self
            .timestamp
            .as_deref()
            .filter(|ts| !ts.trim().is_empty())
            .ok_or(ParseError::MissingTimestamp)?;
        let value = self.value.ok_or(ParseError::MissingValue)?;

        Reading::new(normalize_timestamp(timestamp)?, value)
    }
}

/// Outcome of parsing a fetched batch
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub readings: Vec<Reading>,
    pub skipped: usize,
}

/// Parse every record, dropping (and logging) the malformed ones
pub fn parse_records(records: &[RawRecord]) -> ParsedBatch {
    let mut batch = ParsedBatch::default();

    for record in records {
        match record.parse() {
            Ok(reading) => batch.readings.push(reading),
            Err(e) => {
                batch.skipped += 1;
                tracing::warn!(error = %e, ?record, "Dropping malformed record");
            }
        }
    }

    batch
}

/// Account credentials as entered by the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Reasons entered credentials are refused before any login attempt
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CredentialError {
    #[error("username must be an email address")]
    InvalidEmail,

    #[error("password must not be empty")]
    EmptyPassword,
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").expect("valid email regex"))
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Username is email-shaped and the password is non-blank
    pub fn validate(&self) -> Result<(), CredentialError> {
        if !email_pattern().is_match(self.username.trim()) {
            return Err(CredentialError::InvalidEmail);
        }
        if self.password.trim().is_empty() {
            return Err(CredentialError::EmptyPassword);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_valid_record() {
        let reading = RawRecord::new("2025-01-02T03:04:05Z", 6.7).parse().unwrap();

        assert_eq!(
            reading.timestamp(),
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(reading.value(), 6.7);
    }

    #[test]
    fn test_parse_missing_fields() {
        let no_ts = RawRecord {
            timestamp: None,
            value: Some(5.0),
        };
        assert_eq!(no_ts.parse(), Err(ParseError::MissingTimestamp));

        let blank_ts = RawRecord {
            timestamp: Some("  ".into()),
            value: Some(5.0),
        };
        assert_eq!(blank_ts.parse(), Err(ParseError::MissingTimestamp));

        let no_value = RawRecord {
            timestamp: Some("2025-01-02T03:04:05".into()),
            value: None,
        };
        assert_eq!(no_value.parse(), Err(ParseError::MissingValue));
    }

    #[test]
    fn test_parse_batch_skips_bad_records() {
        let records = vec![
            RawRecord::new("2025-01-02T03:00:00Z", 6.0),
            RawRecord::default(),
            RawRecord::new("not a time", 6.0),
            RawRecord::new("2025-01-02T03:05:00Z", 0.0),
            RawRecord::new("2025-01-02T03:10:00", 6.2),
        ];

        let batch = parse_records(&records);
        assert_eq!(batch.readings.len(), 2);
        assert_eq!(batch.skipped, 3);
    }

    #[test]
    fn test_credentials_validation() {
        assert!(Credentials::new("jane@example.com", "secret").validate().is_ok());
        assert!(Credentials::new("  jane@example.com ", "secret").validate().is_ok());

        assert_eq!(
            Credentials::new("jane", "secret").validate(),
            Err(CredentialError::InvalidEmail)
        );
        assert_eq!(
            Credentials::new("jane@example", "secret").validate(),
            Err(CredentialError::InvalidEmail)
        );
        assert_eq!(
            Credentials::new("jane@example.com", "   ").validate(),
            Err(CredentialError::EmptyPassword)
        );
        assert!(Credentials::default().validate().is_err());
    }
}
