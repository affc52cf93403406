//! External injection contract (§6): `{source, content}` where `source`
//! matches `^external:[^\s]+$`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalInjection {
    pub source: String,
    pub content: String,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ExternalSourceError {
    #[error("source must match ^external:[^\\s]+$, got {0:?}")]
    InvalidSource(String),
}

impl ExternalInjection {
    /// The `source` field is expected already bearing the `external:` prefix
    /// (e.g. `external:cron`); `name()` strips it for use as the FSM's
    /// `source` event field.
    pub fn validate(&self) -> Result<&str, ExternalSourceError> {
        validate_external_source(&self.source)
    }
}

pub fn validate_external_source(source: &str) -> Result<&str, ExternalSourceError> {
    match source.strip_prefix("external:") {
        Some(name) if !name.is_empty() && !name.contains(char::is_whitespace) => Ok(name),
        _ => Err(ExternalSourceError::InvalidSource(source.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_external_source() {
        assert_eq!(validate_external_source("external:cron"), Ok("cron"));
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(validate_external_source("cron").is_err());
    }

    #[test]
    fn rejects_whitespace_in_name() {
        assert!(validate_external_source("external:cr on").is_err());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(validate_external_source("external:").is_err());
    }
}
