//! Phone-shape validation for free-text phone numbers.

use regex::Regex;

use crate::error::{BotError, ConfigError};

/// Patterns accepted when no `PHONE_PATTERNS` override is configured.
pub const DEFAULT_PHONE_PATTERNS: &[&str] = &[
    r"^\+?[78][\s\-]?\(?\d{3}\)?[\s\-]?\d{3}[\s\-]?\d{2}[\s\-]?\d{2}$",
    r"^\+\d{10,15}$",
];

/// A free-text phone is valid when it matches any configured pattern.
#[derive(Debug, Clone)]
pub struct PhoneValidator {
    patterns: Vec<Regex>,
}

impl PhoneValidator {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| ConfigError::InvalidValue {
                    key: "PHONE_PATTERNS".into(),
                    message: format!("{}: {e}", p.as_ref()),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if patterns.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "PHONE_PATTERNS".into(),
                message: "at least one pattern is required".into(),
            });
        }

        Ok(Self { patterns })
    }

    /// Validate a submitted phone, returning it trimmed.
    pub fn check(&self, input: &str) -> Result<String, BotError> {
        let candidate = input.trim();
        if self.patterns.iter().any(|re| re.is_match(candidate)) {
            Ok(candidate.to_string())
        } else {
            Err(BotError::ValidationFailed {
                reason: format!("{candidate:?} does not look like a phone number"),
            })
        }
    }
}

impl Default for PhoneValidator {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PHONE_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }
}
