//! PII detection and masking
//!
//! A labeled regex list, compiled once at construction and shared
//! read-only across concurrent checks. Masking substitutes each match
//! with `[<LABEL>_REDACTED]`; the replacement tokens never re-match any
//! pattern, so masking is idempotent.

use regex::Regex;

use crate::config::{ConfigError, PiiPatternConfig};

/// One labeled detection pattern
pub struct PiiPattern {
    label: String,
    regex: Regex,
}

/// PII detector over concatenated request text
pub struct PiiDetector {
    patterns: Vec<PiiPattern>,
}

impl PiiDetector {
    /// Built-in pattern set: email, national id, credit card, phone
    pub fn with_defaults() -> Self {
        let defaults = [
            ("email", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
            ("national_id", r"\b\d{3}-\d{2}-\d{4}\b"),
            ("credit_card", r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b"),
            (
                "phone",
                r"\b(?:\+?\d{1,2}[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}\b",
            ),
        ];
        Self {
            patterns: defaults
                .iter()
                .map(|(label, pattern)| PiiPattern {
                    label: (*label).to_string(),
                    // Built-in patterns are known-valid.
                    regex: Regex::new(pattern).unwrap(),
                })
                .collect(),
        }
    }

    /// Compile a configured pattern list; falls back to the built-in set
    /// when the list is empty
    pub fn from_config(patterns: &[PiiPatternConfig]) -> Result<Self, ConfigError> {
        if patterns.is_empty() {
            return Ok(Self::with_defaults());
        }
        let mut compiled = Vec::with_capacity(patterns.len());
        for entry in patterns {
            let regex = Regex::new(&entry.pattern).map_err(|source| ConfigError::Pattern {
                label: entry.label.clone(),
                source,
            })?;
            compiled.push(PiiPattern {
                label: entry.label.clone(),
                regex,
            });
        }
        Ok(Self { patterns: compiled })
    }

    /// Labels of every pattern matching the text, in declaration order
    pub fn detect(&self, text: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|p| p.regex.is_match(text))
            .map(|p| p.label.clone())
            .collect()
    }

    /// Replace every match with `[<LABEL>_REDACTED]`; returns the masked
    /// text and the labels that fired
    pub fn mask(&self, text: &str) -> (String, Vec<String>) {
        let mut masked = text.to_string();
        let mut detected = Vec::new();
        for pattern in &self.patterns {
            if pattern.regex.is_match(&masked) {
                let token = format!("[{}_REDACTED]", pattern.label.to_uppercase());
                masked = pattern.regex.replace_all(&masked, token.as_str()).to_string();
                detected.push(pattern.label.clone());
            }
        }
        (masked, detected)
    }
}
