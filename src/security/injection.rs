//! Prompt-injection detection
//!
//! Fixed pattern set spanning instruction override, role manipulation,
//! prompt extraction, jailbreak markers, and delimiter injection. Each
//! pattern carries a confidence score; only detections at or above
//! [`HIGH_CONFIDENCE`] can block a request.

use once_cell::sync::Lazy;
use regex::Regex;

/// Detections at or above this confidence are eligible to block
pub const HIGH_CONFIDENCE: f64 = 0.7;

struct InjectionPattern {
    kind: &'static str,
    confidence: f64,
    regex: Regex,
}

/// One pattern hit in the request text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InjectionDetection {
    pub kind: &'static str,
    pub confidence: f64,
}

impl InjectionDetection {
    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= HIGH_CONFIDENCE
    }
}

static PATTERNS: Lazy<Vec<InjectionPattern>> = Lazy::new(|| {
    let table: &[(&str, f64, &str)] = &[
        (
            "instruction_override",
            0.9,
            r"(?i)\b(ignore|disregard|forget)\b[^.\n]{0,40}\b(previous|prior|above|earlier|all)\s+(instructions|prompts|rules|directions)",
        ),
        ("role_manipulation", 0.75, r"(?i)\byou\s+are\s+now\s+(a|an|the)\b"),
        ("role_manipulation", 0.7, r"(?i)\bpretend\s+(to\s+be|you\s+are)\b"),
        (
            "prompt_extraction",
            0.8,
            r"(?i)\b(show|reveal|print|repeat|display|output)\b[^.\n]{0,40}\b(system\s+prompt|initial\s+instructions|your\s+prompt)",
        ),
        ("jailbreak", 0.85, r"(?i)\bdo\s+anything\s+now\b"),
        ("jailbreak", 0.8, r"(?i)\bdeveloper\s+mode\s+enabled\b"),
        ("delimiter_injection", 0.7, r"(?i)```\s*(system|assistant|user)\b"),
        (
            "delimiter_injection",
            0.75,
            r"(?i)<\|\s*(system|assistant|user|im_start|im_end)\s*\|>",
        ),
    ];
    table
        .iter()
        .map(|(kind, confidence, pattern)| InjectionPattern {
            kind,
            confidence: *confidence,
            // The pattern table is static and known-valid.
            regex: Regex::new(pattern).unwrap(),
        })
        .collect()
});

/// Run every pattern against the text
pub fn detect(text: &str) -> Vec<InjectionDetection> {
    PATTERNS
        .iter()
        .filter(|p| p.regex.is_match(text))
        .map(|p| InjectionDetection {
            kind: p.kind,
            confidence: p.confidence,
        })
        .collect()
}
