use regex::Regex;
use sha2::{Digest, Sha256};

use weave_types::ParsedError;

/// Stable identity for a repairable error list: numeric literals stripped so
/// shifting line numbers do not read as progress, then sorted and hashed.
pub fn fingerprint_errors(errors: &[ParsedError]) -> String {
    let digits = Regex::new(r"\d+").expect("digit regex");
    let mut normalized: Vec<String> = errors
        .iter()
        .map(|error| {
            let message = digits.replace_all(&error.message, "#");
            format!("{:?}|{}", error.category, message.trim())
        })
        .collect();
    normalized.sort();

    let mut hasher = Sha256::new();
    for entry in &normalized {
        hasher.update(entry.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Tracks how many consecutive validation passes produced the same
/// fingerprint; the count drives strategy-profile escalation.
#[derive(Debug, Default, Clone)]
pub struct FingerprintTracker {
    last: Option<String>,
    repeats: u32,
}

impl FingerprintTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, fingerprint: &str) -> u32 {
        if self.last.as_deref() == Some(fingerprint) {
            self.repeats += 1;
        } else {
            self.last = Some(fingerprint.to_string());
            self.repeats = 1;
        }
        self.repeats
    }

    pub fn repeats(&self) -> u32 {
        self.repeats
    }
}
