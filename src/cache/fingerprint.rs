//! Prompt fingerprints used as generation cache keys.

use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of a normalized prompt.
///
/// Identical prompts (after normalization) always produce the same
/// fingerprint. Collisions only cost cache correctness, never safety.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    pub fn of(prompt: &str) -> Self {
        let normalized = normalize_prompt(prompt);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim, lowercase, and collapse internal whitespace runs to one space.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        let a = RequestFingerprint::of("draw a login flow");
        let b = RequestFingerprint::of("draw a login flow");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_case_and_spacing() {
        let a = RequestFingerprint::of("Draw a   login\nflow ");
        let b = RequestFingerprint::of("draw a login flow");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_prompts_differ() {
        let a = RequestFingerprint::of("draw a login flow");
        let b = RequestFingerprint::of("draw a signup flow");
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_prefix() {
        let fp = RequestFingerprint::of("x");
        assert_eq!(fp.short().len(), 12);
        assert!(fp.as_str().starts_with(fp.short()));
    }
}
