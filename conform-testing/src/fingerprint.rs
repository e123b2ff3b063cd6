//! Short content digests used as display ids
//!
//! A fingerprint labels a report line. It is never used to decide identity
//! or uniqueness; two fixtures may share a short prefix.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hex characters shown in reports.
    pub const SHORT_LEN: usize = 4;

    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let result = hasher.finalize();
        Fingerprint(format!("{:x}", result))
    }

    pub fn short(&self) -> &str {
        &self.0[..Self::SHORT_LEN]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_is_prefix() {
        let fp = Fingerprint::of("1 + 2");
        assert_eq!(fp.short().len(), Fingerprint::SHORT_LEN);
        assert!(fp.as_str().starts_with(fp.short()));
        assert_eq!(fp.to_string(), fp.short());
    }

    #[test]
    fn test_known_digest() {
        // sha256("") = e3b0c442...
        assert_eq!(Fingerprint::of("").short(), "e3b0");
    }

    #[test]
    fn test_stable_across_calls() {
        assert_eq!(Fingerprint::of("let x = 1"), Fingerprint::of("let x = 1"));
        assert_ne!(Fingerprint::of("let x = 1"), Fingerprint::of("let x = 2"));
    }
}
