//! Address normalization and validity rules

use once_cell::sync::Lazy;
use regex::Regex;

static ADDRESS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid regex"));

/// Trim and lowercase an address; the result is the identity of a recipient
#[must_use]
pub fn normalize_address(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Decides whether an address is worth a delivery attempt
///
/// An address passes when it matches `local@domain.tld` and contains none of
/// the blocked substrings (role or placeholder addresses such as `noreply`).
#[derive(Debug, Clone)]
pub struct AddressValidator {
    blocked: Vec<String>,
}

impl Default for AddressValidator {
    fn default() -> Self {
        Self::new(["noreply", "no-reply", "test", "example"])
    }
}

impl AddressValidator {
    /// Validator rejecting the given substrings (matched case-insensitively)
    pub fn new<I, S>(blocked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            blocked: blocked
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Validator that only checks syntax
    #[must_use]
    pub const fn syntax_only() -> Self {
        Self {
            blocked: Vec::new(),
        }
    }

    /// `true` only for a syntactically valid address with no blocked substring
    #[must_use]
    pub fn is_valid(&self, address: &str) -> bool {
        let address = normalize_address(address);
        ADDRESS_PATTERN.is_match(&address) && !self.blocked.iter().any(|b| address.contains(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_trims_and_lowercases() {
        assert_eq!(normalize_address("  Ana.Souza@Mail.COM \n"), "ana.souza@mail.com");
    }

    #[test]
    fn test_accepts_plain_addresses() {
        let validator = AddressValidator::default();
        assert!(validator.is_valid("ana@mail.com"));
        assert!(validator.is_valid("first.last+tag@sub.domain.org"));
        assert!(validator.is_valid("  CAPS@Mail.Com "));
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        let validator = AddressValidator::default();
        assert!(!validator.is_valid(""));
        assert!(!validator.is_valid("ana"));
        assert!(!validator.is_valid("ana@mail"));
        assert!(!validator.is_valid("ana mail@x.com"));
        assert!(!validator.is_valid("@x.com"));
        assert!(!validator.is_valid("a@@x.com"));
    }

    #[test]
    fn test_rejects_blocked_substrings() {
        let validator = AddressValidator::default();
        assert!(!validator.is_valid("noreply@shop.com"));
        assert!(!validator.is_valid("no-reply@shop.com"));
        assert!(!validator.is_valid("qa-test@shop.com"));
        assert!(!validator.is_valid("ana@example.org"));
    }

    #[test]
    fn test_syntax_only_ignores_blocklist() {
        let validator = AddressValidator::syntax_only();
        assert!(validator.is_valid("ana@example.org"));
        assert!(!validator.is_valid("not-an-address"));
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in "[ \\ta-zA-Z0-9@._+-]{0,40}") {
            let once = normalize_address(&raw);
            prop_assert_eq!(normalize_address(&once), once);
        }

        #[test]
        fn whitespace_never_passes(local in "[a-z]{1,8}", domain in "[a-z]{1,8}") {
            let validator = AddressValidator::syntax_only();
            let address = format!("{local} x@{domain}.com");
            prop_assert!(!validator.is_valid(&address));
        }
    }
}
