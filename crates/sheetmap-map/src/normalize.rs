//! Header text canonicalization.

use serde::{Deserialize, Serialize};

/// Characters that separate words and become a single space.
pub const DEFAULT_SEPARATORS: &str = "_-./\\";
/// Punctuation removed outright.
pub const DEFAULT_STRIPPED: &str = "!\"#$%&'()*+,:;<=>?@[]^`{|}~";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub separators: String,
    pub stripped: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            separators: DEFAULT_SEPARATORS.to_string(),
            stripped: DEFAULT_STRIPPED.to_string(),
        }
    }
}

/// Canonicalizes header text into the comparison key used for matching.
///
/// Lowercases, turns separators into spaces, drops stripped punctuation,
/// trims and collapses whitespace. Camel-case boundaries are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn normalize(&self, text: &str) -> String {
        let mapped: String = text
            .chars()
            .flat_map(char::to_lowercase)
            .filter_map(|ch| {
                if self.config.separators.contains(ch) {
                    Some(' ')
                } else if self.config.stripped.contains(ch) {
                    None
                } else {
                    Some(ch)
                }
            })
            .collect();
        mapped.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Normalize with the default configuration.
pub fn normalize_header(text: &str) -> String {
    Normalizer::default().normalize(text)
}

/// True when `needle` appears in `haystack` on word boundaries.
///
/// Both sides are expected to be normalized already.
pub fn contains_words(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() || haystack.is_empty() {
        return false;
    }
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Customer   E-Mail "), "customer e mail");
        assert_eq!(normalize_header("Acct #"), "acct");
        assert_eq!(normalize_header("first_name"), "first name");
        assert_eq!(normalize_header("Open.Date/Time"), "open date time");
        assert_eq!(normalize_header("Balance ($)"), "balance");
    }

    #[test]
    fn camel_case_is_not_split() {
        assert_eq!(normalize_header("FirstName"), "firstname");
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_header("  Cust__Email (Primary) ");
        assert_eq!(normalize_header(&once), once);
    }

    #[test]
    fn custom_config_keeps_hash() {
        let normalizer = Normalizer::new(NormalizerConfig {
            stripped: "()".to_string(),
            ..NormalizerConfig::default()
        });
        assert_eq!(normalizer.normalize("Acct #"), "acct #");
    }

    #[test]
    fn word_bounded_containment() {
        assert!(contains_words("customer email address", "email"));
        assert!(contains_words("email", "email"));
        assert!(!contains_words("emails", "email"));
        assert!(!contains_words("balance", ""));
    }
}
