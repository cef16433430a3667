//! Request parameter scanner.
//!
//! Flags parameters carrying cross-site-scripting markers or SQL keywords.
//! Scanning is a pure function of its input: the "found" state lives in the
//! iterator of one call, so concurrent requests share nothing but the
//! compiled patterns.

use regex::Regex;

const XSS_PATTERN: &str = r"(?i)<script.*?>|</script>|alert\(|onerror=";
const SQL_PATTERN: &str = r"(?i)\b(union|select|drop|delete|insert)\b";

/// Pre-compiled disallowed-pattern set.
#[derive(Debug, Clone)]
pub struct ContentScanner {
    xss: Regex,
    sql: Regex,
}

impl ContentScanner {
    pub fn new() -> Self {
        Self {
            // Both patterns are literals checked by the tests below.
            xss: Regex::new(XSS_PATTERN).expect("xss pattern is valid"),
            sql: Regex::new(SQL_PATTERN).expect("sql pattern is valid"),
        }
    }

    /// Does a single key or value match any disallowed pattern.
    pub fn is_disallowed(&self, text: &str) -> bool {
        self.xss.is_match(text) || self.sql.is_match(text)
    }

    /// True if any key or value matches. Stops at the first match.
    pub fn scan<K, V>(&self, params: &[(K, V)]) -> bool
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        scan_with(params, |text| self.is_disallowed(text))
    }
}

impl Default for ContentScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan parameters with an arbitrary predicate, key before value, in order.
pub fn scan_with<K, V, F>(params: &[(K, V)], mut matches: F) -> bool
where
    K: AsRef<str>,
    V: AsRef<str>,
    F: FnMut(&str) -> bool,
{
    params
        .iter()
        .any(|(key, value)| matches(key.as_ref()) || matches(value.as_ref()))
}
