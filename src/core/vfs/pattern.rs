//! Name filters for directory iteration
//!
//! Supports wildcards within a single entry name:
//! - `*` - Matches any run of characters, including none (e.g., `*.png`)
//! - `?` - Matches exactly one character (e.g., `img?.png`)

use std::fmt;

/// Glob matched against bare entry names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    pattern: String,
}

impl NamePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        NamePattern {
            pattern: pattern.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Check if a name matches the pattern
    ///
    /// Matching is case-sensitive, like the rest of the archive namespace.
    ///
    /// # Examples
    /// ```
    /// use dci_rs::vfs::NamePattern;
    ///
    /// assert!(NamePattern::new("*.png").matches("icon.png"));
    /// assert!(NamePattern::new("img?").matches("img1"));
    /// assert!(!NamePattern::new("*.png").matches("icon.PNG"));
    /// ```
    pub fn matches(&self, name: &str) -> bool {
        if !self.pattern.contains(['*', '?']) {
            return self.pattern == name;
        }

        let pattern: Vec<char> = self.pattern.chars().collect();
        let name: Vec<char> = name.chars().collect();
        Self::match_chars(&pattern, &name)
    }

    /// Greedy match with backtracking to the most recent `*`
    fn match_chars(pattern: &[char], name: &[char]) -> bool {
        let mut p = 0;
        let mut n = 0;
        // Pattern index after the last `*`, and the name index it resumed at
        let mut star: Option<(usize, usize)> = None;

        while n < name.len() {
            match pattern.get(p) {
                Some('*') => {
                    star = Some((p + 1, n));
                    p += 1;
                }
                Some('?') => {
                    p += 1;
                    n += 1;
                }
                Some(c) if *c == name[n] => {
                    p += 1;
                    n += 1;
                }
                _ => match star {
                    // Let the last `*` swallow one more character
                    Some((after_star, resumed)) => {
                        p = after_star;
                        n = resumed + 1;
                        star = Some((after_star, resumed + 1));
                    }
                    None => return false,
                },
            }
        }

        pattern[p..].iter().all(|c| *c == '*')
    }

    /// True if `name` matches any of `patterns`; an empty list matches all
    pub fn any_matches(patterns: &[NamePattern], name: &str) -> bool {
        patterns.is_empty() || patterns.iter().any(|p| p.matches(name))
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl From<&str> for NamePattern {
    fn from(pattern: &str) -> Self {
        NamePattern::new(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, name: &str) -> bool {
        NamePattern::new(pattern).matches(name)
    }

    #[test]
    fn test_exact_match() {
        assert!(matches("normal.png", "normal.png"));
        assert!(!matches("normal.png", "hover.png"));
    }

    #[test]
    fn test_star() {
        assert!(matches("*", "anything"));
        assert!(matches("*", ""));
        assert!(matches("*.png", "a.png"));
        assert!(matches("*.png", ".png"));
        assert!(!matches("*.png", "a.png.bak"));
        assert!(matches("img*", "img11"));
        assert!(matches("test-*-data", "test-123-data"));
        assert!(!matches("test-*-data", "test-123-info"));
    }

    #[test]
    fn test_question_mark() {
        assert!(matches("img?", "img1"));
        assert!(!matches("img?", "img11"));
        assert!(!matches("img?", "img"));
        assert!(matches("??.png", "ab.png"));
    }

    #[test]
    fn test_backtracking() {
        assert!(matches("*a*b", "xaybab"));
        assert!(matches("a*a*a", "aaa"));
        assert!(!matches("a*a*a", "aa"));
        assert!(matches("*.*", "a.b.c"));
    }

    #[test]
    fn test_multibyte_names() {
        assert!(matches("图?", "图标"));
        assert!(matches("*标", "图标"));
    }

    #[test]
    fn test_any_matches() {
        let patterns = vec![NamePattern::from("*.png"), NamePattern::from("*.svg")];
        assert!(NamePattern::any_matches(&patterns, "a.svg"));
        assert!(!NamePattern::any_matches(&patterns, "a.txt"));
        assert!(NamePattern::any_matches(&[], "a.txt"));
    }
}
