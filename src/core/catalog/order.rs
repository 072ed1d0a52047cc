//! Natural ("numeric collation") ordering of entry names
//!
//! Names are split into runs of ASCII digits and runs of everything else.
//! Digit runs compare by numeric value, other runs compare case-insensitively,
//! and a digit run sorts before a text run. Names that compare equal under
//! those rules are ordered by their raw bytes, so the order is total and two
//! names are `Equal` only when they are identical.

use std::cmp::Ordering;

/// Compare two names in natural-sort order ("a2" < "a11")
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Runs::new(a);
    let mut right = Runs::new(b);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_runs(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_runs(a: &str, b: &str) -> Ordering {
    match (is_digit_run(a), is_digit_run(b)) {
        (true, true) => {
            let a = a.trim_start_matches('0');
            let b = b.trim_start_matches('0');
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(b.chars().flat_map(char::to_lowercase)),
    }
}

fn is_digit_run(run: &str) -> bool {
    run.as_bytes().first().is_some_and(u8::is_ascii_digit)
}

/// Iterator over alternating digit / non-digit runs
struct Runs<'a> {
    rest: &'a str,
}

impl<'a> Runs<'a> {
    fn new(s: &'a str) -> Self {
        Runs { rest: s }
    }
}

impl<'a> Iterator for Runs<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.rest.as_bytes().first()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .bytes()
            .position(|b| b.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        // Digit boundaries are ASCII, so `end` is always a char boundary.
        let (run, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sorted(names: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        v.sort_by(|a, b| natural_cmp(a, b));
        v
    }

    #[test]
    fn test_numeric_runs() {
        assert_eq!(natural_cmp("a2", "a11"), Ordering::Less);
        assert_eq!(natural_cmp("a11", "a2"), Ordering::Greater);
        assert_eq!(sorted(&["img2", "img11", "img1"]), vec!["img1", "img2", "img11"]);
    }

    #[test]
    fn test_leading_zeros() {
        assert_eq!(natural_cmp("f007", "f7"), "f007".cmp("f7"));
        assert_eq!(natural_cmp("f007", "f8"), Ordering::Less);
        assert_ne!(natural_cmp("f007", "f7"), Ordering::Equal);
    }

    #[test]
    fn test_case_insensitive_with_tiebreak() {
        assert_eq!(natural_cmp("apple", "Banana"), Ordering::Less);
        assert_eq!(natural_cmp("B", "a"), Ordering::Greater);
        assert_ne!(natural_cmp("Readme", "README"), Ordering::Equal);
    }

    #[test]
    fn test_prefix_and_mixed() {
        assert_eq!(natural_cmp("a", "a1"), Ordering::Less);
        assert_eq!(natural_cmp("1a", "a1"), Ordering::Less);
        assert_eq!(
            sorted(&["x10y2", "x10y10", "x9y99", "x10"]),
            vec!["x9y99", "x10", "x10y2", "x10y10"]
        );
    }

    #[test]
    fn test_non_ascii_names() {
        assert_eq!(natural_cmp("é2", "é10"), Ordering::Less);
        assert_eq!(natural_cmp("Ärger", "ärger"), "Ärger".cmp("ärger"));
    }

    proptest! {
        #[test]
        fn prop_equal_only_when_identical(a in "[a-cA-C0-9]{0,6}", b in "[a-cA-C0-9]{0,6}") {
            prop_assert_eq!(natural_cmp(&a, &b) == Ordering::Equal, a == b);
        }

        #[test]
        fn prop_antisymmetric(a in "[a-cA-C0-9]{0,6}", b in "[a-cA-C0-9]{0,6}") {
            prop_assert_eq!(natural_cmp(&a, &b), natural_cmp(&b, &a).reverse());
        }

        #[test]
        fn prop_transitive(
            a in "[a-b0-9]{0,4}",
            b in "[a-b0-9]{0,4}",
            c in "[a-b0-9]{0,4}",
        ) {
            if natural_cmp(&a, &b) != Ordering::Greater && natural_cmp(&b, &c) != Ordering::Greater {
                prop_assert_ne!(natural_cmp(&a, &c), Ordering::Greater);
            }
        }
    }
}
