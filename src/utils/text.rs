//! Pure text helpers shared by the analyzers.

use uuid::Uuid;

#[must_use]
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Collapse runs of whitespace (including newlines) into single spaces.
#[must_use]
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Short random identifier for findings. Random on purpose: two findings with
/// identical content must still be distinguishable while debugging dedup.
#[must_use]
pub fn finding_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("fnd-{}", &hex[..12])
}

/// Levenshtein edit distance, single-row DP.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0usize; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_ascii_no_truncation() {
        assert_eq!(truncate_with_ellipsis("hello", 10), "hello");
        assert_eq!(truncate_with_ellipsis("hello world", 50), "hello world");
    }

    #[test]
    fn truncate_ascii_with_truncation() {
        assert_eq!(truncate_with_ellipsis("hello world", 5), "hello...");
    }

    #[test]
    fn truncate_at_exact_boundary() {
        assert_eq!(truncate_with_ellipsis("hello", 5), "hello");
    }

    #[test]
    fn truncate_multibyte_safe() {
        let s = "пример кода";
        let result = truncate_with_ellipsis(s, 6);
        assert!(result.ends_with("..."));
        assert!(result.is_char_boundary(result.len() - 3));
    }

    #[test]
    fn collapse_whitespace_flattens_newlines() {
        assert_eq!(collapse_whitespace("a\n  b\t\tc"), "a b c");
        assert_eq!(collapse_whitespace("  leading  "), "leading");
    }

    #[test]
    fn finding_ids_are_unique_and_prefixed() {
        let a = finding_id();
        let b = finding_id();
        assert!(a.starts_with("fnd-"));
        assert_eq!(a.len(), "fnd-".len() + 12);
        assert_ne!(a, b);
    }

    #[test]
    fn levenshtein_empty_and_identity() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("a", "a"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
    }

    #[test]
    fn levenshtein_kitten_sitting() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn levenshtein_symmetric() {
        for (a, b) in [("tokio", "tokioo"), ("serde", "serbe"), ("ab", "ba")] {
            assert_eq!(levenshtein(a, b), levenshtein(b, a));
        }
    }

    #[test]
    fn levenshtein_multibyte() {
        assert_eq!(levenshtein("еval", "eval"), 1);
    }
}
