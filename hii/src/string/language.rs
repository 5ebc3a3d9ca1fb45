//! RFC 4646 language tag helpers

use alloc::string::String;
use alloc::vec::Vec;

/// Compare the primary language of `left` against the whole of `right`
///
/// `left` may carry secondary languages after a `;`; only the part before
/// the first `;` is compared. The comparison is ASCII case-insensitive and
/// succeeds only when both parts have the same length.
pub fn compare_language(left: &str, right: &str) -> bool {
    let primary = primary_language(left);
    primary.len() == right.len() && primary.eq_ignore_ascii_case(right)
}

/// Part of a language string before the first `;`
pub fn primary_language(language: &str) -> &str {
    match language.find(';') {
        Some(end) => &language[..end],
        None => language,
    }
}

/// Part of a language string after the first `;`, if any
pub fn secondary_languages(language: &str) -> Option<&str> {
    language.find(';').map(|start| &language[start + 1..])
}

/// Join languages with `;`
pub fn join_languages<'a, I: IntoIterator<Item = &'a str>>(languages: I) -> String {
    let parts: Vec<&str> = languages.into_iter().collect();
    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_is_case_insensitive() {
        assert!(compare_language("en-US", "EN-us"));
        assert!(!compare_language("en-US", "en"));
        assert!(!compare_language("en", "en-US"));
    }

    #[test]
    fn test_compare_uses_primary_only() {
        assert!(compare_language("en-US;fr-FR", "en-US"));
        assert!(!compare_language("en-US;fr-FR", "fr-FR"));
    }

    #[test]
    fn test_secondary_languages() {
        assert_eq!(secondary_languages("en-US;fr-FR;de-DE"), Some("fr-FR;de-DE"));
        assert_eq!(secondary_languages("en-US"), None);
        assert_eq!(join_languages(["a", "b"]), "a;b");
    }
}
