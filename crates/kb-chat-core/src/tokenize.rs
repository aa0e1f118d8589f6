//! Term extraction on top of [`normalize`](crate::normalize::normalize).

use crate::normalize::normalize;

/// Terms of this many characters or fewer are discarded as noise.
pub const MIN_TOKEN_CHARS: usize = 3;

/// Split `text` into comparable terms.
///
/// The text is normalized, split on single spaces, and terms shorter than
/// [`MIN_TOKEN_CHARS`] characters are dropped. Order and duplicates are
/// preserved.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_terms_dropped() {
        assert_eq!(tokenize("Hi to you"), vec!["you"]);
    }

    #[test]
    fn test_all_short_yields_empty() {
        assert!(tokenize("hi ok no").is_empty());
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_order_and_duplicates_preserved() {
        assert_eq!(
            tokenize("Rust, rust and RUST tools"),
            vec!["rust", "rust", "and", "rust", "tools"]
        );
    }

    #[test]
    fn test_length_counts_characters() {
        // "été" is three characters once accents are stripped
        assert_eq!(tokenize("été"), vec!["ete"]);
        assert_eq!(tokenize("ça"), Vec::<String>::new());
    }
}
