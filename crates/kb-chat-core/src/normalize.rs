//! Text canonicalization for retrieval comparisons.
//!
//! # Algorithm
//!
//! 1. Lower-case the input.
//! 2. Apply canonical decomposition (NFD) so accented letters split into a
//!    base letter followed by combining marks.
//! 3. Drop the combining marks.
//! 4. Replace every character that is not a Unicode letter or digit with a
//!    space.
//! 5. Collapse whitespace runs to a single space and trim both ends.
//!
//! ```rust
//! use kb_chat_core::normalize::normalize;
//!
//! assert_eq!(normalize("Café  Über!"), "cafe uber");
//! ```

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonicalize `text` for case-, accent-, and punctuation-insensitive
/// comparison. Total and idempotent; the empty string maps to itself.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
