use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static NON_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").expect("static regex"));

/// Returns a lowercase representation, reusing the original string if already lowercase.
pub fn lowercase(input: &str) -> Cow<'_, str> {
    if input.chars().all(|ch| !ch.is_uppercase()) {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(input.to_lowercase())
    }
}

/// Returns an uppercase representation, avoiding allocation when unnecessary.
pub fn uppercase(input: &str) -> Cow<'_, str> {
    if input.chars().all(|ch| !ch.is_lowercase()) {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(input.to_uppercase())
    }
}

/// Capitalises the first letter of every run of letters and lowercases the rest, so
/// `"o'BRIEN-smith"` becomes `"O'Brien-Smith"`.
pub fn proper_case(input: &str) -> Cow<'_, str> {
    let mut output = String::with_capacity(input.len());
    let mut inside_word = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if inside_word {
                output.extend(ch.to_lowercase());
            } else {
                output.extend(ch.to_uppercase());
            }
            inside_word = true;
        } else {
            output.push(ch);
            inside_word = false;
        }
    }
    if output == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(output)
    }
}

/// Strips every non-digit character.
pub fn digits_only(input: &str) -> Cow<'_, str> {
    NON_DIGIT.replace_all(input, "")
}

/// Returns at most the first `count` characters, staying on UTF-8 boundaries.
pub fn leading_chars(value: &str, count: usize) -> &str {
    match value.char_indices().nth(count) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proper_case_matches_title_semantics() {
        assert_eq!(proper_case("hello world"), "Hello World");
        assert_eq!(proper_case("o'BRIEN-smith"), "O'Brien-Smith");
        assert_eq!(proper_case("route66abc"), "Route66Abc");
    }

    #[test]
    fn proper_case_borrows_when_unchanged() {
        assert!(matches!(proper_case("Already Proper"), Cow::Borrowed(_)));
    }

    #[test]
    fn digits_only_strips_formatting() {
        assert_eq!(digits_only("+44 (20) 7946-0958"), "442079460958");
        assert!(matches!(digits_only("12345"), Cow::Borrowed(_)));
    }

    #[test]
    fn leading_chars_is_utf8_safe() {
        assert_eq!(leading_chars("éxample", 3), "éxa");
        assert_eq!(leading_chars("ab", 3), "ab");
    }
}
