// Text helpers for prompts and extracted pages

/// Cuts `text` to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Splits at `max_chars` characters into (head, rest).
pub fn split_at_chars(text: &str, max_chars: usize) -> (&str, &str) {
    let head = truncate_chars(text, max_chars);
    (head, &text[head.len()..])
}

pub fn compact_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_split_at_chars() {
        assert_eq!(split_at_chars("abcdef", 4), ("abcd", "ef"));
        assert_eq!(split_at_chars("ab", 4), ("ab", ""));
    }

    #[test]
    fn test_compact_ws() {
        assert_eq!(compact_ws("  a \n\t b  c "), "a b c");
    }
}
