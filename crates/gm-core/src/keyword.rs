use regex::Regex;

/// Build a whole-word, case-insensitive, multi-line matcher for `word`.
///
/// `"gm"` matches `"GM!"` and `"good gm morning"` but not `"programmer"`.
/// Word boundaries are ASCII-only, so a keyword directly followed by a
/// non-ASCII letter (`"GMおはよう"`) still counts as a whole word.
pub fn whole_word(word: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?mi)(?-u:\b){}(?-u:\b)",
        regex::escape(word.trim())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_word_matching() {
        let gm = whole_word("gm").unwrap();
        assert!(gm.is_match("gm"));
        assert!(gm.is_match("GM!"));
        assert!(gm.is_match("good gm morning"));
        assert!(gm.is_match("first line\nGm\nlast line"));
        assert!(!gm.is_match("programmer"));
        assert!(!gm.is_match("gmgm"));
        assert!(!gm.is_match(""));
    }

    #[test]
    fn test_boundaries_are_ascii_only() {
        let gm = whole_word("gm").unwrap();
        assert!(gm.is_match("GMおはよう"));
        assert!(gm.is_match("おはようgm"));
        assert!(gm.is_match("gmé"));
        assert!(!gm.is_match("programmer"));
        assert!(!gm.is_match("gm2"));
    }

    #[test]
    fn test_keyword_is_escaped() {
        let dotted = whole_word("a.b").unwrap();
        assert!(dotted.is_match("see a.b here"));
        assert!(!dotted.is_match("see axb here"));
    }
}
