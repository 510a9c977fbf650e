use once_cell::sync::Lazy;
use regex::Regex;

static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([?.!,])").expect("valid punctuation pattern"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{2,}").expect("valid whitespace pattern"));

const ZERO_WIDTH_SPACE: char = '\u{200B}';

/// Normalize message text: drop whitespace before `. , ! ?`, collapse runs of
/// two or more whitespace characters into one space, trim both ends.
pub fn clean(text: &str) -> String {
    let text = SPACE_BEFORE_PUNCT.replace_all(text, "$1");
    let text = WHITESPACE_RUN.replace_all(&text, " ");
    text.trim().to_string()
}

/// True when nothing but whitespace and zero-width spaces remain.
pub fn is_blank(text: &str) -> bool {
    text.chars()
        .filter(|c| *c != ZERO_WIDTH_SPACE)
        .collect::<String>()
        .trim()
        .is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_space_before_punctuation() {
        assert_eq!(clean("a  b ,c"), "a b,c");
        assert_eq!(clean("hello !"), "hello!");
        assert_eq!(clean("why ?"), "why?");
        assert_eq!(clean("done\t."), "done.");
    }

    #[test]
    fn collapses_and_trims() {
        assert_eq!(clean("  lots   of \n\n space  "), "lots of space");
        assert_eq!(clean("single\nnewline"), "single\nnewline");
        assert_eq!(clean(""), "");
    }

    #[test]
    fn clean_is_idempotent() {
        let samples = [
            "a  b ,c",
            " x , y  .  z ! ",
            "tab\t\t, then .",
            "\u{200B} hidden \u{200B} ,",
            "plain",
        ];
        for sample in samples {
            let once = clean(sample);
            assert_eq!(clean(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn blank_detection_ignores_zero_width_space() {
        assert!(is_blank(""));
        assert!(is_blank("   \n"));
        assert!(is_blank("\u{200B}"));
        assert!(is_blank(" \u{200B}\u{200B} "));
        assert!(!is_blank("\u{200B}a"));
        assert!(!is_blank("."));
    }
}
