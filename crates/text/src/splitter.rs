//! Splitting strategies
//!
//! Three strategies with one contract: ordered, trimmed, non-empty
//! sentences.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// How text is divided into sentences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// One sentence per line.
    Newline,
    /// Terminator scan handling CJK and Latin punctuation, aware of quote
    /// and bracket nesting.
    #[default]
    Punctuation,
    /// UAX#29 sentence boundaries.
    Unicode,
}

/// Sentence terminators recognized by the punctuation strategy.
const TERMINATORS: &[char] = &['。', '！', '？', '.', '!', '?', '；', ';'];

/// Closing marks that stay attached to the sentence they end.
const TRAILERS: &[char] = &['”', '’', '」', '』', '"', '\'', ')', '）', ']', '】'];

/// Opening marks that suppress splitting until their pair closes.
const OPENERS: &[char] = &['“', '‘', '「', '『', '(', '（', '[', '【'];
const CLOSERS: &[char] = &['”', '’', '」', '』', ')', '）', ']', '】'];

/// Split `text` into trimmed, non-empty sentences.
pub fn split_sentences(text: &str, strategy: SplitStrategy) -> Vec<String> {
    match strategy {
        SplitStrategy::Newline => split_newline(text),
        SplitStrategy::Punctuation => split_punctuation(text),
        SplitStrategy::Unicode => split_unicode(text),
    }
}

fn split_newline(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

fn split_unicode(text: &str) -> Vec<String> {
    text.unicode_sentences()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn split_punctuation(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        current.push(c);

        if OPENERS.contains(&c) {
            depth += 1;
        } else if CLOSERS.contains(&c) {
            depth = depth.saturating_sub(1);
        } else if TERMINATORS.contains(&c) && depth == 0 && !is_inner_dot(&chars, i) {
            // Closing quotes and brackets belong to the finished sentence.
            while i + 1 < chars.len() && TRAILERS.contains(&chars[i + 1]) {
                i += 1;
                current.push(chars[i]);
            }
            push_trimmed(&mut sentences, &mut current);
        }

        i += 1;
    }

    // Unterminated tail becomes the final sentence.
    push_trimmed(&mut sentences, &mut current);
    sentences
}

/// A `.` between ASCII digits is a decimal point, not a terminator.
fn is_inner_dot(chars: &[char], i: usize) -> bool {
    chars[i] == '.'
        && i > 0
        && chars[i - 1].is_ascii_digit()
        && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
}

fn push_trimmed(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_owned());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        for strategy in [
            SplitStrategy::Newline,
            SplitStrategy::Punctuation,
            SplitStrategy::Unicode,
        ] {
            assert!(split_sentences("", strategy).is_empty());
            assert!(split_sentences("   \n\t ", strategy).is_empty());
        }
    }

    #[test]
    fn test_newline_strategy() {
        let got = split_sentences("first line\n\n  second line \nthird", SplitStrategy::Newline);
        assert_eq!(got, vec!["first line", "second line", "third"]);
    }

    #[test]
    fn test_latin_terminators() {
        let got = split_sentences("Hello. World! Done?", SplitStrategy::Punctuation);
        assert_eq!(got, vec!["Hello.", "World!", "Done?"]);
    }

    #[test]
    fn test_cjk_terminators() {
        let got = split_sentences("你好。天气不错！走吗？", SplitStrategy::Punctuation);
        assert_eq!(got, vec!["你好。", "天气不错！", "走吗？"]);
    }

    #[test]
    fn test_decimal_point_not_a_boundary() {
        let got = split_sentences("Pi is 3.14 exactly. Yes.", SplitStrategy::Punctuation);
        assert_eq!(got, vec!["Pi is 3.14 exactly.", "Yes."]);
    }

    #[test]
    fn test_nested_terminator_does_not_split() {
        let got = split_sentences("他说“走吧。”然后离开了。", SplitStrategy::Punctuation);
        assert_eq!(got, vec!["他说“走吧。”然后离开了。"]);
    }

    #[test]
    fn test_trailing_quote_attaches() {
        let got = split_sentences("He said \"stop.\" Then left.", SplitStrategy::Punctuation);
        assert_eq!(got, vec!["He said \"stop.\"", "Then left."]);
    }

    #[test]
    fn test_unterminated_tail() {
        let got = split_sentences("Complete. trailing fragment", SplitStrategy::Punctuation);
        assert_eq!(got, vec!["Complete.", "trailing fragment"]);
    }

    #[test]
    fn test_deterministic() {
        let input = "A. B! C? 中文。";
        let a = split_sentences(input, SplitStrategy::Punctuation);
        let b = split_sentences(input, SplitStrategy::Punctuation);
        assert_eq!(a, b);
    }

    #[test]
    fn test_unicode_strategy_basic() {
        let got = split_sentences("One sentence. Another one.", SplitStrategy::Unicode);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], "One sentence.");
    }
}
