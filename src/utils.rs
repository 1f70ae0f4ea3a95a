//! Text normalization and sentence splitting for plain-text corpora.

use crate::types::{Paragraph, TextUnit};

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_inline_whitespace<T: AsRef<str>>(text: T) -> String {
    let mut normalized = String::new();
    let mut seen_space = false;
    for ch in text.as_ref().chars() {
        if ch.is_whitespace() {
            if !seen_space {
                normalized.push(' ');
                seen_space = true;
            }
        } else {
            normalized.push(ch);
            seen_space = false;
        }
    }
    normalized.trim().to_string()
}

/// Split a document into paragraphs at blank (or whitespace-only) lines; each paragraph is the
/// ordered list of its sentences. Blocks without text are skipped.
pub fn paragraphs(text: &str) -> Vec<Paragraph> {
    let mut out = Vec::new();
    let mut block = String::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            flush_block(&mut block, &mut out);
        } else {
            block.push_str(line);
            block.push('\n');
        }
    }
    flush_block(&mut block, &mut out);
    out
}

fn flush_block(block: &mut String, out: &mut Vec<Paragraph>) {
    let units = sentence_units(block);
    if !units.is_empty() {
        out.push(units);
    }
    block.clear();
}

/// Split one block into sentence units after whitespace normalization.
pub fn sentence_units(block: &str) -> Vec<TextUnit> {
    let normalized = normalize_inline_whitespace(block);
    let mut units = Vec::new();
    if normalized.is_empty() {
        return units;
    }
    let chars: Vec<char> = normalized.chars().collect();
    let mut buffer = String::new();
    for (idx, ch) in chars.iter().enumerate() {
        buffer.push(*ch);
        if is_sentence_boundary(&chars, idx) {
            push_trimmed(&mut buffer, &mut units);
        }
    }
    push_trimmed(&mut buffer, &mut units);
    units
}

fn push_trimmed(buffer: &mut String, units: &mut Vec<TextUnit>) {
    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        units.push(trimmed.to_string());
    }
    buffer.clear();
}

fn is_sentence_boundary(chars: &[char], idx: usize) -> bool {
    match chars[idx] {
        '.' => is_dot_boundary(chars, idx),
        '!' | '?' | '。' | '！' | '？' => true,
        _ => false,
    }
}

fn is_dot_boundary(chars: &[char], idx: usize) -> bool {
    if is_decimal_middle(chars, idx) || is_ticker_middle(chars, idx) {
        return false;
    }
    // Ellipses end on their last dot.
    !(idx + 1 < chars.len() && chars[idx + 1] == '.')
}

fn is_decimal_middle(chars: &[char], idx: usize) -> bool {
    idx > 0
        && idx + 1 < chars.len()
        && chars[idx - 1].is_ascii_digit()
        && chars[idx + 1].is_ascii_digit()
}

fn is_ticker_middle(chars: &[char], idx: usize) -> bool {
    let is_ticker_char = |ch: char| ch.is_ascii_uppercase() || ch.is_ascii_digit();
    idx > 0
        && idx + 1 < chars.len()
        && is_ticker_char(chars[idx - 1])
        && is_ticker_char(chars[idx + 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_inline_whitespace_collapses_runs() {
        assert_eq!(
            normalize_inline_whitespace("Alpha\n\n  Beta\tGamma "),
            "Alpha Beta Gamma"
        );
    }

    #[test]
    fn sentence_units_keep_decimals_and_tickers_together() {
        assert_eq!(
            sentence_units("Price closed at 3.14. BRK.B rallied!"),
            vec!["Price closed at 3.14.", "BRK.B rallied!"]
        );
        assert_eq!(sentence_units("Wait... what?"), vec!["Wait...", "what?"]);
    }

    #[test]
    fn sentence_units_split_on_cjk_terminators() {
        assert_eq!(
            sentence_units("今天天气很好。我们去公园吧！"),
            vec!["今天天气很好。", "我们去公园吧！"]
        );
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let text = "First line\nstill first. Second sentence.\r\n\r\n   \n\nNext block";
        assert_eq!(
            paragraphs(text),
            vec![
                vec![
                    "First line still first.".to_string(),
                    "Second sentence.".to_string()
                ],
                vec!["Next block".to_string()],
            ]
        );
    }

    #[test]
    fn whitespace_only_lines_break_paragraphs() {
        assert_eq!(
            paragraphs("a\n \nb\n\t\r\nc"),
            vec![
                vec!["a".to_string()],
                vec!["b".to_string()],
                vec!["c".to_string()]
            ]
        );
    }
}
