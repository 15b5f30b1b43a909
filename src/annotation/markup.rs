//! Inline entity markup.
//!
//! Merges a sentence's tokens with its entity spans into annotated-text
//! form, where every entity reads `[surface text](LABEL)`:
//!
//! ```text
//! [Wally](PER) was last seen in the [Bermuda Triangle](LOC).
//! ```

use crate::models::{EntitySpan, Token};

/// Render tokens and entity spans as one markup string.
///
/// Tokens are joined by single spaces, except that punctuation-only tokens
/// attach to the previous token. A token belongs to the first span (in
/// input order) with `start_pos <= token.start_pos < end_pos`. The opening
/// bracket goes before the first covered token of a span, the closing
/// `](LABEL)` after the token that reaches the span's end.
///
/// Never panics on inconsistent offsets. A span left open by an unexpected
/// token, or at the end of input, is closed before moving on, so brackets
/// always balance. Spans without labels are not rendered, and each span is
/// rendered at most once.
pub fn render_markup(tokens: &[Token], entities: &[EntitySpan]) -> String {
    let mut out = String::new();
    let mut open: Option<usize> = None;
    let mut rendered = vec![false; entities.len()];

    for (pos, token) in tokens.iter().enumerate() {
        let covering = entities
            .iter()
            .position(|span| span.primary_label().is_some() && span.covers(token.start_pos));

        if let Some(idx) = open {
            if covering != Some(idx) {
                close(&mut out, &entities[idx]);
                rendered[idx] = true;
                open = None;
            }
        }

        if pos > 0 && !token.is_punctuation() {
            out.push(' ');
        }

        match covering {
            Some(idx) if !rendered[idx] => {
                if open.is_none() {
                    out.push('[');
                    open = Some(idx);
                }
                out.push_str(&token.text);

                if token.end_pos >= entities[idx].end_pos {
                    close(&mut out, &entities[idx]);
                    rendered[idx] = true;
                    open = None;
                }
            }
            _ => out.push_str(&token.text),
        }
    }

    if let Some(idx) = open {
        close(&mut out, &entities[idx]);
    }

    out
}

fn close(out: &mut String, span: &EntitySpan) {
    out.push_str("](");
    out.push_str(span.primary_label().unwrap_or_default());
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Label;

    /// Tokens for space-separated words, with punctuation split off the end.
    fn tokens(sentence: &str) -> Vec<Token> {
        let mut out = Vec::new();
        let mut pos = 0;
        for word in sentence.split(' ') {
            let chars: Vec<char> = word.chars().collect();
            let split = chars
                .iter()
                .rposition(|c| c.is_alphanumeric())
                .map(|i| i + 1)
                .unwrap_or(0);
            if split > 0 {
                out.push(Token::new(chars[..split].iter().collect::<String>(), pos, pos + split));
            }
            if split < chars.len() {
                out.push(Token::new(
                    chars[split..].iter().collect::<String>(),
                    pos + split,
                    pos + chars.len(),
                ));
            }
            pos += chars.len() + 1;
        }
        out
    }

    fn entity(sentence: &str, text: &str, label: &str) -> EntitySpan {
        let byte_start = sentence.find(text).expect("entity text in sentence");
        let start = sentence[..byte_start].chars().count();
        let end = start + text.chars().count();
        EntitySpan::new(text, start, end, vec![Label::new(label, 0.9)])
    }

    /// Depth never leaves 0..=1 and ends at 0.
    fn assert_balanced(markup: &str) {
        let mut depth = 0i32;
        let bytes = markup.as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            if *b == b'[' {
                depth += 1;
            } else if *b == b']' && bytes.get(i + 1) == Some(&b'(') {
                depth -= 1;
            }
            assert!((0..=1).contains(&depth), "unbalanced markup: {}", markup);
        }
        assert_eq!(depth, 0, "unclosed markup: {}", markup);
    }

    #[test]
    fn test_no_entities_round_trips() {
        let sentence = "Mortimer is from London, which is large.";
        let toks = tokens(sentence);
        let markup = render_markup(&toks, &[]);
        assert_eq!(markup, sentence);
        assert!(!markup.contains('['));
    }

    #[test]
    fn test_wally_example() {
        let sentence = "Wally was last seen in the Bermuda Triangle.";
        let toks = tokens(sentence);
        let entities = vec![
            entity(sentence, "Wally", "PER"),
            entity(sentence, "Bermuda Triangle", "LOC"),
        ];
        assert_eq!(
            render_markup(&toks, &entities),
            "[Wally](PER) was last seen in the [Bermuda Triangle](LOC)."
        );
    }

    #[test]
    fn test_multi_token_span() {
        let toks = vec![Token::new("Bermuda", 0, 7), Token::new("Triangle", 8, 16)];
        let entities = vec![EntitySpan::new(
            "Bermuda Triangle",
            0,
            16,
            vec![Label::new("LOC", 0.99)],
        )];
        assert_eq!(render_markup(&toks, &entities), "[Bermuda Triangle](LOC)");
    }

    #[test]
    fn test_span_starting_inside_token_gap() {
        // Span starts at 3 (inside the gap) but the first covered token starts at 4.
        let toks = vec![
            Token::new("in", 0, 2),
            Token::new("New", 4, 7),
            Token::new("York", 8, 12),
        ];
        let entities = vec![EntitySpan::new("New York", 3, 12, vec![Label::new("LOC", 1.0)])];
        assert_eq!(render_markup(&toks, &entities), "in [New York](LOC)");
    }

    #[test]
    fn test_zero_token_span_emits_nothing() {
        let toks = vec![Token::new("Hello", 0, 5), Token::new("world", 10, 15)];
        let entities = vec![EntitySpan::new("x", 6, 8, vec![Label::new("MISC", 0.5)])];
        assert_eq!(render_markup(&toks, &entities), "Hello world");
    }

    #[test]
    fn test_only_first_label_shown() {
        let toks = vec![Token::new("Amsterdam", 0, 9)];
        let entities = vec![EntitySpan::new(
            "Amsterdam",
            0,
            9,
            vec![Label::new("LOC", 0.8), Label::new("ORG", 0.2)],
        )];
        assert_eq!(render_markup(&toks, &entities), "[Amsterdam](LOC)");
    }

    #[test]
    fn test_adjacent_spans() {
        let toks = vec![Token::new("Holmes", 0, 6), Token::new("Watson", 7, 13)];
        let entities = vec![
            EntitySpan::new("Holmes", 0, 6, vec![Label::new("PER", 1.0)]),
            EntitySpan::new("Watson", 7, 13, vec![Label::new("PER", 1.0)]),
        ];
        assert_eq!(render_markup(&toks, &entities), "[Holmes](PER) [Watson](PER)");
    }

    #[test]
    fn test_span_ending_past_last_token_is_closed() {
        let toks = vec![Token::new("the", 0, 3), Token::new("Hague", 4, 9)];
        let entities = vec![EntitySpan::new("Hague", 4, 20, vec![Label::new("LOC", 1.0)])];
        assert_eq!(render_markup(&toks, &entities), "the [Hague](LOC)");
    }

    #[test]
    fn test_overlapping_spans_stay_balanced() {
        let toks = vec![
            Token::new("United", 0, 6),
            Token::new("States", 7, 13),
            Token::new("Army", 14, 18),
        ];
        let entities = vec![
            EntitySpan::new("United States", 0, 13, vec![Label::new("LOC", 1.0)]),
            EntitySpan::new("States Army", 7, 18, vec![Label::new("ORG", 1.0)]),
        ];
        let markup = render_markup(&toks, &entities);
        assert_balanced(&markup);
        assert_eq!(markup, "[United States](LOC) [Army](ORG)");
    }

    #[test]
    fn test_unordered_tokens_do_not_render_span_twice() {
        let toks = vec![
            Token::new("Paris", 0, 5),
            Token::new("and", 6, 9),
            Token::new("Paris", 0, 5),
        ];
        let entities = vec![EntitySpan::new("Paris", 0, 5, vec![Label::new("LOC", 1.0)])];
        let markup = render_markup(&toks, &entities);
        assert_balanced(&markup);
        assert_eq!(markup, "[Paris](LOC) and Paris");
    }

    #[test]
    fn test_unlabeled_span_ignored() {
        let toks = vec![Token::new("Paris", 0, 5)];
        let entities = vec![EntitySpan::new("Paris", 0, 5, Vec::new())];
        assert_eq!(render_markup(&toks, &entities), "Paris");
    }

    #[test]
    fn test_marker_balance_on_arbitrary_input() {
        // Linear congruential generator for reproducible pseudo-random input.
        let mut seed: u64 = 0x5eed;
        let mut next = move |bound: usize| -> usize {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((seed >> 33) as usize) % bound.max(1)
        };

        for _ in 0..500 {
            let mut toks = Vec::new();
            let mut pos = 0;
            for _ in 0..next(12) {
                pos += next(3);
                let len = 1 + next(6);
                let text = if next(5) == 0 { "." } else { "word" };
                toks.push(Token::new(text, pos, pos + len));
                pos += len;
            }
            if next(4) == 0 {
                toks.reverse();
            }

            let mut entities = Vec::new();
            for _ in 0..next(5) {
                let start = next(pos + 2);
                let end = start + next(10);
                let labels = if next(6) == 0 {
                    Vec::new()
                } else {
                    vec![Label::new("PER", 1.0)]
                };
                entities.push(EntitySpan::new("e", start, end, labels));
            }

            let markup = render_markup(&toks, &entities);
            assert_balanced(&markup);

            let plain = markup.replace("](PER)", "").replace('[', "");
            let expected = toks
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    if i > 0 && !t.is_punctuation() {
                        format!(" {}", t.text)
                    } else {
                        t.text.clone()
                    }
                })
                .collect::<String>();
            assert_eq!(plain, expected, "token text lost or duplicated");
        }
    }
}
