//! Sentence splitting ahead of recognition.

use std::collections::HashSet;
use std::sync::LazyLock;

use unicode_segmentation::UnicodeSegmentation;

/// Abbreviations whose trailing period does not end a sentence.
static ABBREVIATIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "Mr", "Mrs", "Ms", "Dr", "Prof", "Sr", "Jr", "St", "Gen", "Col", "Capt", "Lt", "Sgt",
        "Rev", "Hon", "vs", "etc", "e.g", "i.e", "No", "Dhr", "Mevr", "Mw", "drs", "ir", "mr",
        "dr", "bijv", "o.a",
    ]
    .into_iter()
    .collect()
});

/// Splits document text into sentences for the recognizer.
pub trait SentenceSplitter: Send + Sync {
    /// Trimmed, non-empty sentences in document order.
    fn split(&self, text: &str) -> Vec<String>;
}

/// Splitter based on Unicode sentence boundaries (UAX #29), with
/// re-joining after common title and reference abbreviations.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnicodeSentenceSplitter;

impl UnicodeSentenceSplitter {
    pub fn new() -> Self {
        Self
    }
}

impl SentenceSplitter for UnicodeSentenceSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let mut sentences: Vec<String> = Vec::new();
        let mut pending = String::new();

        for piece in text.split_sentence_bounds() {
            let trimmed = piece.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !pending.is_empty() {
                pending.push(' ');
            }
            pending.push_str(trimmed);

            let ends_with_newline = piece.ends_with('\n') || piece.ends_with('\r');
            if ends_with_newline || !ends_with_abbreviation(&pending) {
                sentences.push(std::mem::take(&mut pending));
            }
        }

        if !pending.is_empty() {
            sentences.push(pending);
        }
        sentences
    }
}

fn ends_with_abbreviation(sentence: &str) -> bool {
    let Some(stripped) = sentence.strip_suffix('.') else {
        return false;
    };
    let last_word = stripped
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or(stripped);
    ABBREVIATIONS.contains(last_word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str) -> Vec<String> {
        UnicodeSentenceSplitter::new().split(text)
    }

    #[test]
    fn test_splits_on_sentence_boundaries() {
        assert_eq!(
            split("Mortimer is from London. He lives in Paris now!  Why?"),
            vec!["Mortimer is from London.", "He lives in Paris now!", "Why?"]
        );
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        assert_eq!(
            split("Mr. Smith met Dr. Jones in London. They talked."),
            vec!["Mr. Smith met Dr. Jones in London.", "They talked."]
        );
    }

    #[test]
    fn test_paragraph_breaks_split() {
        assert_eq!(
            split("First line without stop\n\nSecond line"),
            vec!["First line without stop", "Second line"]
        );
    }

    #[test]
    fn test_blank_text_has_no_sentences() {
        assert!(split("").is_empty());
        assert!(split("   \n\t ").is_empty());
    }

    #[test]
    fn test_splitting_is_restartable() {
        let splitter = UnicodeSentenceSplitter::new();
        let text = "One. Two.";
        assert_eq!(splitter.split(text), splitter.split(text));
    }
}
