//! Rule-based recognizer.
//!
//! Splits a sentence into word and punctuation tokens, then tags entities
//! with a small gazetteer of organizations and places, person titles, and
//! runs of capitalized words. Needs no model server, so it backs offline
//! runs and tests. Quality is far below a trained tagger.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{Recognizer, RecognizerError};
use crate::models::{EntitySpan, Label, Prediction, Token};

/// Longest gazetteer phrase, in tokens.
const MAX_PHRASE_TOKENS: usize = 4;

/// Longest capitalized run tagged as one person.
const MAX_NAME_TOKENS: usize = 4;

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\w+(?:['’.\-]\w+)*|[^\w\s]").expect("token pattern should compile")
});

// ============================================================================
// Gazetteers
// ============================================================================

static ORGANIZATIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "UN", "EU", "NATO", "UNESCO", "UNICEF", "WHO", "IMF", "OPEC", "FBI", "CIA", "NSA", "NASA",
        "BBC", "CNN", "KLM", "ING", "KNMI", "NOS", "ABN AMRO", "Philips", "Shell", "Unilever",
        "Heineken", "Google", "Microsoft", "Apple", "Amazon", "Reuters",
        "United Nations",
        "European Union",
        "European Commission",
        "World Health Organization",
        "Red Cross",
        "Supreme Court",
        "White House",
        "State Department",
        "Pentagon",
        "Tweede Kamer",
        "Utrecht University",
        "Universiteit Utrecht",
    ]
    .into_iter()
    .collect()
});

static LOCATIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "London", "Paris", "Berlin", "Brussels", "Madrid", "Rome", "Vienna", "Moscow", "Tokyo",
        "Beijing", "Washington", "Chicago", "Boston", "Amsterdam", "Rotterdam", "Utrecht",
        "Leiden", "Groningen", "Eindhoven", "Antwerp", "Bermuda", "Europe", "Asia", "Africa",
        "America", "England", "Scotland", "Ireland", "France", "Germany", "Belgium", "Spain",
        "Italy", "Netherlands", "Nederland", "Holland", "China", "Japan", "India", "Russia",
        "Canada", "Mexico", "Brazil", "Australia", "Atlantic", "Pacific",
        "New York",
        "Los Angeles",
        "San Francisco",
        "The Hague",
        "Den Haag",
        "Bermuda Triangle",
        "United States",
        "United Kingdom",
        "Washington D.C.",
        "North Sea",
        "Noordzee",
    ]
    .into_iter()
    .collect()
});

static NATIONALITIES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "American", "British", "English", "Dutch", "German", "French", "Belgian", "Spanish",
        "Italian", "Russian", "Chinese", "Japanese", "European", "Nederlandse", "Nederlands",
        "Engelse", "Duitse", "Franse", "Christian", "Muslim", "Jewish", "Catholic",
        "Protestant",
    ]
    .into_iter()
    .collect()
});

static TITLES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "Mr", "Mrs", "Ms", "Miss", "Dr", "Prof", "Sir", "Lady", "Lord", "President", "Senator",
        "Governor", "Mayor", "Judge", "General", "Captain", "Colonel", "Minister", "Dhr", "Mevr",
        "Mw", "Meneer", "Mevrouw", "Burgemeester",
    ]
    .into_iter()
    .collect()
});

// Capitalized words that start sentences or phrases without being names.
static LEADING_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "The", "A", "An", "In", "On", "At", "Of", "For", "From", "To", "And", "But", "Or", "If",
        "When", "While", "After", "Before", "This", "That", "These", "Those", "He", "She", "It",
        "We", "They", "I", "His", "Her", "Their", "Our", "My", "Yesterday", "Today", "Tomorrow",
        "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday", "January",
        "February", "March", "April", "May", "June", "July", "August", "September", "October",
        "November", "December", "De", "Het", "Een", "En", "Op", "Bij", "Van", "Voor", "Na",
        "Maar", "Dat", "Dit", "Hij", "Zij", "Ze", "Wij", "Ik",
    ]
    .into_iter()
    .collect()
});

// Capitalized pairs that look like names but aren't.
static NAME_STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "Top Secret",
        "Prime Minister",
        "Foreign Affairs",
        "Human Rights",
        "Middle Ages",
        "Good Friday",
        "Christmas Eve",
        "New Year",
    ]
    .into_iter()
    .collect()
});

/// Built-in rule-based recognizer.
pub struct PatternRecognizer;

impl PatternRecognizer {
    pub fn new() -> Self {
        Self
    }

    /// Tokenize and tag a sentence.
    pub fn analyze(&self, sentence: &str) -> Prediction {
        let tokens = tokenize(sentence);
        let chars: Vec<char> = sentence.chars().collect();
        let entities = tag(&chars, &tokens);
        Prediction::new(tokens, entities)
    }
}

impl Default for PatternRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Recognizer for PatternRecognizer {
    fn model_id(&self) -> &str {
        "pattern"
    }

    async fn predict(&self, sentence: &str) -> Result<Prediction, RecognizerError> {
        Ok(self.analyze(sentence))
    }
}

/// Split into word and punctuation tokens with character offsets.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut char_pos = 0;
    let mut byte_pos = 0;

    for m in TOKEN_PATTERN.find_iter(text) {
        char_pos += text[byte_pos..m.start()].chars().count();
        let len = m.as_str().chars().count();
        tokens.push(Token::new(m.as_str(), char_pos, char_pos + len));
        char_pos += len;
        byte_pos = m.end();
    }

    tokens
}

fn tag(chars: &[char], tokens: &[Token]) -> Vec<EntitySpan> {
    let mut entities = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if let Some((len, label)) = gazetteer_match(chars, tokens, i) {
            entities.push(span(chars, &tokens[i..i + len], label, 0.9));
            i += len;
            continue;
        }

        if TITLES.contains(tokens[i].text.as_str()) {
            let mut start = i + 1;
            if tokens.get(start).is_some_and(|t| t.text == ".") {
                start += 1;
            }
            let len = capitalized_run(tokens, start);
            if len > 0 {
                entities.push(span(chars, &tokens[start..start + len], "PER", 0.85));
                i = start + len;
                continue;
            }
        }

        let len = capitalized_run(tokens, i);
        if len >= 2 {
            let run = &tokens[i..i + len];
            if !NAME_STOPWORDS.contains(phrase(chars, run).as_str()) {
                entities.push(span(chars, run, "PER", 0.6));
                i += len;
                continue;
            }
        }

        if NATIONALITIES.contains(tokens[i].text.as_str()) {
            entities.push(span(chars, &tokens[i..i + 1], "MISC", 0.7));
        }
        i += 1;
    }

    entities
}

/// Longest gazetteer phrase starting at token `i`.
fn gazetteer_match(chars: &[char], tokens: &[Token], i: usize) -> Option<(usize, &'static str)> {
    let longest = MAX_PHRASE_TOKENS.min(tokens.len() - i);
    (1..=longest).rev().find_map(|len| {
        let candidate = phrase(chars, &tokens[i..i + len]);
        if ORGANIZATIONS.contains(candidate.as_str()) {
            Some((len, "ORG"))
        } else if LOCATIONS.contains(candidate.as_str()) {
            Some((len, "LOC"))
        } else {
            None
        }
    })
}

/// Number of consecutive name-like tokens starting at `start`.
fn capitalized_run(tokens: &[Token], start: usize) -> usize {
    let first = match tokens.get(start) {
        Some(t) => t,
        None => return 0,
    };
    if LEADING_WORDS.contains(first.text.as_str()) {
        return 0;
    }

    tokens[start..]
        .iter()
        .take(MAX_NAME_TOKENS)
        .take_while(|t| is_capitalized(&t.text) && !LEADING_WORDS.contains(t.text.as_str()))
        .count()
}

/// Uppercase first letter followed by letters including at least one lowercase.
fn is_capitalized(word: &str) -> bool {
    let mut chars = word.chars();
    if !chars.next().is_some_and(char::is_uppercase) {
        return false;
    }
    let rest: Vec<char> = chars.collect();
    !rest.is_empty()
        && rest
            .iter()
            .all(|c| c.is_alphabetic() || *c == '\'' || *c == '’' || *c == '-')
        && rest.iter().any(|c| c.is_lowercase())
}

/// Source text covered by `tokens` with whitespace collapsed.
fn phrase(chars: &[char], tokens: &[Token]) -> String {
    let (start, end) = bounds(tokens);
    let raw: String = chars[start..end].iter().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn bounds(tokens: &[Token]) -> (usize, usize) {
    let start = tokens.first().map(|t| t.start_pos).unwrap_or(0);
    let end = tokens.last().map(|t| t.end_pos).unwrap_or(start);
    (start, end)
}

fn span(chars: &[char], tokens: &[Token], label: &str, confidence: f32) -> EntitySpan {
    let (start, end) = bounds(tokens);
    let text: String = chars[start..end].iter().collect();
    EntitySpan::new(text, start, end, vec![Label::new(label, confidence)])
}
