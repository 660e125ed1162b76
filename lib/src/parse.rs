use crate::game::{Candidate, GameState};
use crate::puzzle::{normalize_word, WordSet, GROUP_SIZE};
use crate::results::ParseError;
use regex::Regex;
use std::sync::Arc;
use std::sync::OnceLock;

fn group_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?im)^[ \t>*_`#-]*group[ \t*_`]*:[ \t*_`]*(.*)$")
            .expect("valid group pattern")
    })
}

fn category_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?im)^[ \t>*_`#-]*category[ \t*_`]*:[ \t*_`]*(.*)$")
            .expect("valid category pattern")
    })
}

/// Separators between listed words: commas, and a conjunction before the last word.
fn list_separator() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i),|\band\b").expect("valid separator pattern"))
}

/// Reduces a model reply to a candidate drawn from the remaining words.
///
/// A `Group: a, b, c, d` line is preferred; the last one wins, so chain-of-thought replies can
/// think out loud first. Without one, the reply is accepted only if it mentions exactly four
/// remaining words. A `Category:` line, if any, becomes the label.
///
/// Groups that were already guessed and rejected are refused, since resubmitting one can only
/// cost a mistake.
pub fn parse_reply(reply: &str, state: &GameState) -> Result<Candidate, ParseError> {
    if reply.trim().is_empty() {
        return Err(ParseError::EmptyReply);
    }
    let words = match last_capture(group_line(), reply) {
        Some(listed) => words_from_list(&listed, state.remaining_words())?,
        None => words_mentioned(reply, state.remaining_words())?,
    };
    let candidate = Candidate {
        words,
        label: last_capture(category_line(), reply).unwrap_or_default(),
    };
    if state.was_rejected(&candidate.words) {
        return Err(ParseError::RepeatedGuess(candidate.to_string()));
    }
    Ok(candidate)
}

fn last_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|capture| capture.as_str().trim().trim_matches('`').trim().to_string())
        .filter(|capture| !capture.is_empty())
        .last()
}

fn clean_token(token: &str) -> String {
    let token = token.trim().trim_matches(|c: char| {
        matches!(
            c,
            '*' | '"' | '`' | '.' | '[' | ']' | '(' | ')' | '\'' | '_'
        )
    });
    normalize_word(token)
}

fn words_from_list(listed: &str, remaining: &WordSet) -> Result<WordSet, ParseError> {
    let tokens: Vec<String> = list_separator()
        .split(listed)
        .map(clean_token)
        .filter(|token| !token.is_empty())
        .collect();
    if tokens.len() != GROUP_SIZE {
        return Err(ParseError::WordCount {
            expected: GROUP_SIZE,
            actual: tokens.len(),
        });
    }
    let unknown: Vec<String> = tokens
        .iter()
        .filter(|token| !remaining.contains(token.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(ParseError::UnknownWords(unknown));
    }
    let mut words = WordSet::new();
    for token in tokens {
        if let Some(word) = remaining.get(token.as_str()) {
            if !words.insert(Arc::clone(word)) {
                return Err(ParseError::DuplicateWord(token));
            }
        }
    }
    Ok(words)
}

fn words_mentioned(reply: &str, remaining: &WordSet) -> Result<WordSet, ParseError> {
    let text = reply.to_uppercase();
    let words: WordSet = remaining
        .iter()
        .filter(|word| mentions(&text, word))
        .map(Arc::clone)
        .collect();
    if words.len() != GROUP_SIZE {
        return Err(ParseError::WordCount {
            expected: GROUP_SIZE,
            actual: words.len(),
        });
    }
    Ok(words)
}

/// Returns `true` iff `word` appears in `text` as a whole word.
fn mentions(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(index, _)| {
        let before = text[..index].chars().next_back();
        let after = text[index + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
