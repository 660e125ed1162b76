use crate::game::GameState;
use crate::puzzle::WordSet;
use crate::results::Verdict;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt::Write;

/// A request for the text generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

/// How a proposer phrases its request. Each solver strategy uses one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptStyle {
    /// The word list and the answer format, nothing else.
    Naive,
    /// Asks for step-by-step reasoning before the answer.
    ChainOfThought,
    /// A minimal prompt with no system message.
    Basic,
    /// The guesser prompt used by consensus strategies, with worked example categories.
    Guesser,
    /// A terse prompt for single-shot guesses.
    Snap,
}

const SYSTEM_PROMPT: &str = "You are playing Connections. Sixteen words hide four groups of four \
words that share a category. Find one group at a time.";

const GUESSER_SYSTEM_PROMPT: &str = "You are an expert word grouping agent. You understand \
literature and culture, and you are well versed in common phrases and wordplay. Given a list of \
words, propose one group of 4 related words and a category that only those four words fit. \
Example categories and groups:\n\
SNEAKER BRANDS: adidas, nike, puma, reebok\n\
CLEANING VERBS: dust, mop, sweep, vacuum\n\
___ MAN SUPERHEROES: bat, iron, spider, super\n\
SYNONYMS FOR SAD: blue, down, glum, low\n\
SHADES OF BLUE: baby, midnight, powder, royal\n\
MEMBERS OF A SEPTET: sea, sin, sister, wonder\n\
BABY ANIMALS: calf, cub, joey, kid\n\
___ FISH THAT AREN'T FISH: cray, jelly, silver, star";

const ANSWER_FORMAT: &str = "Format your answer as:\nGroup: word1, word2, word3, word4\nCategory: category name";

impl PromptStyle {
    /// Builds the prompt for the next guess.
    ///
    /// The remaining words are shuffled with a generator seeded from `seed` and the number of
    /// committed guesses, so the hidden group order never shows through and reruns are
    /// reproducible.
    pub fn build(&self, state: &GameState, seed: u64) -> Prompt {
        let words = shuffled_words(state.remaining_words(), seed, state.history().len());
        let history = history_feedback(state);
        match self {
            PromptStyle::Naive => Prompt {
                system: Some(SYSTEM_PROMPT.to_string()),
                user: format!(
                    "{history}Words: {words}\n\nFind one group of 4 related words from the list \
                     above.\n{ANSWER_FORMAT}"
                ),
            },
            PromptStyle::ChainOfThought => Prompt {
                system: Some(SYSTEM_PROMPT.to_string()),
                user: format!(
                    "{history}Words: {words}\n\nThink step by step. First list the possible \
                     categories you see and which words could fit each one. Watch for words \
                     that fit more than one category. Then choose the group you are most sure \
                     of. End your answer with:\nGroup: word1, word2, word3, word4\nCategory: \
                     category name"
                ),
            },
            PromptStyle::Basic => Prompt {
                system: None,
                user: format!("{history}Words: {words}\n{ANSWER_FORMAT}"),
            },
            PromptStyle::Guesser => Prompt {
                system: Some(GUESSER_SYSTEM_PROMPT.to_string()),
                user: format!(
                    "{history}Words: {words}\n\n\
                     Objective: find a group of 4 related words from the list above and give a \
                     specific category that describes only them.\n\n\
                     Guidelines:\n\
                     - Categories must be more specific than 'Names', 'Verbs' or '5-Letter Words'.\n\
                     - Each word must clearly fit the category. Look out for common phrases, \
                     wordplay, and words with several meanings.\n\
                     - Avoid vague categories that could cover other words on the board.\n\n\
                     {ANSWER_FORMAT}\n\
                     Do not add anything else."
                ),
            },
            PromptStyle::Snap => Prompt {
                system: Some(SYSTEM_PROMPT.to_string()),
                user: format!(
                    "Here are some words: {words}\n{history}Task: create one logical grouping \
                     that uses 4 words.\n{ANSWER_FORMAT}"
                ),
            },
        }
    }
}

fn shuffled_words(words: &WordSet, seed: u64, turn: usize) -> String {
    let mut words: Vec<&str> = words.iter().map(|word| word.as_ref()).collect();
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(turn as u64));
    words.shuffle(&mut rng);
    words.join(", ")
}

/// Summarizes the committed guesses so the model can build on correct ones and avoid repeating
/// wrong ones. Empty before the first guess.
fn history_feedback(state: &GameState) -> String {
    if state.history().is_empty() {
        return String::new();
    }
    let mut feedback = String::from("Previous guesses:\n");
    for record in state.history() {
        let words = record
            .words
            .iter()
            .map(|word| word.as_ref())
            .collect::<Vec<&str>>()
            .join(", ");
        let outcome = match &record.verdict {
            Verdict::Exact(_) => "correct",
            Verdict::PartialOverlap(3) => "wrong, one away",
            Verdict::PartialOverlap(_) => "wrong",
            Verdict::Invalid(_) => continue,
        };
        // Writing to a String can't fail.
        let _ = writeln!(feedback, "- {words} ({}): {outcome}", record.label);
    }
    if state.mistakes() > 0 {
        feedback.push_str("Do not repeat a wrong guess.\n");
    }
    let _ = writeln!(
        feedback,
        "Mistakes remaining: {}\n",
        state.mistake_limit().saturating_sub(state.mistakes())
    );
    feedback
}
