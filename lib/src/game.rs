use crate::puzzle::{overlap, Puzzle, WordSet};
use crate::results::{SolverError, Verdict};
#[cfg(feature = "serde")]
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// The canonical number of mistakes allowed before a game is lost.
pub const DEFAULT_MISTAKE_LIMIT: u32 = 4;

/// A proposed grouping: the words to submit, plus the model's guess at their category.
///
/// Only the words are checked. The label is advisory and is kept for logs and prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub words: WordSet,
    pub label: String,
}

impl Candidate {
    pub fn new<S>(words: impl IntoIterator<Item = S>, label: &str) -> Candidate
    where
        S: AsRef<str>,
    {
        Candidate {
            words: words
                .into_iter()
                .map(|word| Arc::from(crate::puzzle::normalize_word(word.as_ref()).as_str()))
                .collect(),
            label: label.trim().to_string(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_words(f, &self.words)
    }
}

fn write_words(f: &mut fmt::Formatter<'_>, words: &WordSet) -> fmt::Result {
    for (index, word) in words.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        f.write_str(word)?;
    }
    Ok(())
}

/// A group that has been correctly identified.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FoundGroup {
    pub label: Arc<str>,
    pub difficulty: u8,
    pub words: WordSet,
}

/// A committed guess and the verdict it received.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GuessRecord {
    /// One-based position of this guess in the attempt.
    pub attempt: u32,
    pub words: WordSet,
    /// The category the solver had in mind.
    pub label: String,
    pub verdict: Verdict,
}

/// Progress through a single attempt at a puzzle.
///
/// The remaining words and the found groups always partition the puzzle's words. Found groups,
/// the guess history, and the mistake count only ever grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    remaining: WordSet,
    found: Vec<FoundGroup>,
    history: Vec<GuessRecord>,
    mistakes: u32,
    mistake_limit: u32,
}

impl GameState {
    /// Starts a fresh attempt at the given puzzle.
    pub fn new(puzzle: &Puzzle, mistake_limit: u32) -> GameState {
        GameState {
            remaining: puzzle.words().clone(),
            found: Vec::new(),
            history: Vec::new(),
            mistakes: 0,
            mistake_limit,
        }
    }

    /// Words that have not yet been placed in a found group.
    pub fn remaining_words(&self) -> &WordSet {
        &self.remaining
    }

    pub fn found_groups(&self) -> &[FoundGroup] {
        &self.found
    }

    /// Every committed guess, in order.
    pub fn history(&self) -> &[GuessRecord] {
        &self.history
    }

    /// Committed guesses that cost a mistake.
    pub fn failed_guesses(&self) -> impl Iterator<Item = &GuessRecord> {
        self.history
            .iter()
            .filter(|record| record.verdict.is_mistake())
    }

    /// Returns `true` iff exactly these words were already guessed and were wrong.
    pub fn was_rejected(&self, words: &WordSet) -> bool {
        self.failed_guesses().any(|record| record.words == *words)
    }

    /// The largest number of words the given set shares with any found group.
    pub fn max_overlap_with_found(&self, words: &WordSet) -> usize {
        self.found
            .iter()
            .map(|group| overlap(&group.words, words))
            .max()
            .unwrap_or(0)
    }

    pub fn mistakes(&self) -> u32 {
        self.mistakes
    }

    pub fn mistake_limit(&self) -> u32 {
        self.mistake_limit
    }

    pub fn is_solved(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn is_out_of_mistakes(&self) -> bool {
        self.mistakes >= self.mistake_limit
    }

    pub fn is_over(&self) -> bool {
        self.is_solved() || self.is_out_of_mistakes()
    }

    /// Records a checked guess.
    ///
    /// An exact match moves its words into the found groups, and a partial overlap costs a
    /// mistake. Both are appended to the history. Invalid guesses leave the state untouched.
    ///
    /// An exact verdict for a group the puzzle doesn't have, or for a group that was already
    /// found, is refused and leaves the state untouched.
    pub fn commit(
        &mut self,
        puzzle: &Puzzle,
        candidate: &Candidate,
        verdict: &Verdict,
    ) -> Result<(), SolverError> {
        if self.is_over() {
            return Err(SolverError::GameOver);
        }
        match verdict {
            Verdict::Invalid(_) => return Ok(()),
            Verdict::Exact(index) => {
                let group = puzzle
                    .group(*index)
                    .ok_or(SolverError::UnknownGroup(*index))?;
                if self.found.iter().any(|found| found.words == *group.words()) {
                    return Err(SolverError::GroupAlreadyFound(*index));
                }
                for word in group.words() {
                    self.remaining.remove(word);
                }
                self.found.push(FoundGroup {
                    label: Arc::clone(group.label()),
                    difficulty: group.difficulty(),
                    words: group.words().clone(),
                });
            }
            Verdict::PartialOverlap(_) => self.mistakes += 1,
        }
        self.history.push(GuessRecord {
            attempt: self.history.len() as u32 + 1,
            words: candidate.words.clone(),
            label: candidate.label.clone(),
            verdict: verdict.clone(),
        });
        Ok(())
    }
}
