use crate::game::{FoundGroup, GuessRecord};
#[cfg(feature = "serde")]
use serde::Serialize;
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How a proposed group compares to the puzzle's hidden groups.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Verdict {
    /// The guess is exactly the hidden group at this index of [`Puzzle::groups`](crate::Puzzle::groups).
    Exact(usize),
    /// The guess shares this many words (1 to 3) with the closest hidden group. Committing it
    /// costs a mistake.
    PartialOverlap(u8),
    /// The guess can't be scored. This is never counted as a mistake.
    Invalid(InvalidGuess),
}

impl Verdict {
    pub fn is_exact(&self) -> bool {
        matches!(self, Verdict::Exact(_))
    }

    /// Returns `true` iff committing this verdict costs a mistake.
    pub fn is_mistake(&self) -> bool {
        matches!(self, Verdict::PartialOverlap(_))
    }

    /// Returns `true` iff the guess was one word away from a hidden group.
    pub fn is_one_away(&self) -> bool {
        matches!(self, Verdict::PartialOverlap(3))
    }
}

/// Why a guess could not be scored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum InvalidGuess {
    #[error("expected {expected} words but got {actual}")]
    WrongSize { expected: usize, actual: usize },
    #[error("{0} is not one of the remaining words")]
    NotRemaining(Arc<str>),
}

/// Indicates that a puzzle could not be constructed or loaded.
#[derive(Debug, Error)]
pub enum PuzzleError {
    /// A puzzle must have exactly [`NUM_GROUPS`](crate::NUM_GROUPS) groups.
    #[error("expected 4 groups but got {0}")]
    GroupCount(usize),
    /// A group must have exactly [`GROUP_SIZE`](crate::GROUP_SIZE) words.
    #[error("group {label:?} has {size} words, expected 4")]
    GroupSize { label: String, size: usize },
    /// No word may appear twice on the board.
    #[error("word {0:?} appears more than once")]
    DuplicateWord(String),
    #[error("group {label:?} has difficulty {difficulty}, expected 1 to 4")]
    Difficulty { label: String, difficulty: u8 },
    #[cfg(feature = "serde")]
    #[error("could not read puzzles: {0}")]
    Json(#[from] serde_json::Error),
}

/// Indicates that a model reply could not be reduced to a usable group of words.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ParseError {
    #[error("the reply was empty")]
    EmptyReply,
    #[error("expected {expected} words but found {actual}")]
    WordCount { expected: usize, actual: usize },
    /// Every proposed word that is not on the board.
    #[error("{0:?} are not among the remaining words")]
    UnknownWords(Vec<String>),
    #[error("{0:?} was proposed more than once")]
    DuplicateWord(String),
    /// The group was already guessed and was wrong.
    #[error("{0} was already guessed and is not a group")]
    RepeatedGuess(String),
}

/// Indicates that the text generator failed to answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum InferenceError {
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("rate limit or quota exceeded")]
    Quota,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl InferenceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, InferenceError::Timeout(_))
    }
}

/// Indicates that a single proposal failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProposalError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl ProposalError {
    /// Malformed proposals are dropped from consensus tallies rather than failing the round.
    pub fn is_malformed(&self) -> bool {
        match self {
            ProposalError::Parse(_) => true,
            ProposalError::Inference(error) => error.is_timeout(),
        }
    }
}

/// Indicates that a turn ended without committing a guess.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("could not parse the proposal: {0}")]
    Parse(#[from] ParseError),
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
    /// Every sample in a consensus round was malformed.
    #[error("all {samples} consensus samples were malformed")]
    ConsensusExhausted { samples: usize },
    /// The game is already solved or out of mistakes.
    #[error("the game is already over")]
    GameOver,
    /// The verdict names a group this puzzle doesn't have.
    #[error("the puzzle has no group {0}")]
    UnknownGroup(usize),
    /// The verdict names a group that was already found.
    #[error("group {0} was already found")]
    GroupAlreadyFound(usize),
}

impl From<ProposalError> for SolverError {
    fn from(error: ProposalError) -> SolverError {
        match error {
            ProposalError::Parse(error) => SolverError::Parse(error),
            ProposalError::Inference(error) => SolverError::Inference(error),
        }
    }
}

/// Indicates that an attempt ended because the engine stopped working, rather than because the
/// puzzle beat it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Malfunction {
    /// This many consecutive turns produced no usable proposal.
    #[error("{0} consecutive proposals were unusable")]
    InvalidProposals(u32),
    /// This many consecutive consensus rounds had only malformed samples.
    #[error("{0} consecutive consensus rounds were exhausted")]
    ConsensusExhausted(u32),
    /// The text generator kept failing after every retry.
    #[error("inference kept failing: {0}")]
    Inference(InferenceError),
    /// The attempt ran past its time budget and was dropped.
    #[error("the attempt was cancelled")]
    Cancelled,
}

impl Malfunction {
    /// A short name for this kind of malfunction, for grouping in summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Malfunction::InvalidProposals(_) => "invalid_proposals",
            Malfunction::ConsensusExhausted(_) => "consensus_exhausted",
            Malfunction::Inference(_) => "inference",
            Malfunction::Cancelled => "cancelled",
        }
    }
}

/// How an attempt at a puzzle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum GameResult {
    /// Every group was found.
    Solved,
    /// The mistake budget ran out first.
    OutOfMistakes,
    /// The engine failed; this is reported separately from genuine losses.
    Malfunction(Malfunction),
}

/// The record emitted once per finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct AttemptReport {
    pub puzzle_id: u32,
    pub result: GameResult,
    pub mistakes: u32,
    pub found_groups: Vec<FoundGroup>,
    pub guesses: Vec<GuessRecord>,
    pub usage: InferenceUsage,
}

/// What an attempt cost in generator calls and tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct InferenceUsage {
    pub generator_calls: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Proposed words that were not among the remaining words.
    pub hallucinated_words: u32,
}

impl InferenceUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl AddAssign for InferenceUsage {
    fn add_assign(&mut self, other: InferenceUsage) {
        self.generator_calls += other.generator_calls;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.hallucinated_words += other.hallucinated_words;
    }
}

/// Points for each group found.
pub const POINTS_PER_GROUP: u32 = 5;

/// Points lost for each mistake.
pub const POINTS_PER_MISTAKE: u32 = 1;

impl AttemptReport {
    /// The report for an attempt that was dropped before it finished, with the usage it ran up.
    pub fn cancelled(puzzle_id: u32, usage: InferenceUsage) -> AttemptReport {
        AttemptReport {
            puzzle_id,
            result: GameResult::Malfunction(Malfunction::Cancelled),
            mistakes: 0,
            found_groups: Vec::new(),
            guesses: Vec::new(),
            usage,
        }
    }

    pub fn solved(&self) -> bool {
        self.result == GameResult::Solved
    }

    pub fn is_malfunction(&self) -> bool {
        matches!(self.result, GameResult::Malfunction(_))
    }

    /// The malfunction that ended the attempt, if any.
    pub fn failure_reason(&self) -> Option<&Malfunction> {
        match &self.result {
            GameResult::Malfunction(malfunction) => Some(malfunction),
            _ => None,
        }
    }

    /// The difficulty of each found group, in the order they were found.
    pub fn solve_order(&self) -> Vec<u8> {
        self.found_groups
            .iter()
            .map(|group| group.difficulty)
            .collect()
    }

    /// Scores the attempt: [`POINTS_PER_GROUP`] per group found, minus [`POINTS_PER_MISTAKE`] per
    /// mistake, never below zero.
    pub fn points(&self) -> u32 {
        (self.found_groups.len() as u32 * POINTS_PER_GROUP)
            .saturating_sub(self.mistakes * POINTS_PER_MISTAKE)
    }
}
