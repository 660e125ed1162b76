use crate::consensus::{ConsensusConfig, ConsensusEngine, SnapConfig};
use crate::game::{Candidate, GameState, DEFAULT_MISTAKE_LIMIT};
use crate::prompt::PromptStyle;
use crate::proposer::{Proposer, SamplingConfig, TextGenerator, UsageMeter};
use crate::puzzle::Puzzle;
use crate::results::{
    AttemptReport, GameResult, InferenceError, InferenceUsage, Malfunction, SolverError, Verdict,
};
use crate::validator::check_guess;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The ways a [`Solver`] can come up with its next guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum Strategy {
    /// One plain prompt per guess.
    Naive,
    /// One prompt per guess that asks for reasoning first.
    #[cfg_attr(feature = "serde", serde(rename = "cot"))]
    ChainOfThought,
    /// One minimal prompt per guess.
    Basic,
    /// Guess, validate, consensus: several samples per guess, decided by vote.
    Gvc,
    /// Like [`Strategy::Gvc`], but a single sample is trusted while the game looks safe.
    SnapGvc,
}

impl Strategy {
    pub fn all() -> [Strategy; 5] {
        [
            Strategy::Naive,
            Strategy::ChainOfThought,
            Strategy::Basic,
            Strategy::Gvc,
            Strategy::SnapGvc,
        ]
    }

    /// The short name used on the command line and in reports.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Naive => "naive",
            Strategy::ChainOfThought => "cot",
            Strategy::Basic => "basic",
            Strategy::Gvc => "gvc",
            Strategy::SnapGvc => "snap_gvc",
        }
    }

    pub fn prompt_style(&self) -> PromptStyle {
        match self {
            Strategy::Naive => PromptStyle::Naive,
            Strategy::ChainOfThought => PromptStyle::ChainOfThought,
            Strategy::Basic => PromptStyle::Basic,
            Strategy::Gvc => PromptStyle::Guesser,
            Strategy::SnapGvc => PromptStyle::Snap,
        }
    }

    /// Returns `true` iff guesses are decided by voting over several samples.
    pub fn uses_consensus(&self) -> bool {
        matches!(self, Strategy::Gvc | Strategy::SnapGvc)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Indicates that a strategy name wasn't recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown strategy {0:?}, expected one of naive, cot, basic, gvc, snap_gvc")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(name: &str) -> Result<Strategy, UnknownStrategy> {
        let name = name.trim().to_lowercase().replace('-', "_");
        Strategy::all()
            .into_iter()
            .find(|strategy| strategy.name() == name)
            .ok_or(UnknownStrategy(name))
    }
}

/// Everything that tunes a [`Solver`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default))]
pub struct SolverConfig {
    /// Mistakes allowed before the puzzle is lost.
    pub mistake_limit: u32,
    pub sampling: SamplingConfig,
    pub consensus: ConsensusConfig,
    pub snap: SnapConfig,
    /// Consecutive turns without a committed guess after which the attempt is abandoned.
    pub skip_turn_ceiling: u32,
    /// How many times a failed generator call is retried within one turn.
    pub inference_retries: u32,
    /// The delay before the first retry. It doubles for each later retry.
    pub retry_backoff: Duration,
    /// Seeds the word order shown in prompts.
    pub shuffle_seed: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            mistake_limit: DEFAULT_MISTAKE_LIMIT,
            sampling: SamplingConfig::default(),
            consensus: ConsensusConfig::default(),
            snap: SnapConfig::default(),
            skip_turn_ceiling: 3,
            inference_retries: 2,
            retry_backoff: Duration::from_millis(500),
            shuffle_seed: 0,
        }
    }
}

impl SolverConfig {
    /// The delay before the given retry (starting at 1): exponential backoff plus up to 50%
    /// random jitter.
    fn backoff(&self, retry: u32) -> Duration {
        let base = self
            .retry_backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)));
        let jitter_ms = u64::try_from(base.as_millis() / 2).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return base;
        }
        base.saturating_add(Duration::from_millis(
            rand::thread_rng().gen_range(0..=jitter_ms),
        ))
    }
}

/// Plays Connections puzzles with a text generator, using one [`Strategy`].
///
/// A solver holds no per-puzzle state, so one solver can run many attempts at once.
pub struct Solver<G> {
    generator: G,
    strategy: Strategy,
    config: SolverConfig,
}

impl<G: TextGenerator> Solver<G> {
    pub fn new(generator: G, strategy: Strategy, config: SolverConfig) -> Solver<G> {
        Solver {
            generator,
            strategy,
            config,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Starts a fresh attempt at the given puzzle.
    pub fn start<'a>(&'a self, puzzle: &'a Puzzle) -> Attempt<'a, G> {
        self.start_metered(puzzle, Arc::new(UsageMeter::default()))
    }

    /// Starts a fresh attempt that records its usage on `meter`, which stays readable if the
    /// attempt is dropped before it finishes.
    pub fn start_metered<'a>(
        &'a self,
        puzzle: &'a Puzzle,
        meter: Arc<UsageMeter>,
    ) -> Attempt<'a, G> {
        Attempt {
            puzzle,
            state: GameState::new(puzzle, self.config.mistake_limit),
            proposer: Proposer::with_meter(
                &self.generator,
                self.strategy.prompt_style(),
                &self.config.sampling,
                self.config.shuffle_seed ^ u64::from(puzzle.id()),
                meter,
            ),
            strategy: self.strategy,
            config: &self.config,
        }
    }

    /// Plays the given puzzle until it is solved, lost, or the engine gives up.
    pub async fn solve(&self, puzzle: &Puzzle) -> AttemptReport {
        self.start(puzzle).run().await
    }
}

/// One attempt at one puzzle.
///
/// Dropping an attempt, or the future driving it, abandons the attempt and its state.
pub struct Attempt<'a, G> {
    puzzle: &'a Puzzle,
    state: GameState,
    proposer: Proposer<'a, G>,
    strategy: Strategy,
    config: &'a SolverConfig,
}

impl<'a, G: TextGenerator> Attempt<'a, G> {
    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn puzzle(&self) -> &Puzzle {
        self.puzzle
    }

    /// The number of generator calls made so far.
    pub fn generator_calls(&self) -> u32 {
        self.proposer.calls()
    }

    pub fn usage(&self) -> InferenceUsage {
        self.proposer.usage()
    }

    /// Plays one turn: obtains a candidate, checks it, and commits the verdict.
    ///
    /// An [`Verdict::Invalid`] candidate is returned without changing the state. Errors also
    /// leave the state untouched.
    pub async fn propose_and_commit(&mut self) -> Result<Verdict, SolverError> {
        if self.state.is_over() {
            return Err(SolverError::GameOver);
        }
        let candidate = self.next_candidate().await?;
        let verdict = check_guess(self.puzzle, self.state.remaining_words(), &candidate.words);
        self.state.commit(self.puzzle, &candidate, &verdict)?;
        info!(
            puzzle = self.puzzle.id(),
            strategy = %self.strategy,
            guess = %candidate,
            label = %candidate.label,
            verdict = ?verdict,
            mistakes = self.state.mistakes(),
            "checked guess"
        );
        Ok(verdict)
    }

    async fn next_candidate(&self) -> Result<Candidate, SolverError> {
        if !self.strategy.uses_consensus() {
            return Ok(self.proposer.propose(&self.state).await?);
        }
        let engine = ConsensusEngine::new(&self.proposer, &self.config.consensus, &self.config.snap);
        let decision = match self.strategy {
            Strategy::SnapGvc => engine.decide_snap(&self.state).await?,
            _ => engine.decide(&self.state).await?,
        };
        debug!(
            votes = decision.votes,
            agreed = decision.agreed,
            short_circuit = decision.short_circuit,
            "consensus decided"
        );
        Ok(decision.candidate)
    }

    /// Plays until the puzzle is solved, the mistakes run out, or the engine malfunctions.
    pub async fn run(mut self) -> AttemptReport {
        let mut skipped = 0;
        let mut exhausted = 0;
        let mut retries = 0;
        let result = loop {
            if self.state.is_solved() {
                break GameResult::Solved;
            }
            if self.state.is_out_of_mistakes() {
                break GameResult::OutOfMistakes;
            }
            match self.propose_and_commit().await {
                Ok(Verdict::Invalid(reason)) => {
                    warn!(puzzle = self.puzzle.id(), %reason, "skipping invalid guess");
                    skipped += 1;
                    exhausted = 0;
                }
                Ok(_) => {
                    skipped = 0;
                    exhausted = 0;
                }
                Err(SolverError::Parse(error)) => {
                    warn!(puzzle = self.puzzle.id(), %error, "skipping unusable proposal");
                    skipped += 1;
                    exhausted = 0;
                }
                Err(SolverError::ConsensusExhausted { samples }) => {
                    warn!(puzzle = self.puzzle.id(), samples, "consensus exhausted");
                    skipped += 1;
                    exhausted += 1;
                }
                Err(SolverError::Inference(error)) => {
                    if retries >= self.config.inference_retries {
                        break GameResult::Malfunction(Malfunction::Inference(error));
                    }
                    retries += 1;
                    self.back_off(retries, &error).await;
                    continue;
                }
                Err(
                    error @ (SolverError::UnknownGroup(_) | SolverError::GroupAlreadyFound(_)),
                ) => {
                    warn!(puzzle = self.puzzle.id(), %error, "skipping uncommittable verdict");
                    skipped += 1;
                    exhausted = 0;
                }
                Err(SolverError::GameOver) => continue,
            }
            retries = 0;
            if skipped > 0 && skipped >= self.config.skip_turn_ceiling {
                break GameResult::Malfunction(if exhausted == skipped {
                    Malfunction::ConsensusExhausted(exhausted)
                } else {
                    Malfunction::InvalidProposals(skipped)
                });
            }
        };
        self.finish(result)
    }

    async fn back_off(&self, retry: u32, error: &InferenceError) {
        let delay = self.config.backoff(retry);
        warn!(
            puzzle = self.puzzle.id(),
            retry,
            ?delay,
            %error,
            "generator failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }

    fn finish(self, result: GameResult) -> AttemptReport {
        match &result {
            GameResult::Malfunction(malfunction) => warn!(
                puzzle = self.puzzle.id(),
                strategy = %self.strategy,
                %malfunction,
                mistakes = self.state.mistakes(),
                "attempt malfunctioned"
            ),
            _ => info!(
                puzzle = self.puzzle.id(),
                strategy = %self.strategy,
                result = ?result,
                groups = self.state.found_groups().len(),
                mistakes = self.state.mistakes(),
                "attempt finished"
            ),
        }
        AttemptReport {
            puzzle_id: self.puzzle.id(),
            result,
            mistakes: self.state.mistakes(),
            found_groups: self.state.found_groups().to_vec(),
            guesses: self.state.history().to_vec(),
            usage: self.proposer.usage(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_round_trip() {
        for strategy in Strategy::all() {
            assert_eq!(strategy.name().parse::<Strategy>(), Ok(strategy));
            assert_eq!(strategy.to_string(), strategy.name());
        }
        assert_eq!("Snap-GVC".parse::<Strategy>(), Ok(Strategy::SnapGvc));
        assert_eq!(
            "tree-of-thought".parse::<Strategy>(),
            Err(UnknownStrategy("tree_of_thought".to_string()))
        );
    }

    #[test]
    fn only_gvc_strategies_vote() {
        let voting: Vec<Strategy> = Strategy::all()
            .into_iter()
            .filter(Strategy::uses_consensus)
            .collect();

        assert_eq!(voting, vec![Strategy::Gvc, Strategy::SnapGvc]);
    }

    #[test]
    fn backoff_doubles_with_bounded_jitter() {
        let config = SolverConfig {
            retry_backoff: Duration::from_millis(100),
            ..SolverConfig::default()
        };

        for (retry, base) in [(1, 100), (2, 200), (3, 400)] {
            let delay = config.backoff(retry);
            assert!(delay >= Duration::from_millis(base), "{:?}", delay);
            assert!(delay <= Duration::from_millis(base + base / 2), "{:?}", delay);
        }
        let instant = SolverConfig {
            retry_backoff: Duration::ZERO,
            ..SolverConfig::default()
        };
        assert_eq!(instant.backoff(3), Duration::ZERO);
    }

    #[test]
    fn backoff_saturates() {
        let config = SolverConfig {
            retry_backoff: Duration::MAX,
            ..SolverConfig::default()
        };

        assert_eq!(config.backoff(1), Duration::MAX);
        assert_eq!(config.backoff(40), Duration::MAX);
    }
}
