use crate::proposer::{TextGenerator, UsageMeter};
use crate::puzzle::{Puzzle, NUM_GROUPS};
use crate::results::{AttemptReport, GameResult, InferenceUsage};
use crate::solver::Solver;
use futures::stream::{self, StreamExt};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Settings for running a solver over many puzzles.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default))]
pub struct EvaluatorConfig {
    /// How many attempts may run at once.
    pub concurrency: usize,
    /// Attempts that run longer than this are cancelled.
    pub attempt_budget: Option<Duration>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        EvaluatorConfig {
            concurrency: 4,
            attempt_budget: None,
        }
    }
}

/// Runs one attempt per puzzle with bounded concurrency.
///
/// Every attempt gets its own game state; reports come back in puzzle order.
pub struct Evaluator<'a, G> {
    solver: &'a Solver<G>,
    config: EvaluatorConfig,
}

impl<'a, G: TextGenerator> Evaluator<'a, G> {
    pub fn new(solver: &'a Solver<G>, config: EvaluatorConfig) -> Evaluator<'a, G> {
        Evaluator { solver, config }
    }

    pub async fn run(&self, puzzles: &[Puzzle]) -> Vec<AttemptReport> {
        info!(
            puzzles = puzzles.len(),
            strategy = %self.solver.strategy(),
            concurrency = self.config.concurrency,
            "starting evaluation"
        );
        stream::iter(puzzles)
            .map(|puzzle| self.attempt(puzzle))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    async fn attempt(&self, puzzle: &Puzzle) -> AttemptReport {
        let Some(budget) = self.config.attempt_budget else {
            return self.solver.solve(puzzle).await;
        };
        let meter = Arc::new(UsageMeter::default());
        let attempt = self.solver.start_metered(puzzle, Arc::clone(&meter)).run();
        match tokio::time::timeout(budget, attempt).await {
            Ok(report) => report,
            Err(_) => {
                let usage = meter.snapshot();
                warn!(
                    puzzle = puzzle.id(),
                    ?budget,
                    calls = usage.generator_calls,
                    "attempt ran out of time"
                );
                AttemptReport::cancelled(puzzle.id(), usage)
            }
        }
    }
}

/// Aggregate results over a set of attempts.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EvaluationSummary {
    pub attempts: u32,
    pub solved: u32,
    /// Attempts that ran out of mistakes.
    pub lost: u32,
    /// Attempts that ended in a malfunction, keyed by [`Malfunction::kind`](crate::Malfunction::kind).
    pub malfunctions: BTreeMap<&'static str, u32>,
    pub total_mistakes: u32,
    /// Found groups by difficulty, easiest first.
    pub groups_by_difficulty: [u32; NUM_GROUPS],
    pub average_groups_found: f64,
    pub std_dev_groups_found: f64,
    /// The sum of [`AttemptReport::points`] over every attempt.
    pub points: u32,
    /// Generator usage summed over every attempt, cancelled ones included.
    pub usage: InferenceUsage,
}

impl EvaluationSummary {
    pub fn from_reports(reports: &[AttemptReport]) -> EvaluationSummary {
        let mut summary = EvaluationSummary {
            attempts: reports.len() as u32,
            ..EvaluationSummary::default()
        };
        for report in reports {
            match &report.result {
                GameResult::Solved => summary.solved += 1,
                GameResult::OutOfMistakes => summary.lost += 1,
                GameResult::Malfunction(malfunction) => {
                    *summary.malfunctions.entry(malfunction.kind()).or_default() += 1
                }
            }
            summary.total_mistakes += report.mistakes;
            summary.points += report.points();
            summary.usage += report.usage;
            for difficulty in report.solve_order() {
                if let Some(count) = summary
                    .groups_by_difficulty
                    .get_mut(usize::from(difficulty).wrapping_sub(1))
                {
                    *count += 1;
                }
            }
        }
        if !reports.is_empty() {
            let count = reports.len() as f64;
            let average = reports
                .iter()
                .map(|report| report.found_groups.len() as f64)
                .sum::<f64>()
                / count;
            summary.average_groups_found = average;
            summary.std_dev_groups_found = (reports
                .iter()
                .map(|report| (report.found_groups.len() as f64 - average).powi(2))
                .sum::<f64>()
                / count)
                .sqrt();
        }
        summary
    }

    pub fn malfunctioned(&self) -> u32 {
        self.malfunctions.values().sum()
    }

    /// Hallucinated words per attempt, or 0 if there were none.
    pub fn average_hallucinated_words(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.usage.hallucinated_words as f64 / self.attempts as f64
    }

    /// The fraction of attempts that were solved, or 0 if there were none.
    pub fn solve_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.solved as f64 / self.attempts as f64
    }
}
