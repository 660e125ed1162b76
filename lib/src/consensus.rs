use crate::game::{Candidate, GameState};
use crate::proposer::{Proposer, TextGenerator};
use crate::results::{ProposalError, SolverError};
use futures::future::join_all;
#[cfg(feature = "serde")]
use serde::Deserialize;
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::debug;

/// Settings for multi-sample voting.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default))]
pub struct ConsensusConfig {
    /// How many candidates to draw per round.
    pub samples: usize,
    /// Votes needed to emit a candidate without resampling. Defaults to a strict majority of
    /// `samples`.
    pub threshold: Option<usize>,
    /// Extra rounds to draw when no candidate reaches the threshold.
    pub max_resamples: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            samples: 3,
            threshold: None,
            max_resamples: 1,
        }
    }
}

impl ConsensusConfig {
    /// The number of samples drawn per round, at least one.
    pub fn samples_per_round(&self) -> usize {
        self.samples.max(1)
    }

    /// The number of matching votes that settles a round.
    pub fn agreement_threshold(&self) -> usize {
        let samples = self.samples_per_round();
        self.threshold
            .unwrap_or(samples / 2 + 1)
            .clamp(1, samples)
    }
}

/// Settings for the single-sample fast path of Snap GVC.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default))]
pub struct SnapConfig {
    /// Samples to draw on the fast path. With more than one, they must all agree.
    pub reduced_samples: usize,
    /// The most words a fast-path candidate may share with any earlier wrong guess.
    pub max_failed_overlap: usize,
}

impl Default for SnapConfig {
    fn default() -> Self {
        SnapConfig {
            reduced_samples: 1,
            max_failed_overlap: 2,
        }
    }
}

/// The vote count for the winning candidate of a set of samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub candidate: Candidate,
    pub votes: usize,
    /// Over the candidate's words, the total number of samples that contained each word.
    pub word_support: usize,
    /// How many samples were tallied.
    pub valid_samples: usize,
}

/// Picks the candidate that the most samples agree on.
///
/// Samples are grouped by their exact set of words, ignoring labels. Ties go to the candidate
/// whose words appear most often across all samples, then to whichever was sampled first. The
/// label of the first matching sample is kept.
///
/// Returns `None` iff there are no samples.
pub fn tally(samples: &[Candidate]) -> Option<Tally> {
    let mut word_counts: HashMap<&str, usize> = HashMap::new();
    for sample in samples {
        for word in &sample.words {
            *word_counts.entry(word.as_ref()).or_default() += 1;
        }
    }
    // (first index, votes), in order of first appearance.
    let mut distinct: Vec<(usize, usize)> = Vec::new();
    for (index, sample) in samples.iter().enumerate() {
        match distinct
            .iter_mut()
            .find(|(first, _)| samples[*first].words == sample.words)
        {
            Some((_, votes)) => *votes += 1,
            None => distinct.push((index, 1)),
        }
    }
    distinct
        .into_iter()
        .map(|(first, votes)| {
            let word_support = samples[first]
                .words
                .iter()
                .map(|word| word_counts.get(word.as_ref()).copied().unwrap_or(0))
                .sum();
            (first, votes, word_support)
        })
        .max_by_key(|&(first, votes, word_support)| (votes, word_support, Reverse(first)))
        .map(|(first, votes, word_support)| Tally {
            candidate: samples[first].clone(),
            votes,
            word_support,
            valid_samples: samples.len(),
        })
}

/// The candidate a consensus round settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub candidate: Candidate,
    pub votes: usize,
    /// `false` if no round reached the agreement threshold and the best tally over every sample
    /// was used instead.
    pub agreed: bool,
    /// `true` if the Snap fast path skipped full consensus.
    pub short_circuit: bool,
}

/// Turns several independent proposals into one candidate.
pub struct ConsensusEngine<'p, 'a, G> {
    proposer: &'p Proposer<'a, G>,
    config: &'p ConsensusConfig,
    snap: &'p SnapConfig,
}

impl<'p, 'a, G: TextGenerator> ConsensusEngine<'p, 'a, G> {
    pub fn new(
        proposer: &'p Proposer<'a, G>,
        config: &'p ConsensusConfig,
        snap: &'p SnapConfig,
    ) -> ConsensusEngine<'p, 'a, G> {
        ConsensusEngine {
            proposer,
            config,
            snap,
        }
    }

    /// Runs full consensus for the next guess.
    ///
    /// Each round draws samples concurrently and emits the round's winner if it reaches the
    /// agreement threshold. Once the resample budget is spent, the best tally over every valid
    /// sample drawn so far is emitted instead.
    ///
    /// Fails with [`SolverError::ConsensusExhausted`] if a round yields no valid samples and
    /// none were drawn before it, or with [`SolverError::Inference`] if every sample in such a
    /// round failed to reach the generator at all.
    pub async fn decide(&self, state: &GameState) -> Result<Decision, SolverError> {
        self.decide_with_pool(state, Vec::new()).await
    }

    /// Runs Snap GVC for the next guess: a cheap single-sample pass when the game looks safe,
    /// and full consensus otherwise.
    ///
    /// The game looks safe when no mistakes have been made, or when the sample is disjoint from
    /// every found group and shares at most [`SnapConfig::max_failed_overlap`] words with each
    /// wrong guess so far.
    pub async fn decide_snap(&self, state: &GameState) -> Result<Decision, SolverError> {
        let first = match self.proposer.propose(state).await {
            Ok(candidate) => candidate,
            Err(ProposalError::Inference(error)) if !error.is_timeout() => {
                return Err(error.into())
            }
            Err(error) => {
                debug!(%error, "snap sample was malformed, falling back to consensus");
                return self.decide(state).await;
            }
        };
        if !self.looks_safe(state, &first) {
            debug!(candidate = %first, "snap sample is risky, falling back to consensus");
            return self.decide_with_pool(state, vec![first]).await;
        }
        let extra = self.snap.reduced_samples.saturating_sub(1);
        if extra == 0 {
            return Ok(Decision {
                candidate: first,
                votes: 1,
                agreed: true,
                short_circuit: true,
            });
        }
        let mut pool = vec![first];
        let mut unanimous = true;
        for outcome in self.sample(state, extra).await {
            match outcome {
                Ok(candidate) => {
                    unanimous &= candidate.words == pool[0].words;
                    pool.push(candidate);
                }
                Err(_) => unanimous = false,
            }
        }
        if unanimous {
            let votes = pool.len();
            return Ok(Decision {
                candidate: pool.swap_remove(0),
                votes,
                agreed: true,
                short_circuit: true,
            });
        }
        debug!(samples = pool.len(), "snap samples disagree, falling back to consensus");
        self.decide_with_pool(state, pool).await
    }

    fn looks_safe(&self, state: &GameState, candidate: &Candidate) -> bool {
        if state.mistakes() == 0 {
            return true;
        }
        state.max_overlap_with_found(&candidate.words) == 0
            && state.failed_guesses().all(|record| {
                crate::puzzle::overlap(&record.words, &candidate.words)
                    <= self.snap.max_failed_overlap
            })
    }

    async fn sample(
        &self,
        state: &GameState,
        count: usize,
    ) -> Vec<Result<Candidate, ProposalError>> {
        join_all((0..count).map(|_| self.proposer.propose(state))).await
    }

    async fn decide_with_pool(
        &self,
        state: &GameState,
        mut pool: Vec<Candidate>,
    ) -> Result<Decision, SolverError> {
        let samples = self.config.samples_per_round();
        let threshold = self.config.agreement_threshold();
        for round in 0..=self.config.max_resamples {
            let mut valid = Vec::with_capacity(samples);
            let mut failures = Vec::new();
            for outcome in self.sample(state, samples).await {
                match outcome {
                    Ok(candidate) => valid.push(candidate),
                    Err(error) => failures.push(error),
                }
            }
            debug!(
                round,
                valid = valid.len(),
                malformed = failures.len(),
                "drew consensus samples"
            );
            let Some(winner) = tally(&valid) else {
                if pool.is_empty() {
                    return Err(exhausted(samples, failures));
                }
                break;
            };
            debug!(
                round,
                candidate = %winner.candidate,
                votes = winner.votes,
                word_support = winner.word_support,
                "tallied round"
            );
            if winner.votes >= threshold {
                return Ok(Decision {
                    candidate: winner.candidate,
                    votes: winner.votes,
                    agreed: true,
                    short_circuit: false,
                });
            }
            pool.extend(valid);
        }
        let Some(best) = tally(&pool) else {
            return Err(SolverError::ConsensusExhausted { samples });
        };
        debug!(
            candidate = %best.candidate,
            votes = best.votes,
            pooled = best.valid_samples,
            "no agreement, using best pooled tally"
        );
        Ok(Decision {
            candidate: best.candidate,
            votes: best.votes,
            agreed: false,
            short_circuit: false,
        })
    }
}

/// The error for a round without a single valid sample.
fn exhausted(samples: usize, failures: Vec<ProposalError>) -> SolverError {
    let unreachable = !failures.is_empty() && failures.iter().all(|error| !error.is_malformed());
    match failures.into_iter().next() {
        Some(ProposalError::Inference(error)) if unreachable => SolverError::Inference(error),
        _ => SolverError::ConsensusExhausted { samples },
    }
}
