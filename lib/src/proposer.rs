use crate::game::{Candidate, GameState};
use crate::parse::parse_reply;
use crate::prompt::{Prompt, PromptStyle};
use crate::results::{InferenceError, InferenceUsage, ParseError, ProposalError};
#[cfg(feature = "serde")]
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

/// Per-call sampling settings for the text generator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default))]
pub struct SamplingConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Calls that take longer than this fail with [`InferenceError::Timeout`].
    pub timeout: Duration,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            temperature: 0.7,
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Token counts for one generator call, as reported by the generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A generator's answer to one prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

impl From<String> for Completion {
    fn from(text: String) -> Completion {
        Completion {
            text,
            usage: TokenUsage::default(),
        }
    }
}

impl From<&str> for Completion {
    fn from(text: &str) -> Completion {
        Completion::from(text.to_string())
    }
}

/// A language model, or anything else that can answer a prompt with text.
///
/// Each call must be an independent draw: no state may carry over between calls.
#[allow(async_fn_in_trait)]
pub trait TextGenerator {
    async fn generate(
        &self,
        prompt: &Prompt,
        sampling: &SamplingConfig,
    ) -> Result<Completion, InferenceError>;

    /// Like [`generate`](TextGenerator::generate), but fails with [`InferenceError::Timeout`]
    /// once the call itself runs longer than [`SamplingConfig::timeout`].
    ///
    /// Wrappers that queue calls should only start the clock once the call is under way.
    async fn generate_timed(
        &self,
        prompt: &Prompt,
        sampling: &SamplingConfig,
    ) -> Result<Completion, InferenceError> {
        tokio::time::timeout(sampling.timeout, self.generate(prompt, sampling))
            .await
            .map_err(|_| InferenceError::Timeout(sampling.timeout))?
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for &T {
    async fn generate(
        &self,
        prompt: &Prompt,
        sampling: &SamplingConfig,
    ) -> Result<Completion, InferenceError> {
        (**self).generate(prompt, sampling).await
    }

    async fn generate_timed(
        &self,
        prompt: &Prompt,
        sampling: &SamplingConfig,
    ) -> Result<Completion, InferenceError> {
        (**self).generate_timed(prompt, sampling).await
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn generate(
        &self,
        prompt: &Prompt,
        sampling: &SamplingConfig,
    ) -> Result<Completion, InferenceError> {
        (**self).generate(prompt, sampling).await
    }

    async fn generate_timed(
        &self,
        prompt: &Prompt,
        sampling: &SamplingConfig,
    ) -> Result<Completion, InferenceError> {
        (**self).generate_timed(prompt, sampling).await
    }
}

/// Bounds the number of calls in flight to the wrapped generator, across every attempt that
/// shares it.
///
/// Waiting for a free slot doesn't count towards a call's timeout.
pub struct RateLimited<G> {
    inner: G,
    permits: Semaphore,
}

impl<G> RateLimited<G> {
    /// Allows at most `max_in_flight` concurrent calls (and at least one).
    pub fn new(inner: G, max_in_flight: usize) -> RateLimited<G> {
        RateLimited {
            inner,
            permits: Semaphore::new(max_in_flight.max(1)),
        }
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, InferenceError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| InferenceError::Transport("rate limiter closed".to_string()))
    }
}

impl<G: TextGenerator> TextGenerator for RateLimited<G> {
    async fn generate(
        &self,
        prompt: &Prompt,
        sampling: &SamplingConfig,
    ) -> Result<Completion, InferenceError> {
        let _permit = self.acquire().await?;
        self.inner.generate(prompt, sampling).await
    }

    async fn generate_timed(
        &self,
        prompt: &Prompt,
        sampling: &SamplingConfig,
    ) -> Result<Completion, InferenceError> {
        let _permit = self.acquire().await?;
        self.inner.generate_timed(prompt, sampling).await
    }
}

/// Running totals for one attempt's generator usage.
///
/// Shared through an `Arc`, so the totals survive an attempt that is dropped part way through.
#[derive(Debug, Default)]
pub struct UsageMeter {
    calls: AtomicU32,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    hallucinated_words: AtomicU32,
}

impl UsageMeter {
    pub fn snapshot(&self) -> InferenceUsage {
        InferenceUsage {
            generator_calls: self.calls.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            hallucinated_words: self.hallucinated_words.load(Ordering::Relaxed),
        }
    }

    fn record_tokens(&self, usage: TokenUsage) {
        self.prompt_tokens
            .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
    }
}

/// Turns one generator call into one candidate grouping.
///
/// The proposer never retries; callers decide what to do with failures. It meters its calls,
/// tokens, and hallucinated words so attempts can report their inference cost.
pub struct Proposer<'a, G> {
    generator: &'a G,
    style: PromptStyle,
    sampling: &'a SamplingConfig,
    shuffle_seed: u64,
    meter: Arc<UsageMeter>,
}

impl<'a, G: TextGenerator> Proposer<'a, G> {
    pub fn new(
        generator: &'a G,
        style: PromptStyle,
        sampling: &'a SamplingConfig,
        shuffle_seed: u64,
    ) -> Proposer<'a, G> {
        Proposer::with_meter(
            generator,
            style,
            sampling,
            shuffle_seed,
            Arc::new(UsageMeter::default()),
        )
    }

    /// Constructs a proposer that adds its usage to the given meter.
    pub fn with_meter(
        generator: &'a G,
        style: PromptStyle,
        sampling: &'a SamplingConfig,
        shuffle_seed: u64,
        meter: Arc<UsageMeter>,
    ) -> Proposer<'a, G> {
        Proposer {
            generator,
            style,
            sampling,
            shuffle_seed,
            meter,
        }
    }

    pub fn style(&self) -> PromptStyle {
        self.style
    }

    /// The number of generator calls made so far.
    pub fn calls(&self) -> u32 {
        self.meter.calls.load(Ordering::Relaxed)
    }

    pub fn usage(&self) -> InferenceUsage {
        self.meter.snapshot()
    }

    /// Asks the generator for the next group once and parses its reply.
    pub async fn propose(&self, state: &GameState) -> Result<Candidate, ProposalError> {
        let prompt = self.style.build(state, self.shuffle_seed);
        self.meter.calls.fetch_add(1, Ordering::Relaxed);
        let completion = self.generator.generate_timed(&prompt, self.sampling).await?;
        self.meter.record_tokens(completion.usage);
        debug!(style = ?self.style, reply = %completion.text, "generator replied");
        let parsed = parse_reply(&completion.text, state);
        if let Err(ParseError::UnknownWords(words)) = &parsed {
            self.meter
                .hallucinated_words
                .fetch_add(words.len() as u32, Ordering::Relaxed);
        }
        Ok(parsed?)
    }
}
