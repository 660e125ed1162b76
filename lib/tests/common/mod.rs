#![allow(dead_code)]

use connections_solver::*;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// The puzzle used throughout: A to P, split into four groups in alphabetical order.
pub fn lettered_puzzle() -> Puzzle {
    numbered_puzzle(1, "")
}

/// A puzzle whose words are the letters A to P followed by `suffix`.
pub fn numbered_puzzle(id: u32, suffix: &str) -> Puzzle {
    let letters = [
        ["A", "B", "C", "D"],
        ["E", "F", "G", "H"],
        ["I", "J", "K", "L"],
        ["M", "N", "O", "P"],
    ];
    let groups = letters
        .iter()
        .enumerate()
        .map(|(index, words)| {
            Category::new(
                &format!("GROUP {}", index + 1),
                index as u8 + 1,
                words.iter().map(|word| format!("{word}{suffix}")),
            )
            .unwrap()
        })
        .collect();
    Puzzle::new(id, groups).unwrap()
}

/// A reply that names the given words, e.g. `reply("ABCD")`.
pub fn reply(letters: &str) -> String {
    let words: Vec<String> = letters.chars().map(String::from).collect();
    format!("Group: {}\nCategory: letters", words.join(", "))
}

pub fn candidate(letters: &str) -> Candidate {
    Candidate::new(letters.chars().map(String::from), "letters")
}

/// Tokens that [`ScriptedGenerator`] reports for every reply.
pub const SCRIPTED_USAGE: TokenUsage = TokenUsage {
    prompt_tokens: 10,
    completion_tokens: 2,
};

/// Plays back canned replies in order, then repeats a fallback once they run out.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, InferenceError>>>,
    fallback: Result<String, InferenceError>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub fn new(replies: impl IntoIterator<Item = Result<String, InferenceError>>) -> Self {
        ScriptedGenerator {
            replies: Mutex::new(replies.into_iter().collect()),
            fallback: Ok(String::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Replies with groups of letters, as in [`reply`].
    pub fn groups(letters: &[&str]) -> Self {
        Self::new(letters.iter().map(|letters| Ok(reply(letters))))
    }

    pub fn with_fallback(mut self, fallback: Result<String, InferenceError>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &Prompt,
        _sampling: &SamplingConfig,
    ) -> Result<Completion, InferenceError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let text = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())?;
        Ok(Completion {
            text,
            usage: SCRIPTED_USAGE,
        })
    }
}

/// Answers with a correct group for whichever of the known puzzles is on the board.
pub struct OracleGenerator {
    pub puzzles: Vec<Puzzle>,
}

impl TextGenerator for OracleGenerator {
    async fn generate(
        &self,
        prompt: &Prompt,
        _sampling: &SamplingConfig,
    ) -> Result<Completion, InferenceError> {
        let offered: Vec<String> = prompt
            .user
            .lines()
            .find(|line| line.to_lowercase().contains("words: "))
            .and_then(|line| line.rsplit_once(": "))
            .map(|(_, words)| words.split(", ").map(str::to_string).collect())
            .unwrap_or_default();
        self.puzzles
            .iter()
            .flat_map(|puzzle| puzzle.groups())
            .find(|group| {
                group
                    .words()
                    .iter()
                    .all(|word| offered.iter().any(|offered| offered == word.as_ref()))
            })
            .map(|group| {
                let words: Vec<&str> = group.words().iter().map(|word| word.as_ref()).collect();
                Completion::from(format!(
                    "Group: {}\nCategory: {}",
                    words.join(", "),
                    group.label()
                ))
            })
            .ok_or(InferenceError::MalformedResponse("no group on the board".to_string()))
    }
}

/// Never answers.
pub struct SilentGenerator;

impl TextGenerator for SilentGenerator {
    async fn generate(
        &self,
        _prompt: &Prompt,
        _sampling: &SamplingConfig,
    ) -> Result<Completion, InferenceError> {
        tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        Ok(Completion::default())
    }
}
