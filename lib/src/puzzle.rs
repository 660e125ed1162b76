use crate::results::PuzzleError;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
#[cfg(feature = "serde")]
use std::io::Read;
use std::ops::Deref;
use std::sync::Arc;

/// The number of words in each hidden group.
pub const GROUP_SIZE: usize = 4;

/// The number of hidden groups in a puzzle.
pub const NUM_GROUPS: usize = 4;

/// An ordered set of words. Ordering keeps prompts, logs, and tie-breaks reproducible.
pub type WordSet = BTreeSet<Arc<str>>;

/// Normalizes a word for comparison: commas are dropped, surrounding whitespace is trimmed, and
/// letters are upper-cased.
///
/// ```
/// use connections_solver::normalize_word;
///
/// assert_eq!(normalize_word("  ice cube, "), "ICE CUBE");
/// ```
pub fn normalize_word(word: &str) -> String {
    word.replace(',', "").trim().to_uppercase()
}

/// Counts the words that two sets have in common.
pub fn overlap(first: &WordSet, second: &WordSet) -> usize {
    first.intersection(second).count()
}

/// One hidden group of a puzzle, along with its category label and difficulty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    label: Arc<str>,
    difficulty: u8,
    words: WordSet,
}

impl Category {
    /// Constructs a category. The difficulty must be between 1 (easiest) and 4 (hardest), and
    /// there must be exactly [`GROUP_SIZE`] distinct words.
    ///
    /// ```
    /// use connections_solver::Category;
    ///
    /// let category = Category::new("WET WEATHER", 1, ["hail", "rain", "sleet", "snow"]).unwrap();
    /// assert!(category.contains("RAIN"));
    /// ```
    pub fn new<S>(
        label: &str,
        difficulty: u8,
        words: impl IntoIterator<Item = S>,
    ) -> Result<Category, PuzzleError>
    where
        S: AsRef<str>,
    {
        let label = label.trim();
        if !(1..=NUM_GROUPS as u8).contains(&difficulty) {
            return Err(PuzzleError::Difficulty {
                label: label.to_string(),
                difficulty,
            });
        }
        let mut word_set = WordSet::new();
        let mut size = 0;
        for word in words {
            let word = normalize_word(word.as_ref());
            size += 1;
            if !word_set.insert(Arc::from(word.as_str())) {
                return Err(PuzzleError::DuplicateWord(word));
            }
        }
        if size != GROUP_SIZE {
            return Err(PuzzleError::GroupSize {
                label: label.to_string(),
                size,
            });
        }
        Ok(Category {
            label: Arc::from(label),
            difficulty,
            words: word_set,
        })
    }

    pub fn label(&self) -> &Arc<str> {
        &self.label
    }

    /// 1 is the easiest group, 4 the hardest.
    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    pub fn words(&self) -> &WordSet {
        &self.words
    }

    /// Returns `true` iff the (normalized) word belongs to this group.
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(normalize_word(word).as_str())
    }
}

/// The ground truth for a single game: 16 words partitioned into 4 labelled groups.
///
/// Puzzles are immutable once constructed, and construction enforces the partition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "RawPuzzle", into = "RawPuzzle")
)]
pub struct Puzzle {
    id: u32,
    groups: Vec<Category>,
    words: WordSet,
}

impl Puzzle {
    /// Constructs a puzzle from its hidden groups.
    ///
    /// Returns an error unless there are exactly [`NUM_GROUPS`] groups and no word appears in
    /// more than one of them.
    pub fn new(id: u32, groups: Vec<Category>) -> Result<Puzzle, PuzzleError> {
        if groups.len() != NUM_GROUPS {
            return Err(PuzzleError::GroupCount(groups.len()));
        }
        let mut words = WordSet::new();
        for group in &groups {
            for word in group.words() {
                if !words.insert(Arc::clone(word)) {
                    return Err(PuzzleError::DuplicateWord(word.to_string()));
                }
            }
        }
        Ok(Puzzle { id, groups, words })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// All words on the board.
    pub fn words(&self) -> &WordSet {
        &self.words
    }

    /// The hidden groups, in the order the puzzle source listed them.
    pub fn groups(&self) -> &[Category] {
        &self.groups
    }

    pub fn group(&self, index: usize) -> Option<&Category> {
        self.groups.get(index)
    }
}

/// The public NYT Connections answers schema: one game with its `answers`, each carrying a
/// zero-based `level`.
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct RawPuzzle {
    id: u32,
    answers: Vec<RawCategory>,
}

#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct RawCategory {
    level: u8,
    group: String,
    members: Vec<String>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawPuzzle> for Puzzle {
    type Error = PuzzleError;

    fn try_from(raw: RawPuzzle) -> Result<Puzzle, PuzzleError> {
        let groups = raw
            .answers
            .iter()
            .map(|answer| {
                Category::new(
                    &answer.group,
                    answer.level.saturating_add(1),
                    &answer.members,
                )
            })
            .collect::<Result<Vec<Category>, PuzzleError>>()?;
        Puzzle::new(raw.id, groups)
    }
}

#[cfg(feature = "serde")]
impl From<Puzzle> for RawPuzzle {
    fn from(puzzle: Puzzle) -> RawPuzzle {
        RawPuzzle {
            id: puzzle.id,
            answers: puzzle
                .groups
                .iter()
                .map(|group| RawCategory {
                    level: group.difficulty - 1,
                    group: group.label.to_string(),
                    members: group.words.iter().map(|word| word.to_string()).collect(),
                })
                .collect(),
        }
    }
}

/// An indexable collection of puzzles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PuzzleBank {
    puzzles: Vec<Puzzle>,
}

impl PuzzleBank {
    /// Constructs a new `PuzzleBank` from the given puzzles, keeping their order.
    pub fn from_iterator(puzzles: impl IntoIterator<Item = Puzzle>) -> PuzzleBank {
        PuzzleBank {
            puzzles: puzzles.into_iter().collect(),
        }
    }

    /// Reads a JSON array of games in the NYT Connections answers format:
    ///
    /// ```json
    /// [{"id": 1, "date": "2023-06-12", "answers": [
    ///     {"level": 0, "group": "WET WEATHER", "members": ["HAIL", "RAIN", "SLEET", "SNOW"]},
    ///     ...
    /// ]}]
    /// ```
    ///
    /// Levels run from 0 to 3 and become difficulties 1 to 4. Unknown fields are ignored.
    #[cfg(feature = "serde")]
    pub fn from_reader<R: Read>(reader: R) -> Result<PuzzleBank, PuzzleError> {
        let puzzles: Vec<Puzzle> = serde_json::from_reader(reader)?;
        Ok(PuzzleBank { puzzles })
    }

    /// Returns the puzzles in `start..end`, clamped to the bank's bounds. Missing bounds default
    /// to the start or end of the bank.
    pub fn range(&self, start: Option<usize>, end: Option<usize>) -> &[Puzzle] {
        let end = end.unwrap_or(self.puzzles.len()).min(self.puzzles.len());
        let start = start.unwrap_or(0).min(end);
        &self.puzzles[start..end]
    }
}

impl Deref for PuzzleBank {
    type Target = [Puzzle];

    fn deref(&self) -> &Self::Target {
        &self.puzzles
    }
}
