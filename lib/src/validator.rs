use crate::puzzle::{overlap, Puzzle, WordSet, GROUP_SIZE};
use crate::results::{InvalidGuess, Verdict};
use std::sync::Arc;

/// Determines the verdict for guessing `guess` against the given puzzle, when only
/// `remaining_words` are still on the board.
///
/// The check is set-based: the order of the words doesn't matter, and neither does the label the
/// solver had in mind.
///
/// ```
/// use connections_solver::*;
///
/// let puzzle = Puzzle::new(1, vec![
///     Category::new("WET WEATHER", 1, ["HAIL", "RAIN", "SLEET", "SNOW"]).unwrap(),
///     Category::new("NBA TEAMS", 2, ["BUCKS", "HEAT", "JAZZ", "NETS"]).unwrap(),
///     Category::new("KEYBOARD KEYS", 3, ["OPTION", "RETURN", "SHIFT", "TAB"]).unwrap(),
///     Category::new("PALINDROMES", 4, ["KAYAK", "LEVEL", "MOM", "RACECAR"]).unwrap(),
/// ]).unwrap();
/// let guess = Candidate::new(["snow", "heat", "hail", "rain"], "weather");
///
/// assert_eq!(check_guess(&puzzle, puzzle.words(), &guess.words), Verdict::PartialOverlap(3));
/// ```
pub fn check_guess(puzzle: &Puzzle, remaining_words: &WordSet, guess: &WordSet) -> Verdict {
    if guess.len() != GROUP_SIZE {
        return Verdict::Invalid(InvalidGuess::WrongSize {
            expected: GROUP_SIZE,
            actual: guess.len(),
        });
    }
    if let Some(word) = guess
        .iter()
        .find(|word| !remaining_words.contains(*word) || !puzzle.words().contains(*word))
    {
        return Verdict::Invalid(InvalidGuess::NotRemaining(Arc::clone(word)));
    }
    // Four board words spread over four groups always share at least one word with some group.
    let mut best_overlap = 0;
    for (index, group) in puzzle.groups().iter().enumerate() {
        let shared = overlap(group.words(), guess);
        if shared == GROUP_SIZE {
            return Verdict::Exact(index);
        }
        best_overlap = best_overlap.max(shared);
    }
    Verdict::PartialOverlap(best_overlap as u8)
}
