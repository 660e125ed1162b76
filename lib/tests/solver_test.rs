#[macro_use]
extern crate assert_matches;

mod common;

use common::*;
use connections_solver::*;

fn solver<G: TextGenerator>(generator: G, strategy: Strategy) -> Solver<G> {
    Solver::new(generator, strategy, SolverConfig::default())
}

#[tokio::test]
async fn exact_guess_moves_group_out_of_play() {
    let puzzle = lettered_puzzle();
    let solver = solver(ScriptedGenerator::groups(&["ABCD"]), Strategy::Naive);
    let mut attempt = solver.start(&puzzle);

    assert_eq!(attempt.propose_and_commit().await, Ok(Verdict::Exact(0)));

    let state = attempt.state();
    assert_eq!(state.remaining_words().len(), 12);
    assert_eq!(state.mistakes(), 0);
    assert_eq!(state.found_groups()[0].words, candidate("ABCD").words);
}

#[tokio::test]
async fn one_away_guess_costs_a_mistake() {
    let puzzle = lettered_puzzle();
    let solver = solver(ScriptedGenerator::groups(&["ABCE"]), Strategy::Basic);
    let mut attempt = solver.start(&puzzle);

    assert_eq!(
        attempt.propose_and_commit().await,
        Ok(Verdict::PartialOverlap(3))
    );

    let state = attempt.state();
    assert_eq!(state.remaining_words().len(), 16);
    assert_eq!(state.mistakes(), 1);
    assert!(state.history()[0].verdict.is_one_away());
}

#[tokio::test]
async fn fourth_mistake_ends_attempt() {
    let puzzle = lettered_puzzle();
    let solver = solver(
        ScriptedGenerator::groups(&["ABCE", "ABCF", "ABCG", "ABEF", "ABCD"]),
        Strategy::ChainOfThought,
    );

    let report = solver.solve(&puzzle).await;

    assert_eq!(report.result, GameResult::OutOfMistakes);
    assert_eq!(report.mistakes, 4);
    assert_eq!(report.guesses.len(), 4);
    assert_eq!(report.usage.generator_calls, 4);
    assert_eq!(report.points(), 0);
    assert!(!report.is_malfunction());
}

#[tokio::test]
async fn commit_after_loss_is_rejected() {
    let puzzle = lettered_puzzle();
    let config = SolverConfig {
        mistake_limit: 1,
        ..SolverConfig::default()
    };
    let solver = Solver::new(
        ScriptedGenerator::groups(&["ABCE", "ABCD"]),
        Strategy::Naive,
        config,
    );
    let mut attempt = solver.start(&puzzle);

    assert_eq!(
        attempt.propose_and_commit().await,
        Ok(Verdict::PartialOverlap(3))
    );
    assert_eq!(
        attempt.propose_and_commit().await,
        Err(SolverError::GameOver)
    );
    assert_eq!(attempt.generator_calls(), 1);
}

#[tokio::test]
async fn solves_whole_puzzle() {
    let puzzle = lettered_puzzle();
    let solver = solver(
        ScriptedGenerator::groups(&["MNOP", "ABCE", "ABCD", "EFGH", "IJKL"]),
        Strategy::Naive,
    );

    let report = solver.solve(&puzzle).await;

    assert_eq!(report.result, GameResult::Solved);
    assert_eq!(report.mistakes, 1);
    assert_eq!(report.solve_order(), vec![4, 1, 2, 3]);
    assert_eq!(report.points(), 19);
    assert_eq!(report.usage.generator_calls, 5);
    assert_eq!(
        report
            .guesses
            .iter()
            .map(|guess| guess.attempt)
            .collect::<Vec<u32>>(),
        vec![1, 2, 3, 4, 5]
    );
}

#[tokio::test]
async fn prompts_report_earlier_guesses() {
    let puzzle = lettered_puzzle();
    let generator = ScriptedGenerator::groups(&["ABCE", "ABCD"]);
    let solver = solver(&generator, Strategy::Naive);
    let mut attempt = solver.start(&puzzle);

    attempt.propose_and_commit().await.unwrap();
    attempt.propose_and_commit().await.unwrap();

    let prompts = generator.prompts();
    assert!(!prompts[0].user.contains("Previous guesses"));
    assert!(prompts[1]
        .user
        .contains("- A, B, C, E (letters): wrong, one away"));
    assert!(prompts[1].user.contains("Mistakes remaining: 3"));
}

#[tokio::test]
async fn consensus_commits_majority_candidate() {
    let puzzle = lettered_puzzle();
    let generator = ScriptedGenerator::groups(&["ABCD", "ABCD", "EFGH"]);
    let solver = solver(&generator, Strategy::Gvc);
    let mut attempt = solver.start(&puzzle);

    assert_eq!(attempt.propose_and_commit().await, Ok(Verdict::Exact(0)));

    assert_eq!(attempt.state().remaining_words().len(), 12);
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn consensus_with_only_malformed_samples_is_a_skipped_turn() {
    let puzzle = lettered_puzzle();
    let generator = ScriptedGenerator::new([
        Ok("I'm not sure.".to_string()),
        Ok("Group: A, B".to_string()),
        Ok(String::new()),
    ]);
    let solver = solver(&generator, Strategy::Gvc);
    let mut attempt = solver.start(&puzzle);
    let before = attempt.state().clone();

    assert_eq!(
        attempt.propose_and_commit().await,
        Err(SolverError::ConsensusExhausted { samples: 3 })
    );
    assert_eq!(attempt.state(), &before);
}

#[tokio::test]
async fn repeated_exhaustion_is_a_malfunction() {
    let puzzle = lettered_puzzle();
    let generator = ScriptedGenerator::new([]).with_fallback(Ok("no idea".to_string()));
    let solver = solver(&generator, Strategy::Gvc);

    let report = solver.solve(&puzzle).await;

    assert_matches!(
        report.failure_reason(),
        Some(Malfunction::ConsensusExhausted(3))
    );
    assert_eq!(report.mistakes, 0);
    assert!(report.guesses.is_empty());
    assert_eq!(report.usage.generator_calls, 9);
}

#[tokio::test]
async fn unusable_proposals_are_a_malfunction() {
    let puzzle = lettered_puzzle();
    let generator = ScriptedGenerator::new([Ok(reply("ABCE")), Ok(reply("ABCE"))])
        .with_fallback(Ok("Group: A, B, C, ZEBRA".to_string()));
    let solver = solver(&generator, Strategy::Naive);

    let report = solver.solve(&puzzle).await;

    // The repeated wrong guess is refused without costing a second mistake.
    assert_eq!(report.mistakes, 1);
    assert_matches!(
        report.failure_reason(),
        Some(Malfunction::InvalidProposals(3))
    );
    assert_eq!(report.usage.generator_calls, 4);
}

#[tokio::test]
async fn single_sample_consensus_plays_like_naive() {
    let puzzle = lettered_puzzle();
    let script = ["ABCE", "ABCD", "EFGH", "IJKL", "MNOP"];
    let config = SolverConfig {
        consensus: ConsensusConfig {
            samples: 1,
            ..ConsensusConfig::default()
        },
        ..SolverConfig::default()
    };
    let voting = Solver::new(ScriptedGenerator::groups(&script), Strategy::Gvc, config);
    let naive = solver(ScriptedGenerator::groups(&script), Strategy::Naive);

    let voted = voting.solve(&puzzle).await;
    let direct = naive.solve(&puzzle).await;

    assert_eq!(voted.result, GameResult::Solved);
    assert_eq!(voted.mistakes, 1);
    assert_eq!(voted.guesses, direct.guesses);
    assert_eq!(voted.found_groups, direct.found_groups);
    assert_eq!(voted.usage, direct.usage);
    assert_eq!(
        voted
            .guesses
            .iter()
            .map(|guess| (guess.words.clone(), guess.verdict.clone()))
            .collect::<Vec<_>>(),
        script
            .iter()
            .zip([
                Verdict::PartialOverlap(3),
                Verdict::Exact(0),
                Verdict::Exact(1),
                Verdict::Exact(2),
                Verdict::Exact(3),
            ])
            .map(|(letters, verdict)| (candidate(letters).words, verdict))
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn zero_skip_ceiling_still_plays_good_turns() {
    let puzzle = lettered_puzzle();
    let config = SolverConfig {
        skip_turn_ceiling: 0,
        ..SolverConfig::default()
    };
    let solver = Solver::new(
        ScriptedGenerator::groups(&["ABCD", "ABCE", "EFGH", "IJKL", "MNOP"]),
        Strategy::Naive,
        config,
    );

    let report = solver.solve(&puzzle).await;

    assert_eq!(report.result, GameResult::Solved);
    assert_eq!(report.mistakes, 1);
}

#[tokio::test]
async fn zero_skip_ceiling_stops_at_first_skip() {
    let puzzle = lettered_puzzle();
    let config = SolverConfig {
        skip_turn_ceiling: 0,
        ..SolverConfig::default()
    };
    let solver = Solver::new(
        ScriptedGenerator::groups(&["ABCD", "ABC"]),
        Strategy::Naive,
        config,
    );

    let report = solver.solve(&puzzle).await;

    assert_eq!(report.found_groups.len(), 1);
    assert_matches!(
        report.failure_reason(),
        Some(Malfunction::InvalidProposals(1))
    );
}

#[tokio::test]
async fn report_counts_tokens_and_unknown_words() {
    let puzzle = lettered_puzzle();
    let generator = ScriptedGenerator::new([
        Ok("Group: A, B, ZEBRA, YAK".to_string()),
        Ok(reply("ABCD")),
        Ok(reply("EFGH")),
        Ok(reply("IJKL")),
        Ok(reply("MNOP")),
    ]);
    let solver = solver(&generator, Strategy::Naive);

    let report = solver.solve(&puzzle).await;

    assert_eq!(report.result, GameResult::Solved);
    assert_eq!(
        report.usage,
        InferenceUsage {
            generator_calls: 5,
            prompt_tokens: 5 * u64::from(SCRIPTED_USAGE.prompt_tokens),
            completion_tokens: 5 * u64::from(SCRIPTED_USAGE.completion_tokens),
            hallucinated_words: 2,
        }
    );
}

#[tokio::test]
async fn snap_trusts_single_sample_before_any_mistake() {
    let puzzle = lettered_puzzle();
    let generator = ScriptedGenerator::groups(&["ABCE", "IJKL"]);
    let solver = solver(&generator, Strategy::SnapGvc);
    let mut attempt = solver.start(&puzzle);

    assert_eq!(
        attempt.propose_and_commit().await,
        Ok(Verdict::PartialOverlap(3))
    );
    // IJKL shares nothing with the wrong guess, so it is still trusted alone.
    assert_eq!(attempt.propose_and_commit().await, Ok(Verdict::Exact(2)));
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn snap_falls_back_to_consensus_near_a_wrong_guess() {
    let puzzle = lettered_puzzle();
    let generator = ScriptedGenerator::groups(&["ABCE", "ABCF", "ABCD", "ABCD", "ABCF"]);
    let solver = solver(&generator, Strategy::SnapGvc);
    let mut attempt = solver.start(&puzzle);

    attempt.propose_and_commit().await.unwrap();
    assert_eq!(attempt.propose_and_commit().await, Ok(Verdict::Exact(0)));

    assert_eq!(attempt.state().mistakes(), 1);
    assert_eq!(generator.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn inference_errors_are_retried() {
    let puzzle = lettered_puzzle();
    let generator = ScriptedGenerator::new([
        Err(InferenceError::Transport("connection reset".to_string())),
        Ok(reply("ABCD")),
        Err(InferenceError::Status {
            status: 503,
            body: String::new(),
        }),
        Err(InferenceError::Quota),
        Ok(reply("EFGH")),
        Ok(reply("IJKL")),
        Ok(reply("MNOP")),
    ]);
    let solver = solver(&generator, Strategy::Naive);

    let report = solver.solve(&puzzle).await;

    assert_eq!(report.result, GameResult::Solved);
    assert_eq!(report.mistakes, 0);
    assert_eq!(report.usage.generator_calls, 7);
}

#[tokio::test(start_paused = true)]
async fn persistent_inference_errors_are_a_malfunction() {
    let puzzle = lettered_puzzle();
    let generator = ScriptedGenerator::new([Ok(reply("ABCD"))])
        .with_fallback(Err(InferenceError::Quota));
    let solver = solver(&generator, Strategy::Naive);

    let report = solver.solve(&puzzle).await;

    assert_eq!(
        report.result,
        GameResult::Malfunction(Malfunction::Inference(InferenceError::Quota))
    );
    assert_eq!(report.found_groups.len(), 1);
    assert_eq!(report.points(), 5);
    // One success, then the first try and two retries.
    assert_eq!(report.usage.generator_calls, 4);
}

#[tokio::test(start_paused = true)]
async fn slow_generator_times_out_and_malfunctions() {
    let puzzle = lettered_puzzle();
    let solver = solver(SilentGenerator, Strategy::Gvc);

    let report = solver.solve(&puzzle).await;

    // Timed-out samples are malformed, so every round is exhausted.
    assert_matches!(
        report.failure_reason(),
        Some(Malfunction::ConsensusExhausted(3))
    );
    assert_eq!(report.usage.generator_calls, 9);
}

#[tokio::test]
async fn oracle_solves_with_every_strategy() {
    let puzzle = lettered_puzzle();

    for strategy in Strategy::all() {
        let generator = OracleGenerator {
            puzzles: vec![puzzle.clone()],
        };
        let report = solver(generator, strategy).solve(&puzzle).await;

        assert_eq!(report.result, GameResult::Solved, "{}", strategy);
        assert_eq!(report.points(), 20);
    }
}
