mod endpoint;

use anyhow::Context;
use clap::{Parser, Subcommand};
use connections_solver::*;
use endpoint::{default_api_key_env, ChatEndpoint};
use serde::Deserialize;
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Plays Connections puzzles with a language model, and measures how well each strategy does.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a JSON file of puzzles in the NYT Connections answers format.
    #[arg(short = 'f', long)]
    puzzles_file: PathBuf,

    /// How the solver picks each guess: naive, cot, basic, gvc, or snap_gvc.
    #[arg(short, long, default_value = "gvc")]
    strategy: Strategy,

    /// The model to ask, e.g. llama-3.3-70b-versatile, llama-3.1-8b-instant, gpt-4o, or
    /// gpt-4o-mini.
    #[arg(short, long, default_value = "llama-3.3-70b-versatile")]
    model: String,

    /// `groq`, `oai`, or the base URL of any OpenAI-compatible API.
    #[arg(short, long, default_value = "groq")]
    endpoint: String,

    /// The environment variable that holds the API key. Defaults to GROQ_API_KEY for groq and
    /// OPENAI_API_KEY otherwise.
    #[arg(long)]
    api_key_env: Option<String>,

    /// Path to a RON file with `solver` and `evaluator` settings.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the number of consensus samples per round.
    #[arg(long)]
    samples: Option<usize>,

    /// Overrides the number of puzzles played at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Writes every attempt report to this file as JSON.
    #[arg(long)]
    report_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play every puzzle in `start..end` and summarize the results.
    Evaluate {
        #[arg(long)]
        start: Option<usize>,
        #[arg(long)]
        end: Option<usize>,
    },
    /// Play the puzzle at the given position in the puzzles file.
    Single { index: usize },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
    solver: SolverConfig,
    evaluator: EvaluatorConfig,
}

impl Settings {
    fn load(args: &Args) -> anyhow::Result<Settings> {
        let mut settings = match &args.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("could not read {}", path.display()))?;
                ron::from_str(&text)
                    .with_context(|| format!("could not parse {}", path.display()))?
            }
            None => Settings::default(),
        };
        if let Some(samples) = args.samples {
            settings.solver.consensus.samples = samples;
        }
        if let Some(concurrency) = args.concurrency {
            settings.evaluator.concurrency = concurrency;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let start_time = Instant::now();
    let args = Args::parse();
    let settings = Settings::load(&args)?;
    println!("File: {}", args.puzzles_file.display());

    let puzzles_file = File::open(&args.puzzles_file)
        .with_context(|| format!("could not open {}", args.puzzles_file.display()))?;
    let bank = PuzzleBank::from_reader(io::BufReader::new(puzzles_file))?;
    println!("There are {} puzzles.", bank.len());

    let key_env = args
        .api_key_env
        .clone()
        .unwrap_or_else(|| default_api_key_env(&args.endpoint).to_string());
    let api_key = std::env::var(&key_env)
        .with_context(|| format!("set {} to your API key", key_env))?;
    // Every in-flight attempt may draw a full round of samples at once.
    let max_in_flight = settings.evaluator.concurrency.max(1)
        * settings.solver.consensus.samples_per_round().max(settings.solver.snap.reduced_samples);
    let generator = RateLimited::new(
        ChatEndpoint::new(&args.endpoint, &args.model, api_key),
        max_in_flight,
    );
    let solver = Solver::new(generator, args.strategy, settings.solver);
    println!("Strategy: {}, model: {}", solver.strategy(), args.model);

    let reports = match args.command {
        Command::Evaluate { start, end } => {
            let puzzles = bank.range(start, end);
            let reports = Evaluator::new(&solver, settings.evaluator)
                .run(puzzles)
                .await;
            print_evaluation(&reports);
            reports
        }
        Command::Single { index } => {
            let puzzle = bank
                .get(index)
                .with_context(|| format!("there is no puzzle at index {}", index))?;
            let report = solver.solve(puzzle).await;
            print_single(&report);
            vec![report]
        }
    };

    if let Some(path) = &args.report_file {
        let file = File::create(path)
            .with_context(|| format!("could not create {}", path.display()))?;
        serde_json::to_writer_pretty(io::BufWriter::new(file), &reports)?;
        println!("Wrote {} reports to {}.", reports.len(), path.display());
    }

    println!(
        "Command executed in {:.3}s.",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

fn describe(result: &GameResult) -> String {
    match result {
        GameResult::Solved => "solved".to_string(),
        GameResult::OutOfMistakes => "out of mistakes".to_string(),
        GameResult::Malfunction(malfunction) => format!("malfunction: {}", malfunction),
    }
}

fn print_evaluation(reports: &[AttemptReport]) {
    println!("|Puzzle|Result|Groups|Mistakes|Points|Calls|Tokens|Hallucinated|");
    println!("|------|------|------|--------|------|-----|------|------------|");
    for report in reports {
        println!(
            "|{}|{}|{}|{}|{}|{}|{}|{}|",
            report.puzzle_id,
            describe(&report.result),
            report.found_groups.len(),
            report.mistakes,
            report.points(),
            report.usage.generator_calls,
            report.usage.total_tokens(),
            report.usage.hallucinated_words
        );
    }

    let summary = EvaluationSummary::from_reports(reports);
    println!(
        "\n**Solved:** {} of {} ({:.1}%)",
        summary.solved,
        summary.attempts,
        summary.solve_rate() * 100.0
    );
    println!("**Out of mistakes:** {}", summary.lost);
    println!("**Malfunctions:** {}", summary.malfunctioned());
    for (kind, count) in &summary.malfunctions {
        println!("\t{}: {}", kind, count);
    }

    println!("\n|Difficulty|Groups found|");
    println!("|----------|------------|");
    for (index, count) in summary.groups_by_difficulty.iter().enumerate() {
        println!("|{}|{}|", index + 1, count);
    }

    println!(
        "\n**Average groups found:** {:.2} +/- {:.2}",
        summary.average_groups_found, summary.std_dev_groups_found
    );
    println!("**Total mistakes:** {}", summary.total_mistakes);
    println!("**Points:** {}", summary.points);
    println!("**Generator calls:** {}", summary.usage.generator_calls);
    println!(
        "**Tokens:** {} prompt, {} completion",
        summary.usage.prompt_tokens, summary.usage.completion_tokens
    );
    println!(
        "**Hallucinated words:** {} ({:.2} per attempt)",
        summary.usage.hallucinated_words,
        summary.average_hallucinated_words()
    );
}

fn print_single(report: &AttemptReport) {
    match &report.result {
        GameResult::Solved => println!(
            "Solved it! It took me {} guesses and {} mistakes.",
            report.guesses.len(),
            report.mistakes
        ),
        GameResult::OutOfMistakes => println!(
            "I ran out of mistakes after finding {} groups :(",
            report.found_groups.len()
        ),
        GameResult::Malfunction(malfunction) => {
            println!("I stopped working: {}", malfunction)
        }
    }
    for guess in &report.guesses {
        let words: Vec<&str> = guess.words.iter().map(|word| word.as_ref()).collect();
        let outcome = match &guess.verdict {
            Verdict::Exact(_) => "correct".to_string(),
            Verdict::PartialOverlap(shared) => format!("wrong ({} of 4)", shared),
            Verdict::Invalid(reason) => format!("invalid ({})", reason),
        };
        println!(
            "\t{}. {} [{}]: {}",
            guess.attempt,
            words.join(", "),
            guess.label,
            outcome
        );
    }
    println!("Points: {}", report.points());
    println!(
        "Calls: {}, tokens: {} prompt + {} completion, hallucinated words: {}",
        report.usage.generator_calls,
        report.usage.prompt_tokens,
        report.usage.completion_tokens,
        report.usage.hallucinated_words
    );
}
