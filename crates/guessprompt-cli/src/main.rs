use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use guessprompt_contracts::events::{GameEvent, SessionLog};
use guessprompt_contracts::game::{GameRound, StatsStore};
use guessprompt_engine::{
    resolve_api_key, CompletionClient, CompletionConfig, DecoySynthesizer, DryrunTransport,
    HttpTransport, InferenceConfig, JobPoller, ReqwestTransport, RoundHandler, TransportConfig,
};
use reqwest::blocking::Client as HttpClient;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

const MISSING_API_KEY: &str = "API key is not configured. Set MODEL_ACCESS_KEY or FAL_AI_API_KEY.";
const DRYRUN_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(
    name = "guessprompt",
    version,
    about = "Guess which prompt produced an AI-generated image"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play rounds interactively.
    Play(PlayArgs),
    /// Generate one round and print it as JSON.
    Generate(GenerateArgs),
    /// Print three decoys for a prompt.
    Decoys(DecoysArgs),
    /// Show or clear saved statistics.
    Stats(StatsArgs),
}

#[derive(Debug, Clone, Args)]
struct ConnectionArgs {
    /// Overrides MODEL_ACCESS_KEY / FAL_AI_API_KEY.
    #[arg(long)]
    api_key: Option<String>,
    /// Simulate both APIs locally.
    #[arg(long)]
    dryrun: bool,
    /// Give up polling after this many seconds.
    #[arg(long)]
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Parser)]
struct PlayArgs {
    #[arg(long, env = "GUESSPROMPT_STATS_DIR", default_value = ".guessprompt")]
    stats_dir: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    save_image: Option<PathBuf>,
    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: Option<String>,
    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Debug, Parser)]
struct DecoysArgs {
    #[arg(long)]
    prompt: String,
    /// Skip the completion API and use the rule-based decoys.
    #[arg(long)]
    offline: bool,
    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Debug, Parser)]
struct StatsArgs {
    #[arg(long, env = "GUESSPROMPT_STATS_DIR", default_value = ".guessprompt")]
    stats_dir: PathBuf,
    #[arg(long)]
    clear: bool,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("guessprompt error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("guessprompt=info,guessprompt_engine=info,guessprompt_contracts=info")
        }))
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Play(args) => run_play(args),
        Command::Generate(args) => run_generate(args),
        Command::Decoys(args) => run_decoys(args),
        Command::Stats(args) => run_stats(args),
    }
}

/// Transport, key and configs shared by the poller and the synthesizer.
struct Connection {
    transport: Arc<dyn HttpTransport>,
    api_key: String,
    inference: InferenceConfig,
    completion: CompletionConfig,
    dryrun: bool,
}

impl Connection {
    fn open(args: &ConnectionArgs) -> Result<Self> {
        let mut inference = InferenceConfig::from_env();
        if let Some(secs) = args.poll_timeout_secs {
            inference.poll.deadline = Some(Duration::from_secs(secs));
        }
        let completion = CompletionConfig::from_env();

        if args.dryrun {
            inference.poll.interval = DRYRUN_POLL_INTERVAL;
            let transport = DryrunTransport::new(inference.clone(), &completion);
            return Ok(Self {
                transport: Arc::new(transport),
                api_key: "dryrun".to_string(),
                inference,
                completion,
                dryrun: true,
            });
        }

        let Some(api_key) = resolve_api_key(args.api_key.as_deref()) else {
            bail!(MISSING_API_KEY);
        };
        let transport = ReqwestTransport::new(TransportConfig::default())?;
        Ok(Self {
            transport: Arc::new(transport),
            api_key,
            inference,
            completion,
            dryrun: false,
        })
    }

    fn poller(&self) -> JobPoller {
        JobPoller::new(
            self.transport.clone(),
            self.inference.clone(),
            self.api_key.clone(),
        )
    }

    fn synthesizer(&self) -> DecoySynthesizer {
        DecoySynthesizer::new(CompletionClient::new(
            self.transport.clone(),
            self.completion.clone(),
            self.api_key.clone(),
        ))
    }

    fn round_handler(&self) -> RoundHandler {
        RoundHandler::new(self.poller(), self.synthesizer())
    }
}

fn run_play(args: PlayArgs) -> Result<i32> {
    let connection = Connection::open(&args.connection)?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.stats_dir.join("events.jsonl"));
    let events = Arc::new(SessionLog::new(
        &events_path,
        uuid::Uuid::new_v4().to_string(),
    ));
    events.record(GameEvent::SessionStarted {
        stats_dir: args.stats_dir.display().to_string(),
        dryrun: connection.dryrun,
        model_id: connection.inference.model_id.clone(),
    })?;

    let rounds = connection.round_handler().with_events(Arc::clone(&events));
    let session = PlaySession {
        rounds: &rounds,
        store: StatsStore::new(&args.stats_dir),
        events: &events,
        prompt: args.prompt.as_deref(),
        save_dir: args.save_image.as_deref(),
    };
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    session.run(&mut input, &mut output)?;
    Ok(0)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let connection = Connection::open(&args.connection)?;
    let round = connection
        .round_handler()
        .new_round(args.prompt.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&round)?);
    Ok(0)
}

fn run_decoys(args: DecoysArgs) -> Result<i32> {
    let synthesizer = if args.offline {
        DecoySynthesizer::offline()
    } else {
        Connection::open(&args.connection)?.synthesizer()
    };
    for decoy in synthesizer.synthesize(&args.prompt) {
        println!("{decoy}");
    }
    Ok(0)
}

fn run_stats(args: StatsArgs) -> Result<i32> {
    let store = StatsStore::new(&args.stats_dir);
    if args.clear {
        store.clear()?;
        println!("Statistics cleared ({}).", store.dir().display());
        return Ok(0);
    }
    let stats = store.stats();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "totalGuesses": stats.total_guesses,
            "correctGuesses": stats.correct_guesses,
            "accuracy": stats.accuracy,
            "recordedGuesses": store.guesses().len(),
        }))?
    );
    Ok(0)
}

struct PlaySession<'a> {
    rounds: &'a RoundHandler,
    store: StatsStore,
    events: &'a SessionLog,
    prompt: Option<&'a str>,
    save_dir: Option<&'a Path>,
}

impl PlaySession<'_> {
    /// Runs rounds until the player quits or input ends.
    fn run<R: BufRead, W: Write>(&self, input: &mut R, output: &mut W) -> Result<()> {
        writeln!(
            output,
            "Guess the prompt! Pick 1-4 for each image, 'q' to quit."
        )?;
        loop {
            writeln!(output, "\nGenerating image...")?;
            let round = match self.rounds.new_round(self.prompt) {
                Ok(round) => round,
                Err(err) => {
                    writeln!(output, "Error: {err:#}")?;
                    match read_answer(input, output, "Try again? [y/N] ")? {
                        Some(answer) if answer.eq_ignore_ascii_case("y") => continue,
                        _ => return Ok(()),
                    }
                }
            };
            self.show_round(&round, output)?;

            let Some(choice) = read_choice(&round, input, output)? else {
                return Ok(());
            };
            self.score(&round, &choice, output)?;

            match read_answer(input, output, "Next round? [Enter/n = next, q = quit] ")? {
                Some(answer) if answer.is_empty() || answer.eq_ignore_ascii_case("n") => {}
                _ => return Ok(()),
            }
        }
    }

    fn show_round<W: Write>(&self, round: &GameRound, output: &mut W) -> Result<()> {
        if let Some(dir) = self.save_dir {
            let path = save_round_image(round, dir)?;
            writeln!(output, "Image saved to {}", path.display())?;
        } else if round.image_url.starts_with("data:") {
            writeln!(output, "Image: inline data URL (use --save-image to write it out)")?;
        } else {
            writeln!(output, "Image: {}", round.image_url)?;
        }
        writeln!(output, "Which prompt generated this image?")?;
        for (idx, option) in round.prompt_options.iter().enumerate() {
            writeln!(output, "  {}. {}", idx + 1, option)?;
        }
        Ok(())
    }

    fn score<W: Write>(&self, round: &GameRound, choice: &str, output: &mut W) -> Result<()> {
        let guess = round.guess(choice);
        let stats = self.store.record(&guess)?;
        self.events.record(GameEvent::GuessRecorded {
            round_id: round.id.clone(),
            is_correct: guess.is_correct,
            total_guesses: stats.total_guesses,
            correct_guesses: stats.correct_guesses,
        })?;

        if guess.is_correct {
            writeln!(output, "Correct!")?;
        } else {
            writeln!(output, "Not quite. The actual prompt was:\n  {}", round.actual_prompt)?;
        }
        writeln!(
            output,
            "Score: {}/{} ({:.1}% accuracy)",
            stats.correct_guesses, stats.total_guesses, stats.accuracy
        )?;
        Ok(())
    }
}

/// Reads until a valid option number; `None` on quit or end of input.
fn read_choice<R: BufRead, W: Write>(
    round: &GameRound,
    input: &mut R,
    output: &mut W,
) -> Result<Option<String>> {
    let count = round.prompt_options.len();
    loop {
        let Some(answer) = read_answer(input, output, &format!("Your guess (1-{count}, q to quit): "))?
        else {
            return Ok(None);
        };
        if answer.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        match answer.parse::<usize>() {
            Ok(number) if (1..=count).contains(&number) => {
                return Ok(Some(round.prompt_options[number - 1].clone()));
            }
            _ => writeln!(output, "Please enter a number between 1 and {count}.")?,
        }
    }
}

fn read_answer<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<Option<String>> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn save_round_image(round: &GameRound, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let (bytes, extension) = match round.image_url.strip_prefix("data:") {
        Some(data_url) => decode_data_url(data_url)?,
        None => download_image(&round.image_url)?,
    };
    let path = dir.join(format!("{}.{}", round.id, extension));
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "round image saved");
    Ok(path)
}

/// `image/png;base64,<payload>` without the `data:` scheme.
fn decode_data_url(data_url: &str) -> Result<(Vec<u8>, &'static str)> {
    let Some((header, payload)) = data_url.split_once(',') else {
        bail!("malformed data URL");
    };
    let Some(mime) = header.strip_suffix(";base64") else {
        bail!("data URL is not base64 encoded");
    };
    let bytes = BASE64
        .decode(payload.trim())
        .context("data URL base64 decode failed")?;
    Ok((bytes, extension_for_mime(mime)))
}

fn download_image(url: &str) -> Result<(Vec<u8>, &'static str)> {
    let response = HttpClient::new()
        .get(url)
        .send()
        .with_context(|| format!("failed downloading image ({url})"))?;
    if !response.status().is_success() {
        bail!("image download failed ({})", response.status().as_u16());
    }
    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .bytes()
        .context("failed reading image bytes")?
        .to_vec();
    Ok((bytes, extension_for_mime(mime.as_deref().unwrap_or("image/png"))))
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime.split(';').next().unwrap_or_default().trim() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}
