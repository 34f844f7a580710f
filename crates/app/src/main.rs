use std::fmt;
use std::path::PathBuf;

use drill_core::QuizProgress;
use services::config::{DEFAULT_DATA_DIR, DEFAULT_REMOTE_URL, parse_base_url};
use services::{AppServices, QuizService, ReconcileOutcome, SyncConfig};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingCommand,
    MissingFilename,
    UnknownCommand(String),
    UnknownArg(String),
    InvalidRemote { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingCommand => write!(f, "missing subcommand"),
            ArgsError::MissingFilename => write!(f, "drill requires a dictionary filename"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidRemote { raw } => write!(f, "invalid --remote value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Sync,
    List { json: bool },
    Drill { filename: String, restart: bool },
}

struct Args {
    command: Command,
    config: SyncConfig,
}

impl Args {
    fn parse(config: SyncConfig) -> Result<Self, ArgsError> {
        Self::parse_from(std::env::args().skip(1), config)
    }

    fn parse_from(
        argv: impl IntoIterator<Item = String>,
        mut config: SyncConfig,
    ) -> Result<Self, ArgsError> {
        let mut args = argv.into_iter();
        let mut command_name = None;
        let mut positional = Vec::new();
        let mut json = false;
        let mut restart = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--remote" => {
                    let value = require_value(&mut args, "--remote")?;
                    config.remote_url = parse_base_url(&value)
                        .map_err(|_| ArgsError::InvalidRemote { raw: value.clone() })?;
                }
                "--data-dir" => {
                    config.data_dir = PathBuf::from(require_value(&mut args, "--data-dir")?);
                }
                "--no-persist" => config.persist_after_update = false,
                "--json" => json = true,
                "--restart" => restart = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ if command_name.is_none() => command_name = Some(arg),
                _ => positional.push(arg),
            }
        }

        let command = match command_name.as_deref() {
            None => return Err(ArgsError::MissingCommand),
            Some("sync") => Command::Sync,
            Some("list") => Command::List { json },
            Some("drill") => {
                if positional.is_empty() {
                    return Err(ArgsError::MissingFilename);
                }
                Command::Drill {
                    filename: positional.remove(0),
                    restart,
                }
            }
            Some(other) => return Err(ArgsError::UnknownCommand(other.to_owned())),
        };
        if let Some(extra) = positional.into_iter().next() {
            return Err(ArgsError::UnknownArg(extra));
        }

        Ok(Self { command, config })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- sync                 Refresh dictionaries");
    eprintln!("  cargo run -p app -- list [--json]        Show available dictionaries");
    eprintln!("  cargo run -p app -- drill <filename>     Practice one dictionary");
    eprintln!("        [--restart]                         Start over instead of resuming");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --remote <url>       Dictionary host (default: {DEFAULT_REMOTE_URL})");
    eprintln!("  --data-dir <path>    Local data directory (default: {DEFAULT_DATA_DIR})");
    eprintln!("  --no-persist         Do not save downloaded dictionaries to the device");
    eprintln!("  -h, --help           Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  DRILL_REMOTE_URL, DRILL_DATA_DIR, DRILL_PERSIST_AFTER_UPDATE, RUST_LOG");
}

fn describe(progress: &QuizProgress) -> String {
    format!(
        "{}/{} mastered, question {}/{} of this round, {:.0}% correct over {} answers",
        progress.mastered,
        progress.total,
        (progress.batch_position + 1).min(progress.batch_len),
        progress.batch_len,
        progress.accuracy * 100.0,
        progress.questions_asked,
    )
}

async fn sync(services: &AppServices) {
    let (outcome, _) = services.refresh().await;
    println!("{outcome}");
    println!("{} dictionaries available", services.sync().snapshot().len());
}

async fn list(services: &AppServices, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (outcome, _) = services.refresh().await;
    let catalog = services.sync().snapshot();
    let listing = catalog.listing();
    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    eprintln!("{outcome}");
    let quiz = services.quiz();
    for item in &listing {
        let marker = if quiz.has_session(&item.filename) { "*" } else { " " };
        println!(
            "{marker} {:<24} {:<32} {:>5} entries  by {}  (v{}.{})",
            item.filename,
            item.name,
            item.entries,
            item.author,
            item.version.major(),
            item.version.minor(),
        );
    }
    Ok(())
}

async fn drill(
    services: &AppServices,
    filename: &str,
    restart: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (outcome, _) = services.refresh().await;
    if outcome == ReconcileOutcome::Unavailable {
        return Err(outcome.to_string().into());
    }
    let catalog = services.sync().snapshot();
    let quiz = services.quiz();
    if restart && quiz.discard(filename) {
        debug!(filename, "discarded saved progress");
    }
    let progress = quiz.start(&catalog, filename)?;
    println!("{}", describe(&progress));
    println!("Type the answer and press enter; end input (Ctrl-D) to stop.");

    practice(&quiz, filename, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Run the question loop, then save progress whether or not it failed.
async fn practice<R, W>(
    quiz: &QuizService,
    filename: &str,
    input: R,
    output: W,
) -> Result<(), Box<dyn std::error::Error>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let drilled = answer_loop(quiz, filename, input, output).await;
    let flushed = quiz.flush().await;
    drilled?;
    flushed?;
    Ok(())
}

async fn answer_loop<R, W>(
    quiz: &QuizService,
    filename: &str,
    input: R,
    mut out: W,
) -> Result<(), Box<dyn std::error::Error>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        let question = quiz.next_question(filename)?;
        out.write_all(format!("\n{question}\n> ").as_bytes()).await?;
        out.flush().await?;

        let Some(answer) = lines.next_line().await? else {
            out.write_all(b"\n").await?;
            debug!("input closed");
            return Ok(());
        };
        let outcome = quiz.submit_answer(filename, &answer)?;
        let verdict = match outcome.expected {
            None => "Correct.".to_owned(),
            Some(expected) => format!("Wrong, the answer is: {expected}"),
        };
        out.write_all(format!("{verdict}\n").as_bytes()).await?;
        if outcome.finished {
            let summary = format!(
                "\nDone! {} answers, {:.0}% correct.\n",
                outcome.progress.questions_asked,
                outcome.progress.accuracy * 100.0
            );
            out.write_all(summary.as_bytes()).await?;
            out.flush().await?;
            quiz.discard(filename);
            return Ok(());
        }
        if outcome.progress.batch_position == 0 {
            let round = format!("-- next round: {} --\n", describe(&outcome.progress));
            out.write_all(round.as_bytes()).await?;
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::from_env()?;
    let args = Args::parse(config).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let services = AppServices::from_config(&args.config).await?;
    match &args.command {
        Command::Sync => sync(&services).await,
        Command::List { json } => list(&services, *json).await?,
        Command::Drill { filename, restart } => drill(&services, filename, *restart).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "services=info,app=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
