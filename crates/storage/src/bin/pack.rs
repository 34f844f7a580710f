use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use drill_core::model::{Dictionary, Entry, Version};
use storage::codec::encode_dictionary;
use storage::index::is_valid_filename;
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    input: PathBuf,
    filename: String,
    identifier: String,
    name: String,
    author: String,
    version: Version,
    created_on: Option<DateTime<Utc>>,
    out_dir: PathBuf,
    install: bool,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingRequired { flag: &'static str },
    UnknownArg(String),
    InvalidVersion { raw: String },
    InvalidCreated { raw: String },
    InvalidFilename { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingRequired { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidVersion { raw } => {
                write!(f, "invalid --version value (expected <major>.<minor> or raw i32): {raw}")
            }
            ArgsError::InvalidCreated { raw } => {
                write!(f, "invalid --created value (expected RFC3339): {raw}")
            }
            ArgsError::InvalidFilename { raw } => write!(f, "invalid --filename value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

#[derive(Debug)]
struct TsvError {
    line: usize,
}

impl fmt::Display for TsvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: expected <question>\\t<answer>", self.line)
    }
}

impl std::error::Error for TsvError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_version(raw: &str) -> Option<Version> {
    match raw.split_once('.') {
        Some((major, minor)) => Some(Version::from_parts(
            major.parse().ok()?,
            minor.parse().ok()?,
        )),
        None => raw.parse().ok(),
    }
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut input = None;
        let mut filename = None;
        let mut identifier = None;
        let mut name = None;
        let mut author = std::env::var("DRILL_AUTHOR").unwrap_or_default();
        let mut version = Version::from_parts(1, 0);
        let mut created_on = None;
        let mut out_dir = PathBuf::from(".");
        let mut install = false;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--input" => input = Some(PathBuf::from(require_value(&mut args, "--input")?)),
                "--filename" => {
                    let value = require_value(&mut args, "--filename")?;
                    if !is_valid_filename(&value) {
                        return Err(ArgsError::InvalidFilename { raw: value });
                    }
                    filename = Some(value);
                }
                "--id" => identifier = Some(require_value(&mut args, "--id")?),
                "--name" => name = Some(require_value(&mut args, "--name")?),
                "--author" => author = require_value(&mut args, "--author")?,
                "--version" => {
                    let value = require_value(&mut args, "--version")?;
                    version = parse_version(&value)
                        .ok_or_else(|| ArgsError::InvalidVersion { raw: value.clone() })?;
                }
                "--created" => {
                    let value = require_value(&mut args, "--created")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidCreated { raw: value.clone() })?
                        .with_timezone(&Utc);
                    created_on = Some(parsed);
                }
                "--out" => out_dir = PathBuf::from(require_value(&mut args, "--out")?),
                "--install" => install = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let input = input.ok_or(ArgsError::MissingRequired { flag: "--input" })?;
        let filename = match filename {
            Some(filename) => filename,
            None => default_filename(&input)?,
        };
        let identifier = identifier.unwrap_or_else(|| filename.clone());
        let name = name.unwrap_or_else(|| identifier.clone());

        Ok(Self {
            input,
            filename,
            identifier,
            name,
            author,
            version,
            created_on,
            out_dir,
            install,
        })
    }
}

fn default_filename(input: &Path) -> Result<String, ArgsError> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or(ArgsError::MissingRequired { flag: "--filename" })?;
    let filename = format!("{stem}.dic");
    if is_valid_filename(&filename) {
        Ok(filename)
    } else {
        Err(ArgsError::InvalidFilename { raw: filename })
    }
}

fn parse_entries(text: &str) -> Result<Vec<Entry>, TsvError> {
    let mut entries = Vec::new();
    for (offset, line) in text.lines().enumerate() {
        let line_no = offset + 1;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let (question, answer) = line.split_once('\t').ok_or(TsvError { line: line_no })?;
        entries.push(Entry::new(question, answer));
    }
    Ok(entries)
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin pack -- --input <words.tsv> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --input <path>            Tab-separated question/answer lines (required)");
    eprintln!("  --filename <name>         Body filename (default: <input stem>.dic)");
    eprintln!("  --id <identifier>         Dictionary identifier (default: filename)");
    eprintln!("  --name <name>             Display name (default: identifier)");
    eprintln!("  --author <name>           Author (default: $DRILL_AUTHOR or empty)");
    eprintln!("  --version <maj.min|raw>   Version (default: 1.0)");
    eprintln!("  --created <rfc3339>       Creation time (default: now)");
    eprintln!("  --out <dir>               Output directory (default: .)");
    eprintln!("  --install                 Also record the body in <dir>/meta.txt");
    eprintln!("  -h, --help                Show this help");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let text = tokio::fs::read_to_string(&args.input).await?;
    let entries = parse_entries(&text)?;
    let dictionary = Dictionary::new(
        args.identifier.clone(),
        args.name.clone(),
        args.author.clone(),
        args.created_on.unwrap_or_else(Utc::now),
        args.version,
        entries,
    )?;
    let bytes = encode_dictionary(&dictionary)?;

    let storage = Storage::filesystem(&args.out_dir).await?;
    storage
        .dictionaries
        .write_body(&args.filename, &bytes)
        .await?;

    if args.install {
        let mut index = storage.dictionaries.read_index().await?.unwrap_or_default();
        index.upsert(&args.filename, args.version);
        storage.dictionaries.write_index(&index).await?;
    }

    eprintln!(
        "Packed {} entries into {}",
        dictionary.len(),
        args.out_dir.join(&args.filename).display()
    );
    // Manifest line on stdout so it can be appended to a remote manifest.
    println!("{} {}", args.filename, args.version);

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
