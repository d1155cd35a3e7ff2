//! # Doc Chat CLI (`docchat`)
//!
//! The `docchat` binary drives a single in-process chat session: it builds
//! an index from the given files and answers questions against it.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat chat [FILES...]` | Interactive session; `/process`, `/history`, `/quit` |
//! | `docchat ask "<question>" --file F` | Build an index and answer one question |
//! | `docchat chunks <FILE>` | Print the chunks a file would be split into |
//!
//! Settings come from the config file when it exists, otherwise the
//! built-in defaults are used. API keys are read from `OPENAI_API_KEY`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use doc_chat::chunk::split_text;
use doc_chat::config::{self, Config};
use doc_chat::extract::{Extractor, FileExtractor};
use doc_chat::models::{Answer, UploadedFile};
use doc_chat::progress::ProgressMode;
use doc_chat::{logging, BuildReport, Error, FileOutcome, Pipeline, Session};

/// Doc Chat CLI: chat with your PDF and text documents.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Chat with your documents using retrieval-augmented answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docchat.toml`. A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session.
    ///
    /// Files given on the command line are processed before the first
    /// prompt. Inside the session, `/process <files...>` rebuilds the index,
    /// `/history` prints the transcript and `/quit` exits.
    Chat {
        files: Vec<PathBuf>,
    },

    /// Answer a single question against the given files.
    Ask {
        question: String,

        /// File to index (repeatable).
        #[arg(long = "file", short = 'f', required = true)]
        files: Vec<PathBuf>,
    },

    /// Extract and chunk one file without embedding it.
    Chunks {
        file: PathBuf,

        /// Emit chunks as JSON lines.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_or_default(&cli.config)?;
    logging::init(&cfg.logging);
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Chat { files } => run_chat(&cfg, progress, &files).await?,
        Commands::Ask { question, files } => run_ask(&cfg, progress, &question, &files).await?,
        Commands::Chunks { file, json } => run_chunks(&cfg, &file, json)?,
    }

    Ok(())
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    paths
        .iter()
        .map(|p| UploadedFile::from_path(p).with_context(|| format!("failed to read {}", p.display())))
        .collect()
}

fn print_failures(outcomes: &[FileOutcome]) {
    for outcome in outcomes {
        if let FileOutcome::Failed { error, .. } = outcome {
            eprintln!("skipped: {}", error);
        }
    }
}

fn print_report(report: &BuildReport) {
    print_failures(&report.outcomes);
    let indexed = report.outcomes.len() - report.failures().count();
    println!(
        "Indexed {} file(s) into {} chunk(s). Ready to chat!",
        indexed, report.chunks
    );
}

/// Print a failed build, including each file's error when nothing was indexed.
fn print_build_error(error: &Error) {
    if let Error::EmptyCorpus { outcomes } = error {
        print_failures(outcomes);
    }
    eprintln!("{}", error);
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!();
        for hit in &answer.sources {
            println!(
                "  [{:.3}] {} #{}",
                hit.score,
                hit.chunk.source.as_deref().unwrap_or("-"),
                hit.chunk.index
            );
        }
    }
}

async fn run_ask(cfg: &Config, progress: ProgressMode, question: &str, paths: &[PathBuf]) -> Result<()> {
    let pipeline = Pipeline::from_config(cfg)?.with_progress(progress.reporter());
    let mut session = Session::new().context("failed to create session scratch directory")?;

    let files = read_files(paths)?;
    let report = match pipeline.process(&mut session, &files).await {
        Ok(report) => report,
        Err(e) => {
            if let Error::EmptyCorpus { outcomes } = &e {
                print_failures(outcomes);
            }
            return Err(e.into());
        }
    };
    print_report(&report);

    let answer = pipeline.ask(&mut session, question).await?;
    print_answer(&answer);
    Ok(())
}

async fn run_chat(cfg: &Config, progress: ProgressMode, paths: &[PathBuf]) -> Result<()> {
    let pipeline = Pipeline::from_config(cfg)?.with_progress(progress.reporter());
    let mut session = Session::new().context("failed to create session scratch directory")?;

    if !paths.is_empty() {
        process_paths(&pipeline, &mut session, paths).await;
    }

    let interactive = atty::is(atty::Stream::Stdin);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        if interactive {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("/process") {
            let paths: Vec<PathBuf> = rest.split_whitespace().map(PathBuf::from).collect();
            process_paths(&pipeline, &mut session, &paths).await;
            continue;
        }
        match line {
            "/quit" | "/exit" => break,
            "/history" => {
                for turn in session.transcript() {
                    println!("{}: {}", turn.role.as_str(), turn.content);
                }
                continue;
            }
            _ => {}
        }

        match pipeline.ask(&mut session, line).await {
            Ok(answer) => print_answer(&answer),
            Err(e) => eprintln!("{}", e),
        }
    }

    Ok(())
}

/// Errors are printed rather than returned so the chat loop survives them.
async fn process_paths(pipeline: &Pipeline, session: &mut Session, paths: &[PathBuf]) {
    if paths.is_empty() {
        eprintln!("Please upload at least one file first! Usage: /process <files...>");
        return;
    }
    let files = match read_files(paths) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("{:#}", e);
            return;
        }
    };
    match pipeline.process(session, &files).await {
        Ok(report) => print_report(&report),
        Err(e) => print_build_error(&e),
    }
}

fn run_chunks(cfg: &Config, path: &Path, json: bool) -> Result<()> {
    let extractor = FileExtractor::from_config(&cfg.extract);
    let session = Session::new().context("failed to create session scratch directory")?;
    let file = UploadedFile::from_path(path).with_context(|| format!("failed to read {}", path.display()))?;

    let text = extractor
        .extract(&file, session.scratch_dir())
        .with_context(|| format!("could not extract {}", file.name))?;
    let chunks = split_text(&text, &cfg.chunking, Some(&file.name));
    for chunk in &chunks {
        if json {
            println!("{}", serde_json::to_string(chunk)?);
        } else {
            println!("--- chunk {} ({} chars) ---", chunk.index, chunk.char_len());
            println!("{}", chunk.text);
        }
    }
    if !json {
        eprintln!("{} chunk(s)", chunks.len());
    }
    Ok(())
}
