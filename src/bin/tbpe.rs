use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bstr::ByteSlice;
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use serde_json::json;
use tbpe::config::{DEFAULT_SEPARATOR, GPT2_PATTERN};
use tbpe::model::BpeModel;
use tbpe::serialization;
use tbpe::{PretokenizeConfig, Trainer, TrainerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Byte-level BPE tokenizer trainer", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a vocabulary and merge list from a text corpus
    Train(TrainArgs),
    /// Inspect a model dump written by `train --json`
    Info(InfoArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Corpus file to train on
    input: PathBuf,

    /// Target vocabulary size, including the 256 bytes and special tokens
    #[arg(long, value_name = "SIZE")]
    vocab_size: usize,

    /// Special tokens reserved after the byte alphabet (repeat flag)
    #[arg(long = "special-token", value_name = "TOKEN")]
    special_tokens: Vec<String>,

    /// Number of parallel pre-tokenization ranges and worker threads
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Document separator used to align ranges
    #[arg(long, value_name = "TEXT", default_value = DEFAULT_SEPARATOR)]
    separator: String,

    /// Word segmentation pattern
    #[arg(long, value_name = "REGEX", default_value = GPT2_PATTERN)]
    pattern: String,

    /// Directory receiving vocab.json and merges.txt
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// File name prefix for vocab.json and merges.txt
    #[arg(long, value_name = "PREFIX", default_value = "")]
    prefix: String,

    /// Also write a lossless JSON model dump
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// Disable per-iteration logging/progress
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Model JSON to inspect
    model: PathBuf,

    /// Emit machine-readable JSON summary
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Train(args) => run_train(args),
        Commands::Info(args) => run_info(args),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn run_train(args: TrainArgs) -> Result<()> {
    let mut cfg = TrainerConfig::builder()
        .target_vocab_size(args.vocab_size)
        .show_progress(!args.no_progress);
    if !args.special_tokens.is_empty() {
        cfg = cfg.special_tokens(args.special_tokens.clone());
    }
    let trainer_cfg = cfg.build()?;

    let pretokenize = PretokenizeConfig::builder()
        .num_workers(args.workers)
        .document_separator(args.separator.clone())
        .pattern(args.pattern.clone())
        .build()?;

    let spinner = if args.no_progress {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} training merges... {elapsed}")
            .context("invalid progress template")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));
        Some(pb)
    };

    let trainer = Trainer::new(trainer_cfg);
    let start = Instant::now();
    let artifacts = trainer
        .train_from_path(&args.input, &pretokenize)
        .with_context(|| format!("failed to train on {}", args.input.display()))?;
    if let Some(pb) = spinner {
        pb.finish_with_message("training complete");
    }
    let elapsed = start.elapsed();

    let (vocab_path, merges_path) =
        serialization::save_vocab_and_merges(&artifacts.model, &args.output_dir, &args.prefix)
            .with_context(|| format!("failed to write outputs to {}", args.output_dir.display()))?;
    if let Some(path) = &args.json {
        serialization::save_model_json(&artifacts.model, path, true)
            .with_context(|| format!("failed to write model dump to {}", path.display()))?;
    }

    let metrics = &artifacts.metrics;
    info!(
        "training complete: merges={} vocab={} stop={:?} duration={elapsed:.2?}",
        metrics.merges_applied(),
        artifacts.model.vocab_size(),
        metrics.stop_reason
    );
    println!(
        "wrote vocab {} ({} of {} merges) to {} and {}",
        artifacts.model.vocab_size(),
        metrics.merges_applied(),
        metrics.requested_merges,
        vocab_path.display(),
        merges_path.display()
    );
    if let Some(pretokenize) = metrics.pretokenize_duration {
        println!(
            "   words {} distinct / {} total | pretokenize {pretokenize:.2?} | merges {:.2?}",
            metrics.distinct_words, metrics.total_words, metrics.total_duration
        );
    }
    if let Some((id, bytes)) = artifacts.model.longest_token() {
        println!(
            "   longest token {id}: {:?} ({} bytes)",
            bytes.as_bstr(),
            bytes.len()
        );
    }

    Ok(())
}

fn run_info(args: InfoArgs) -> Result<()> {
    let model: BpeModel = serialization::load_model_json(&args.model)
        .with_context(|| format!("failed to load {}", args.model.display()))?;

    let longest = model
        .longest_token()
        .map(|(id, bytes)| (id, bytes.to_str_lossy().into_owned()));
    let summary = json!({
        "path": args.model.display().to_string(),
        "vocab_size": model.vocab_size(),
        "merges": model.merges().len(),
        "special_tokens": model.special_tokens(),
        "longest_token": longest.as_ref().map(|(id, text)| json!({ "id": id, "text": text })),
    });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Vocab size    : {}", model.vocab_size());
        println!("Merges        : {}", model.merges().len());
        if model.special_tokens().is_empty() {
            println!("Special tokens: (none)");
        } else {
            println!("Special tokens: {}", model.special_tokens().join(", "));
        }
        if let Some((id, text)) = &longest {
            println!("Longest token : {id} {text:?}");
        }
    }

    Ok(())
}
