//! `mailprobe`: the command-line surface over the core library (§6 "External
//! Interfaces", §9 "CLI surface"). A thin `clap`-driven consumer: every
//! subcommand opens the term store, does one core operation, and closes it.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use mailprobe::config::MailProbeConfig;
use mailprobe::io::{export_csv, import_csv};
use mailprobe::logging;
use mailprobe::message::Message;
use mailprobe::multi_category::{CategoryConfig, MultiCategoryFilter};
use mailprobe::scorer::Scorer;
use mailprobe::store::TermStore;
use mailprobe::tokenizer::Tokenizer;
use mailprobe::trainer::Trainer;

#[derive(Parser)]
#[command(name = "mailprobe", about = "mailprobe: Bayesian email classifier", version)]
struct Cli {
    /// Directory holding the term store (created if absent).
    #[arg(short = 'd', long = "db-dir", default_value = "mailprobe-db")]
    db_dir: PathBuf,

    /// Named preset applied before any individual override flags.
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// Spam threshold in [0,1] (§4.3 `spam_threshold`).
    #[arg(short = 'l', long)]
    spam_threshold: Option<f64>,

    /// Minimum total occurrence count before a term's empirical probability
    /// is trusted over `new_word_score` (§4.3 `min_word_count`).
    #[arg(short = 'C', long)]
    min_word_count: Option<u64>,

    /// Cap on the number of most-informative terms combined into a score
    /// (§4.3 `terms_for_score`).
    #[arg(short = 'w', long)]
    terms_for_score: Option<usize>,

    /// Verbose (info-level) progress output on stdout, in addition to the
    /// rotating log file.
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Preset {
    Graham,
    Conservative,
    Aggressive,
}

#[derive(Subcommand)]
enum Command {
    /// Create (or verify) the term store directory.
    CreateDb,
    /// Train a message as good (ham).
    Good { file: PathBuf },
    /// Train a message as spam.
    Spam { file: PathBuf },
    /// Train a message with an explicit label, selective-update semantics
    /// optional (§4.4 `train`/`train_selective`).
    Train {
        file: PathBuf,
        #[arg(long, value_enum)]
        label: Label,
        /// Reapply deltas even if this message is already registered under
        /// the same label.
        #[arg(long)]
        force: bool,
        /// Skip the update when the scorer already classifies the message
        /// correctly with sufficient margin (§4.4 `train_selective`).
        #[arg(long)]
        selective: bool,
    },
    /// Remove a previously trained message's contribution to the store.
    Remove { file: PathBuf },
    /// Score a message against the store.
    Score {
        file: PathBuf,
        /// Print the selected top terms and their per-term probabilities.
        #[arg(short = 'T', long = "show-terms")]
        show_terms: bool,
    },
    /// Remove records at or below `max_count` occurrences, stale by
    /// `max_age_days` (§4.2 `cleanup`).
    Cleanup {
        #[arg(long, default_value_t = 1)]
        max_count: u64,
        #[arg(long, default_value_t = 14)]
        max_age_days: u64,
    },
    /// Remove records below `max_count` occurrences regardless of age
    /// (§4.2 `purge`).
    Purge {
        #[arg(long, default_value_t = 1)]
        max_count: u64,
    },
    /// Export all term records to a CSV file (§6 "CSV export format").
    Export { file: PathBuf },
    /// Import term records from a CSV file.
    Import { file: PathBuf },
    /// Classify a message against several named categories at once, picking
    /// the highest-probability one (§9 multi-category design note). Each
    /// category is stored under `<db-dir>/<name>`.
    Classify {
        file: PathBuf,
        /// Comma-separated category names, e.g. "personal,work,newsletters".
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,
    },
    /// Print word count and message totals.
    Info,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Label {
    Good,
    Spam,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_dir = cli.db_dir.join("logs");
    if let Err(e) = logging::init_logging(&log_dir) {
        eprintln!("warning: failed to initialize file logging: {e:#}");
    }

    let mut config = match cli.preset {
        Some(Preset::Graham) => MailProbeConfig::preset_graham(),
        Some(Preset::Conservative) => MailProbeConfig::preset_conservative(),
        Some(Preset::Aggressive) => MailProbeConfig::preset_aggressive(),
        None => MailProbeConfig::default(),
    };
    if let Some(v) = cli.spam_threshold {
        config.scorer.spam_threshold = v;
    }
    if let Some(v) = cli.min_word_count {
        config.scorer.min_word_count = v;
    }
    if let Some(v) = cli.terms_for_score {
        config.scorer.terms_for_score = v;
    }
    config.validate().context("invalid configuration")?;

    let store = TermStore::open(&cli.db_dir, config.store)?;
    let tokenizer = Tokenizer::new(config.tokenizer.clone())?;

    match cli.command {
        Command::CreateDb => {
            println!("Database created successfully at {}", cli.db_dir.display());
        }
        Command::Good { file } => train_file(&store, &tokenizer, config.scorer, &file, false, cli.verbose, false)?,
        Command::Spam { file } => train_file(&store, &tokenizer, config.scorer, &file, true, cli.verbose, false)?,
        Command::Train { file, label, force, selective } => {
            let is_spam = matches!(label, Label::Spam);
            if selective {
                let message = read_message(&file)?;
                let trainer = Trainer::new(&store, &tokenizer, config.scorer);
                let trained = trainer.train_selective(&message, is_spam)?;
                if cli.verbose {
                    println!("Processed {} ({})", file.display(), if is_spam { "spam" } else { "good" });
                }
                println!("Trained: {trained}");
            } else {
                train_file(&store, &tokenizer, config.scorer, &file, is_spam, cli.verbose, force)?;
            }
        }
        Command::Remove { file } => {
            let message = read_message(&file)?;
            let trainer = Trainer::new(&store, &tokenizer, config.scorer);
            if trainer.remove(&message)? {
                println!("Removed message {} from the store", message.digest);
            } else {
                bail!("message {} is not registered", message.digest);
            }
        }
        Command::Score { file, show_terms } => {
            let message = read_message(&file)?;
            let scorer = Scorer::new(&store, config.scorer)?;
            let score = scorer.score_message(&message, &tokenizer)?;
            println!("{} {:.6}", if score.is_spam { "SPAM" } else { "GOOD" }, score.probability);
            println!("Confidence: {:.4}", score.confidence);
            println!("Terms used: {}", score.terms_used);
            if show_terms {
                for (key, p) in &score.top_terms {
                    println!("  {key:<40} {p:.6}");
                }
            }
        }
        Command::Cleanup { max_count, max_age_days } => {
            let removed = store.cleanup(max_count, max_age_days)?;
            println!("Removed {removed} words");
        }
        Command::Purge { max_count } => {
            let removed = store.purge(max_count)?;
            println!("Purged {removed} words");
        }
        Command::Export { file } => {
            let count = export_csv(&store, &file)?;
            println!("Exported {count} term records to {}", file.display());
        }
        Command::Import { file } => {
            let count = import_csv(&store, &file)?;
            println!("Imported {count} term records from {}", file.display());
        }
        Command::Classify { file, categories } => {
            if categories.is_empty() {
                bail!("--categories requires at least one name");
            }
            let message = read_message(&file)?;
            let category_configs = categories
                .iter()
                .map(|name| CategoryConfig { name: name.clone(), dir: cli.db_dir.join(name), scorer: config.scorer })
                .collect();
            let filter = MultiCategoryFilter::open(category_configs, config.store)?;
            let (winner, score) = filter.classify(&message, &tokenizer)?;
            println!("Category: {winner}");
            println!("Probability: {:.6}", score.probability);
            println!("Confidence: {:.4}", score.confidence);
        }
        Command::Info => {
            let (good, spam) = store.globals()?;
            println!("Database Information:");
            println!("  Words: {}", store.word_count()?);
            println!("  Good messages: {good}");
            println!("  Spam messages: {spam}");
        }
    }

    store.close()?;
    Ok(())
}

fn read_message(path: &Path) -> anyhow::Result<Message> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Message::from_bytes(&raw).map_err(Into::into)
}

fn train_file(
    store: &TermStore,
    tokenizer: &Tokenizer,
    scorer_config: mailprobe::ScorerConfig,
    file: &Path,
    is_spam: bool,
    verbose: bool,
    force: bool,
) -> anyhow::Result<()> {
    let message = read_message(file)?;
    let trainer = Trainer::new(store, tokenizer, scorer_config);
    let trained = trainer.train(&message, is_spam, force)?;
    if verbose {
        println!("Processed {} ({})", file.display(), if is_spam { "spam" } else { "good" });
    }
    println!("Trained: {trained}");
    Ok(())
}
