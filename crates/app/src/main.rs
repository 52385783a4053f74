use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mledger::watch::{list_statements, spawn_statement_watcher, SeenStatements};
use mledger::{
    load_corpus, run_batch, BatchLedger, Document, DocumentFailure, Pipeline, PipelineConfig,
    Stage, StatementReport,
};
use mledger_pdf::{LopdfBackend, PasswordCorpus};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "tesseract")]
type Recognizer = mledger_ocr::TesseractRecognizer;
#[cfg(not(feature = "tesseract"))]
type Recognizer = mledger_ocr::UnavailableRecognizer;

type StatementPipeline = Pipeline<LopdfBackend, Recognizer>;

#[derive(Parser, Debug)]
#[command(name = "mledger", version, about = "Turn mobile-money statements into a reconciled ledger")]
struct Cli {
    /// Config file (default: the per-user config dir's config.toml, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of *.txt password files
    #[arg(long, global = true)]
    passwords: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse one statement
    Parse {
        file: PathBuf,

        #[arg(long)]
        password: Option<String>,

        /// Print the ledger as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Write the JSON ledger to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Parse every *.pdf in a directory
    Batch {
        dir: PathBuf,

        #[arg(long)]
        workers: Option<usize>,

        #[arg(long)]
        json: bool,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Process statements as they land in a directory
    Watch {
        dir: PathBuf,

        /// Write one <statement>.json per processed statement here
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Serialize)]
struct FailureRecord<'a> {
    document_id: &'a str,
    stage: Stage,
    cause: String,
}

impl<'a> From<&'a DocumentFailure> for FailureRecord<'a> {
    fn from(f: &'a DocumentFailure) -> Self {
        Self {
            document_id: &f.document_id,
            stage: f.stage,
            cause: f.source.to_string(),
        }
    }
}

#[derive(Serialize)]
struct BatchOutput<'a> {
    reports: &'a [StatementReport],
    failures: Vec<FailureRecord<'a>>,
    crashed: &'a [String],
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dirs = directories::ProjectDirs::from("com", "mledger", "M-Ledger");
    let mut config = load_config(cli.config.as_deref(), dirs.as_ref())?;
    let corpus = Arc::new(load_passwords(cli.passwords.as_deref(), dirs.as_ref())?);

    match cli.command {
        Command::Parse { file, password, json, output } => {
            let mut doc = Document::from_path(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            if let Some(pw) = password {
                doc = doc.with_password(pw);
            }
            let pipeline = build_pipeline(config);
            let report = tokio::task::spawn_blocking(move || pipeline.process(&doc, &corpus))
                .await
                .context("statement worker crashed")??;

            if let Some(path) = output {
                write_json(&path, &report)?;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }

        Command::Batch { dir, workers, json, output } => {
            if let Some(n) = workers {
                config.workers = n;
            }
            let paths = list_statements(&dir)
                .with_context(|| format!("listing {}", dir.display()))?;
            if paths.is_empty() {
                bail!("no *.pdf statements in {}", dir.display());
            }
            let documents = paths
                .iter()
                .map(|p| Document::from_path(p).with_context(|| format!("reading {}", p.display())))
                .collect::<Result<Vec<_>>>()?;

            let ledger = run_batch(Arc::new(build_pipeline(config)), corpus, documents).await;
            let out = BatchOutput {
                reports: &ledger.reports,
                failures: ledger.failures.iter().map(FailureRecord::from).collect(),
                crashed: &ledger.crashed,
            };
            if let Some(path) = output {
                write_json(&path, &out)?;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_batch(&ledger);
            }
        }

        Command::Watch { dir, output_dir } => {
            if let Some(out) = &output_dir {
                std::fs::create_dir_all(out)
                    .with_context(|| format!("creating {}", out.display()))?;
            }
            watch(dir, output_dir, Arc::new(build_pipeline(config)), corpus).await?;
        }

        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn build_pipeline(config: PipelineConfig) -> StatementPipeline {
    #[cfg(feature = "tesseract")]
    let recognizer = mledger_ocr::TesseractRecognizer::new(None, &config.ocr_language);
    #[cfg(not(feature = "tesseract"))]
    let recognizer = mledger_ocr::UnavailableRecognizer;
    Pipeline::new(LopdfBackend, recognizer, config)
}

fn load_config(explicit: Option<&Path>, dirs: Option<&directories::ProjectDirs>) -> Result<PipelineConfig> {
    if let Some(path) = explicit {
        return PipelineConfig::load(path).with_context(|| format!("loading {}", path.display()));
    }
    match dirs.map(|d| d.config_dir().join("config.toml")) {
        Some(path) if path.is_file() => {
            tracing::debug!(path = %path.display(), "using per-user config");
            Ok(PipelineConfig::load(&path)?)
        }
        _ => Ok(PipelineConfig::default()),
    }
}

fn load_passwords(explicit: Option<&Path>, dirs: Option<&directories::ProjectDirs>) -> Result<PasswordCorpus> {
    if let Some(dir) = explicit {
        return load_corpus(dir).with_context(|| format!("loading passwords from {}", dir.display()));
    }
    match dirs.map(|d| d.data_dir().join("passwords")) {
        Some(dir) if dir.is_dir() => Ok(load_corpus(&dir)?),
        _ => Ok(PasswordCorpus::default()),
    }
}

async fn watch(
    dir: PathBuf,
    output_dir: Option<PathBuf>,
    pipeline: Arc<StatementPipeline>,
    corpus: Arc<PasswordCorpus>,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<PathBuf>(64);
    // Dropping the watcher stops the events.
    let _watcher = spawn_statement_watcher(&dir, tx)
        .with_context(|| format!("watching {}", dir.display()))?;
    tracing::info!(dir = %dir.display(), "watching for statements");

    let mut seen = SeenStatements::default();
    rescan(&dir, output_dir.as_deref(), &pipeline, &corpus, &mut seen).await;
    while let Some(path) = rx.recv().await {
        tracing::debug!(path = %path.display(), "statement event");
        rescan(&dir, output_dir.as_deref(), &pipeline, &corpus, &mut seen).await;
    }
    Ok(())
}

/// Process every statement in `dir` not settled earlier in this session.
async fn rescan(
    dir: &Path,
    output_dir: Option<&Path>,
    pipeline: &Arc<StatementPipeline>,
    corpus: &Arc<PasswordCorpus>,
    seen: &mut SeenStatements,
) {
    let paths = match list_statements(dir) {
        Ok(paths) => paths,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "rescan failed");
            return;
        }
    };
    for path in paths {
        let doc = match Document::from_path(&path) {
            Ok(doc) => doc,
            Err(e) => {
                // Usually still being written; the next event retries it.
                tracing::debug!(path = %path.display(), error = %e, "statement not readable yet");
                continue;
            }
        };
        let id = doc.id();
        if seen.contains(&id) {
            continue;
        }
        let (pipeline, corpus) = (pipeline.clone(), corpus.clone());
        match tokio::task::spawn_blocking(move || pipeline.process(&doc, &corpus)).await {
            Ok(Ok(report)) => {
                seen.settle(&id, None);
                print_report(&report);
                if let Some(out) = output_dir {
                    let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
                    if let Err(e) = write_json(&out.join(format!("{name}.json")), &report) {
                        tracing::warn!(error = %e, "failed to write report");
                    }
                }
            }
            Ok(Err(failure)) => {
                seen.settle(&id, Some(&failure));
                eprintln!("{failure}");
            }
            // Left unsettled; the next event retries it.
            Err(e) => tracing::error!(path = %path.display(), error = %e, "worker crashed"),
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

fn print_report(report: &StatementReport) {
    let s = &report.ledger.summary;
    println!(
        "{}: {} transactions ({} discarded, {} of {} pages via OCR, unlocked by {})",
        report.document_id,
        s.transaction_count,
        report.discarded,
        report.ocr_pages,
        report.pages,
        report.password_source
    );
    println!("  opening   {:>14}", s.opening_balance);
    println!("  income    {:>14}", s.income_total);
    println!("  expense   {:>14}", s.expense_total);
    println!("  charges   {:>14}", s.charge_total);
    println!("  net       {:>14}", s.net_balance);
    println!("  closing   {:>14}", s.closing_balance());
    for t in report.ledger.flagged() {
        println!(
            "  ! {} {} balance {} computed {}",
            t.receipt_id,
            t.date,
            t.balance.map(|b| b.to_string()).unwrap_or_default(),
            t.computed_balance
        );
    }
}

fn print_batch(ledger: &BatchLedger) {
    for report in &ledger.reports {
        print_report(report);
    }
    for failure in &ledger.failures {
        println!("{failure}");
    }
    for id in &ledger.crashed {
        println!("{id}: worker crashed");
    }
    println!(
        "{} documents, {} failed, {} transactions, net {}",
        ledger.documents(),
        ledger.failures.len() + ledger.crashed.len(),
        ledger.transaction_count(),
        ledger.net_balance()
    );
}
