//! paper-alchemist command line
//!
//! Drives the pipeline directly against the configured database, without the
//! HTTP server.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use paper_alchemist::{AlchemistConfig, Pipeline, PipelineReport, PipelineStatus, Stage};

#[derive(Debug, Parser)]
#[command(name = "paper-alchemist", version, about = "Scientific PDF processing pipeline")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest a PDF and run every stage
    Process {
        file: PathBuf,
    },
    /// Resume a document, or rerun it from a given stage
    Resume {
        doc_id: Uuid,
        /// ocr, quality_judge, embedding, metadata or finalize
        #[arg(long)]
        restart_from: Option<Stage>,
    },
    /// Show one document's status and processing log
    Status {
        doc_id: Uuid,
    },
    /// List known documents
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "paper_alchemist=warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AlchemistConfig::load(cli.config.as_deref())?;
    let pipeline = Pipeline::open(&config)?;

    match cli.command {
        Command::Process { file } => {
            let pdf = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let filename = file.file_name().map(|n| n.to_string_lossy().into_owned());

            let bar = spinner(format!("Processing {}", file.display()));
            let report = pipeline.ingest(&pdf, filename).await;
            bar.finish_and_clear();

            print_report(&report?);
        }
        Command::Resume { doc_id, restart_from } => {
            let bar = spinner(format!("Processing {}", doc_id));
            let report = match restart_from {
                Some(stage) => pipeline.reprocess(doc_id, stage).await,
                None => pipeline.process(doc_id).await,
            };
            bar.finish_and_clear();

            print_report(&report?);
        }
        Command::Status { doc_id } => {
            let repo = pipeline.repository();
            let record = repo
                .get(doc_id)?
                .with_context(|| format!("document {} not found", doc_id))?;

            let summary = record.summary();
            println!("{} {}", style("Document").bold(), summary.doc_id);
            println!("  status:       {}", status_label(summary.status));
            println!("  file:         {}", summary.filename.as_deref().unwrap_or("-"));
            println!("  title:        {}", summary.title.as_deref().unwrap_or("-"));
            println!("  content id:   {}", summary.content_id.as_deref().unwrap_or("-"));
            if let Some(original) = summary.duplicate_of {
                println!("  duplicate of: {}", original);
            }
            println!("  ocr:          {}", summary.ocr_performed);
            if let Some(error) = &summary.error {
                println!("  error:        {}", style(error).red());
            }

            println!("\n{}", style("Processing log").bold());
            for entry in repo.processing_log(doc_id)? {
                println!(
                    "  {}  {:<14} {:<12} {:>6}ms  {}",
                    entry.logged_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.stage,
                    entry.outcome,
                    entry.duration_ms,
                    style(entry.message.unwrap_or_default()).dim()
                );
            }
        }
        Command::List => {
            let documents = pipeline.repository().list()?;
            if documents.is_empty() {
                println!("No documents");
            }
            for doc in documents {
                println!(
                    "{}  {:<28} {}",
                    doc.doc_id,
                    status_label(doc.status),
                    doc.title.or(doc.filename).unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn status_label(status: PipelineStatus) -> String {
    let label = style(status.as_str());
    if status == PipelineStatus::Complete {
        label.green().to_string()
    } else if status.is_failed() {
        label.red().to_string()
    } else {
        label.yellow().to_string()
    }
}

fn print_report(report: &PipelineReport) {
    println!("{} {}", style("Document").bold(), report.doc_id);
    for stage in &report.stages {
        println!(
            "  {:<14} {:<12} {:>6}ms  {}",
            stage.stage.as_str(),
            stage.outcome.as_str(),
            stage.duration_ms,
            style(stage.message.as_deref().unwrap_or_default()).dim()
        );
    }
    println!("  status:     {}", status_label(report.status));
    if let Some(content_id) = &report.content_id {
        println!("  content id: {}", content_id);
    }
    if let Some(original) = report.duplicate_of {
        println!("  {} duplicate of {}", style("!").yellow(), original);
    }
    if let Some(error) = &report.error {
        println!("  error:      {}", style(error).red());
    }
}
