use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use pdfstudio_ai::{AiConfig, DocumentContext, InferenceOrchestrator};

/// PDF Studio AI assistant
///
/// Runs the assistant operations against a plain-text file extracted from a PDF.
///
/// Examples:
///   pdfstudio-ai status
///   pdfstudio-ai summarize report.txt
///   pdfstudio-ai chat report.txt "Who signed the contract?"
///   pdfstudio-ai translate report.txt --to German
#[derive(Parser)]
#[command(
    name = "pdfstudio-ai",
    version = env!("CARGO_PKG_VERSION"),
    arg_required_else_help = true,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which tier and model would be used
    Status,
    /// Summarize a document
    Summarize { file: PathBuf },
    /// Ask a question about a document
    Chat {
        file: PathBuf,
        /// Defaults to asking what the document is about
        #[arg(default_value = "")]
        message: String,
    },
    /// List named entities
    Entities { file: PathBuf },
    /// Translate a document's text
    Translate {
        file: PathBuf,
        /// Target language
        #[arg(long, short = 't', default_value = "English")]
        to: String,
    },
    /// Key insights with a confidence score
    Insights { file: PathBuf },
    /// Flag personal or financial data
    Sensitive { file: PathBuf },
    /// Detect table-like regions
    Tables { file: PathBuf },
    /// Detect headings
    Structure { file: PathBuf },
}

fn read_document(path: &Path) -> anyhow::Result<DocumentContext> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let title = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(DocumentContext::new(title, text))
}

fn print_text(text: &str, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "text": text }))?);
    } else {
        println!("{}", text);
    }
    Ok(())
}

fn print_list(items: &[String], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
    } else {
        for item in items {
            println!("• {}", item);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = AiConfig::load(cli.config.as_deref()).context("invalid AI configuration")?;

    log::info!("Starting PDF Studio AI...");
    let orchestrator = InferenceOrchestrator::new(config).await?;

    match &cli.command {
        Commands::Status => {
            if cli.json {
                let status = serde_json::json!({
                    "tier": orchestrator.tier(),
                    "model": orchestrator.model_name(),
                });
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", orchestrator.describe());
            }
        }
        Commands::Summarize { file } => {
            let document = read_document(file)?;
            print_text(&orchestrator.summarize(&document).await, cli.json)?;
        }
        Commands::Chat { file, message } => {
            let document = read_document(file)?;
            print_text(&orchestrator.chat(&document, message).await, cli.json)?;
        }
        Commands::Entities { file } => {
            let document = read_document(file)?;
            print_list(&orchestrator.extract_entities(&document).await, cli.json)?;
        }
        Commands::Translate { file, to } => {
            let document = read_document(file)?;
            print_text(&orchestrator.translate(&document.text, to).await, cli.json)?;
        }
        Commands::Insights { file } => {
            let document = read_document(file)?;
            let insights = orchestrator.generate_insights(&document).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&insights)?);
            } else {
                println!("{}", insights.text);
                println!(
                    "\n(confidence {:.2}, {} ms, {})",
                    insights.confidence, insights.processing_time_ms, insights.model_used
                );
            }
        }
        Commands::Sensitive { file } => {
            let document = read_document(file)?;
            print_list(&orchestrator.detect_sensitive_content(&document).await, cli.json)?;
        }
        Commands::Tables { file } => {
            let document = read_document(file)?;
            print_list(&orchestrator.extract_tables(&document), cli.json)?;
        }
        Commands::Structure { file } => {
            let document = read_document(file)?;
            print_list(&orchestrator.detect_structure(&document), cli.json)?;
        }
    }

    orchestrator.close();
    Ok(())
}
