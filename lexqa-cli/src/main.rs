//! `lexqa`: build a document index and ask grounded questions about it.

mod backends;
mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lexqa_rag::{AskOutcome, RagConfig, RagPipeline};
use tracing::{debug, warn};

use crate::cli::{AskArgs, Cli, Commands, CommonArgs, IngestArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal; real environment variables still apply.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if cli.log_json {
        lexqa_telemetry::init_json_telemetry("lexqa")?;
    } else {
        lexqa_telemetry::init_telemetry("lexqa")?;
    }

    match cli.command {
        Commands::Ingest(args) => ingest(args).await,
        Commands::Ask(args) => ask(args).await,
    }
}

fn load_config(common: &CommonArgs) -> Result<RagConfig> {
    match &common.config {
        Some(path) => RagConfig::from_toml_file(path)
            .with_context(|| format!("invalid configuration in {}", path.display())),
        None => Ok(RagConfig::default()),
    }
}

async fn ingest(args: IngestArgs) -> Result<()> {
    let mut config = load_config(&args.common)?;
    if let Some(size) = args.chunk_size {
        config.chunk_size = size;
    }
    if let Some(overlap) = args.chunk_overlap {
        config.chunk_overlap = overlap;
    }
    config.loader.recursive |= args.recursive;
    config.loader.strict |= args.strict;
    config.validate()?;

    let embedder = backends::embedder(&args.common, config.request_timeout()).await?;
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        // Ingestion never generates; echo keeps the builder satisfied without credentials.
        .answer_generator(Arc::new(lexqa_rag::MockAnswerGenerator::echo()))
        .build()?;

    let report = pipeline
        .ingest(&args.source, &args.index)
        .await
        .with_context(|| format!("failed to ingest {}", args.source.display()))?;

    for failure in &report.failures {
        warn!(path = %failure.path.display(), "skipped: {}", failure.message);
    }
    println!(
        "Indexed {} chunks from {} documents ({} pages) into {}",
        report.chunks,
        report.documents,
        report.pages,
        report.index_path.display()
    );
    println!("Embedding model: {}", report.model);
    if !report.failures.is_empty() {
        println!("Skipped {} files; see the log for details.", report.failures.len());
    }
    Ok(())
}

async fn ask(args: AskArgs) -> Result<()> {
    let mut config = load_config(&args.common)?;
    if let Some(k) = args.top_k {
        config.top_k = k;
    }
    if args.threshold.is_some() {
        config.similarity_threshold = args.threshold;
    }
    config.validate()?;

    // Fail on a missing or unreadable index before touching credentials or the network.
    let manifest = lexqa_rag::store::read_manifest(&args.index)
        .with_context(|| format!("cannot open index {}", args.index.display()))?;
    debug!(model = %manifest.model, entries = manifest.entry_count, "found index");

    let timeout = config.request_timeout();
    let embedder = backends::embedder(&args.common, timeout).await?;
    let generator = backends::generator(&args, timeout)?;
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .answer_generator(generator)
        .build()?;

    let outcome = pipeline
        .ask(&args.question, &args.index, None)
        .await
        .with_context(|| format!("failed to answer from index {}", args.index.display()))?;

    match outcome {
        AskOutcome::Answered(answer) => {
            println!("{}", answer.text.trim());
            println!();
            println!("Sources:");
            for source in &answer.sources {
                println!(
                    "  [{:.3}] {} p.{} ({})",
                    source.score,
                    source.chunk.document_id,
                    source.chunk.page_number,
                    source.chunk.id
                );
            }
        }
        AskOutcome::NoRelevantDocuments => println!("No relevant documents found."),
    }
    Ok(())
}
