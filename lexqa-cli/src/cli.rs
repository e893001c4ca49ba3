//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Ask questions about a directory of legal documents.
#[derive(Parser, Debug)]
#[command(name = "lexqa")]
#[command(version)]
#[command(about = "Retrieval-augmented question answering over your documents", long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true, env = "LEXQA_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build (or rebuild) the index from a source directory
    Ingest(IngestArgs),

    /// Answer a question from an existing index
    Ask(AskArgs),
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Directory holding the source documents.
    #[arg(long, env = "LEXQA_SOURCE_DIR", default_value = "data")]
    pub source: PathBuf,

    /// Where to write the index.
    #[arg(long, env = "LEXQA_INDEX", default_value = "vectorstore/db")]
    pub index: PathBuf,

    /// Maximum chunk size in characters.
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks.
    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    /// Descend into subdirectories of the source directory.
    #[arg(long)]
    pub recursive: bool,

    /// Abort on the first document that fails to load.
    #[arg(long)]
    pub strict: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question to answer.
    pub question: String,

    /// Index to answer from.
    #[arg(long, env = "LEXQA_INDEX", default_value = "vectorstore/db")]
    pub index: PathBuf,

    /// Number of passages to retrieve.
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Ignore passages scoring below this cosine similarity.
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Answer generation backend.
    #[arg(long, value_enum, env = "LEXQA_GENERATOR", default_value_t = GeneratorKind::Groq)]
    pub generator: GeneratorKind,

    /// Override the generator's default model.
    #[arg(long, env = "LEXQA_MODEL")]
    pub model: Option<String>,

    /// Base URL for `--generator compatible`.
    #[arg(long, env = "LEXQA_GENERATOR_URL")]
    pub generator_url: Option<String>,

    /// API key for `--generator compatible`.
    #[arg(long, env = "LEXQA_GENERATOR_API_KEY", hide_env_values = true)]
    pub generator_api_key: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// TOML configuration file; flags override its values.
    #[arg(long, env = "LEXQA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Embedding backend. Must be the same for `ingest` and `ask`.
    #[arg(long, value_enum, env = "LEXQA_EMBEDDER", default_value_t = EmbedderKind::Ollama)]
    pub embedder: EmbedderKind,

    /// Override the embedder's default model.
    #[arg(long, env = "LEXQA_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Vector length of the embedding model; probed from Ollama when omitted.
    #[arg(long, env = "LEXQA_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Attempts per remote call, including the first.
    #[arg(long, default_value_t = 3)]
    pub retries: u32,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbedderKind {
    /// Local Ollama server (`OLLAMA_HOST`).
    Ollama,
    /// OpenAI embeddings (`OPENAI_API_KEY`).
    Openai,
    /// Offline bag-of-words vectors, for trying the tool out.
    Mock,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorKind {
    /// Groq (`GROQ_API_KEY`).
    Groq,
    /// OpenAI (`OPENAI_API_KEY`).
    Openai,
    /// Any OpenAI-compatible server (`--generator-url`, `--generator-api-key`).
    Compatible,
    /// Echo the prompt back, for inspecting retrieval.
    Echo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ask_with_overrides() {
        let cli = Cli::try_parse_from([
            "lexqa",
            "ask",
            "--index",
            "/tmp/idx",
            "-k",
            "6",
            "--threshold",
            "0.3",
            "--embedder",
            "mock",
            "--generator",
            "echo",
            "Which articles protect assembly?",
        ])
        .unwrap();

        let Commands::Ask(args) = cli.command else { panic!("expected ask") };
        assert_eq!(args.question, "Which articles protect assembly?");
        assert_eq!(args.top_k, Some(6));
        assert_eq!(args.threshold, Some(0.3));
        assert_eq!(args.common.embedder, EmbedderKind::Mock);
        assert_eq!(args.generator, GeneratorKind::Echo);
    }

    #[test]
    fn parses_ingest_flags() {
        let cli = Cli::try_parse_from([
            "lexqa",
            "ingest",
            "--source",
            "docs",
            "--index",
            "out",
            "--chunk-size",
            "500",
            "--chunk-overlap",
            "50",
            "--recursive",
        ])
        .unwrap();

        let Commands::Ingest(args) = cli.command else { panic!("expected ingest") };
        assert_eq!(args.source, PathBuf::from("docs"));
        assert_eq!(args.chunk_size, Some(500));
        assert_eq!(args.chunk_overlap, Some(50));
        assert!(args.recursive);
        assert!(!args.strict);
    }
}
