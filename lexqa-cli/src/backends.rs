//! Build embedding and generation backends from command-line choices.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use lexqa_rag::{
    AnswerGenerator, ChatCompletionGenerator, EmbeddingProvider, MockAnswerGenerator,
    MockEmbeddingProvider, OllamaEmbeddingProvider, OpenAIEmbeddingProvider, RetryPolicy,
    RetryingAnswerGenerator, RetryingEmbeddingProvider,
};
use lexqa_rag::ollama::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
use tracing::info;

use crate::cli::{AskArgs, CommonArgs, EmbedderKind, GeneratorKind};

const MOCK_DIMENSIONS: usize = 384;

pub async fn embedder(args: &CommonArgs, timeout: Duration) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match args.embedder {
        EmbedderKind::Ollama => {
            let host =
                std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
            let model = args.embedding_model.as_deref().unwrap_or(DEFAULT_MODEL);
            let provider = OllamaEmbeddingProvider::with_timeout(host, model, timeout)?;
            let provider = match args.embedding_dimensions {
                Some(dims) => provider.with_dimensions(dims),
                None => provider
                    .probe_dimensions()
                    .await
                    .context("could not reach Ollama to detect the embedding size")?,
            };
            Arc::new(provider)
        }
        EmbedderKind::Openai => {
            let mut provider = OpenAIEmbeddingProvider::from_env()?.with_timeout(timeout)?;
            if let Some(model) = &args.embedding_model {
                provider = provider.with_model(model);
            }
            if let Some(dims) = args.embedding_dimensions {
                provider = provider.with_dimensions(dims);
            }
            Arc::new(provider)
        }
        EmbedderKind::Mock => {
            let dims = args.embedding_dimensions.unwrap_or(MOCK_DIMENSIONS);
            let mut provider = MockEmbeddingProvider::new(dims);
            if let Some(model) = &args.embedding_model {
                provider = provider.with_model(model);
            }
            Arc::new(provider)
        }
    };

    info!(model = %provider.model_info(), "embedding backend ready");
    Ok(Arc::new(RetryingEmbeddingProvider::new(provider, RetryPolicy::new(args.retries))))
}

pub fn generator(args: &AskArgs, timeout: Duration) -> Result<Arc<dyn AnswerGenerator>> {
    let generator: Arc<dyn AnswerGenerator> = match args.generator {
        GeneratorKind::Echo => return Ok(Arc::new(MockAnswerGenerator::echo())),
        GeneratorKind::Groq => {
            Arc::new(chat_overrides(ChatCompletionGenerator::groq()?, args, timeout)?)
        }
        GeneratorKind::Openai => {
            Arc::new(chat_overrides(ChatCompletionGenerator::openai()?, args, timeout)?)
        }
        GeneratorKind::Compatible => {
            let (Some(url), Some(key)) = (&args.generator_url, &args.generator_api_key) else {
                bail!("--generator compatible needs --generator-url and --generator-api-key");
            };
            let Some(model) = &args.model else {
                bail!("--generator compatible needs --model");
            };
            let generator = ChatCompletionGenerator::compatible(url, key, model)?;
            Arc::new(generator.with_timeout(timeout)?)
        }
    };

    info!(backend = generator.name(), "generation backend ready");
    Ok(Arc::new(RetryingAnswerGenerator::new(generator, RetryPolicy::new(args.common.retries))))
}

fn chat_overrides(
    generator: ChatCompletionGenerator,
    args: &AskArgs,
    timeout: Duration,
) -> Result<ChatCompletionGenerator> {
    let generator = match &args.model {
        Some(model) => generator.with_model(model),
        None => generator,
    };
    Ok(generator.with_timeout(timeout)?)
}
