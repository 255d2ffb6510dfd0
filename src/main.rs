use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use juris_core::config::{Config, ProviderKind, VectorBackend};
use juris_core::{AnswerResult, LegalAssistant, QueryErrorKind};
use juris_llm::any::AnyProvider;
use juris_llm::ollama::OllamaProvider;
use juris_llm::openai::OpenAiProvider;
use juris_llm::provider::{GenerationParams, LlmProvider};
use juris_memory::{InMemoryVectorStore, QdrantOps, VectorStore};

const DEFAULT_SESSION: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let config_path = resolve_config_path();
    let config = Config::load(&config_path)?;
    config.validate().context("invalid configuration")?;
    tracing::info!(path = %config_path.display(), "configuration loaded");

    let chat = create_chat_provider(&config)?;
    let embedding = create_embedding_provider(&config)?;
    health_check(&chat).await;
    health_check(&embedding).await;

    let store = create_vector_store(&config)?;
    let assistant = LegalAssistant::from_config(&config, embedding, chat, store);

    run_repl(&assistant).await
}

async fn run_repl<E: LlmProvider, C: LlmProvider>(
    assistant: &LegalAssistant<E, C>,
) -> anyhow::Result<()> {
    println!("Connecticut statute assistant. Ask a question, /reset to start over, /quit to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session_id = DEFAULT_SESSION.to_owned();
    let mut resets = 0u32;

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let question = line.trim();
        match question {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                assistant.end_session(&session_id);
                resets += 1;
                session_id = format!("{DEFAULT_SESSION}-{resets}");
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        let ask = assistant.ask_with_cancel(question, &session_id, &cancel);
        tokio::pin!(ask);
        let result = tokio::select! {
            result = &mut ask => result,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                ask.await
            }
        };

        match result {
            Ok(answer) => println!("{}", format_answer(&answer)),
            Err(e) if e.kind == QueryErrorKind::Cancelled => println!("(cancelled)"),
            Err(e) if e.kind == QueryErrorKind::Misconfigured => {
                eprintln!("error: {e}");
                bail!("stopping: {e}");
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

fn format_answer(answer: &AnswerResult) -> String {
    let mut out = answer.answer_text.clone();
    if !answer.citations.is_empty() {
        out.push_str("\n\nSources:");
        for c in &answer.citations {
            out.push_str(&format!("\n  {} {}", c.display_label, c.section_id));
            if let Some(url) = &c.source_url {
                out.push_str(&format!(" <{url}>"));
            }
        }
    } else {
        let consulted = answer.consulted_sources();
        if !consulted.is_empty() {
            out.push_str("\n\nStatutes consulted:");
            for source in &consulted {
                out.push_str(&format!("\n  {} <{}>", source.section_id, source.source_url));
            }
        }
    }
    out
}

async fn health_check(provider: &AnyProvider) {
    if let AnyProvider::Ollama(ollama) = provider {
        match ollama.health_check().await {
            Ok(()) => tracing::info!("ollama health check passed"),
            Err(e) => tracing::warn!("ollama health check failed: {e:#}"),
        }
    }
}

fn generation_params(config: &Config) -> GenerationParams {
    GenerationParams {
        max_tokens: config.llm.max_tokens,
        temperature: config.llm.temperature,
        top_p: config.llm.top_p,
    }
}

fn api_key(config: &Config, provider: ProviderKind) -> anyhow::Result<String> {
    config
        .secrets
        .key_for(provider)
        .map(str::to_owned)
        .with_context(|| {
            format!(
                "JURIS_{}_API_KEY must be set for the {provider} provider",
                provider.as_str().to_uppercase()
            )
        })
}

fn create_chat_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    let llm = &config.llm;
    match llm.provider {
        ProviderKind::Ollama => Ok(AnyProvider::Ollama(
            OllamaProvider::new(
                &llm.base_url,
                llm.model.clone(),
                config.embedding.model.clone(),
            )
            .with_params(generation_params(config)),
        )),
        kind @ (ProviderKind::OpenAi | ProviderKind::Groq) => Ok(AnyProvider::OpenAi(
            OpenAiProvider::new(
                api_key(config, kind)?,
                llm.base_url.clone(),
                llm.model.clone(),
                None,
            )
            .with_params(generation_params(config))
            .with_label(kind.as_str()),
        )),
    }
}

fn create_embedding_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    let emb = &config.embedding;
    match emb.provider {
        ProviderKind::Ollama => Ok(AnyProvider::Ollama(OllamaProvider::new(
            &emb.base_url,
            config.llm.model.clone(),
            emb.model.clone(),
        ))),
        ProviderKind::OpenAi => Ok(AnyProvider::OpenAi(OpenAiProvider::new(
            api_key(config, ProviderKind::OpenAi)?,
            emb.base_url.clone(),
            config.llm.model.clone(),
            Some(emb.model.clone()),
        ))),
        ProviderKind::Groq => bail!("groq does not serve embeddings; set embedding.provider to openai or ollama"),
    }
}

fn create_vector_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    let namespace = &config.vector_store.namespace;
    match config.vector_store.backend {
        VectorBackend::Qdrant => {
            let ops = QdrantOps::new(&config.vector_store.url)
                .context("failed to create qdrant client")?;
            tracing::info!(url = %config.vector_store.url, namespace = %namespace, "using qdrant");
            Ok(Arc::new(ops))
        }
        VectorBackend::Memory => {
            let store = InMemoryVectorStore::new();
            store.create_namespace(namespace);
            tracing::warn!(namespace = %namespace, "in-memory store is empty; every answer will be degraded");
            Ok(Arc::new(store))
        }
    }
}

fn resolve_config_path() -> PathBuf {
    let args: Vec<String> = std::env::args().collect();
    if let Some(path) = args.windows(2).find(|w| w[0] == "--config").map(|w| &w[1]) {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("JURIS_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
