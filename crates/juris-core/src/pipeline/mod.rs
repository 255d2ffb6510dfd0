//! Per-query sequencing: embed, retrieve, assemble, synthesize, record.

pub mod state;

pub use state::{QueryProgress, QueryState};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use juris_llm::LlmProvider;
use juris_memory::VectorStore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Config;
use crate::context::ContextAssembler;
use crate::conversation::{ConversationState, ConversationTurn};
use crate::embedder::Embedder;
use crate::error::QueryError;
use crate::retriever::Retriever;
use crate::retry::RetryPolicy;
use crate::synthesizer::{AnswerResult, Synthesizer};

/// Knobs for one orchestrator, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub namespace: String,
    pub top_k: usize,
    pub history_turns: usize,
    /// Prior questions folded into the text that is embedded for search.
    pub retrieval_history_turns: usize,
    pub retry: RetryPolicy,
    pub embedding_timeout: Duration,
    pub search_timeout: Duration,
    pub llm_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            namespace: "legal-sections".into(),
            top_k: 5,
            history_turns: 6,
            retrieval_history_turns: 1,
            retry: RetryPolicy::default(),
            embedding_timeout: Duration::from_secs(30),
            search_timeout: Duration::from_secs(30),
            llm_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            namespace: config.vector_store.namespace.clone(),
            top_k: config.retrieval.top_k,
            history_turns: config.conversation.history_turns,
            retrieval_history_turns: config.retrieval.history_turns,
            retry: config.retry.policy(),
            embedding_timeout: config.timeouts.embedding(),
            search_timeout: config.timeouts.search(),
            llm_timeout: config.timeouts.llm(),
        }
    }
}

/// Runs queries against shared components. Conversation state is passed in by
/// the owning session and only touched after a fully successful query.
pub struct Orchestrator<E, C> {
    embedder: Embedder<E>,
    retriever: Retriever,
    assembler: ContextAssembler,
    synthesizer: Synthesizer<C>,
    settings: PipelineSettings,
}

impl<E: LlmProvider, C: LlmProvider> Orchestrator<E, C> {
    #[must_use]
    pub fn new(
        embedder: Embedder<E>,
        retriever: Retriever,
        assembler: ContextAssembler,
        synthesizer: Synthesizer<C>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            embedder,
            retriever,
            assembler,
            synthesizer,
            settings,
        }
    }

    /// Wire components from configuration.
    #[must_use]
    pub fn from_config(
        config: &Config,
        embedding_provider: E,
        chat_provider: C,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self::new(
            Embedder::new(embedding_provider, config.embedding.dimension),
            Retriever::new(store, config.retrieval.score_threshold),
            ContextAssembler::new(config.context.budget_chars),
            Synthesizer::new(chat_provider),
            PipelineSettings::from(config),
        )
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Answer `question` using and then extending `conversation`.
    ///
    /// On any failure, including cancellation, `conversation` is left exactly
    /// as it was.
    ///
    /// # Errors
    ///
    /// The first stage failure after retries, or `Cancelled`.
    pub async fn run(
        &self,
        question: &str,
        conversation: &mut ConversationState,
        cancel: &CancellationToken,
    ) -> Result<AnswerResult, QueryError> {
        let span = tracing::info_span!(
            "query",
            namespace = %self.settings.namespace,
            question_chars = question.chars().count()
        );
        async {
            let started = Instant::now();
            let history = conversation.summarize(self.settings.history_turns);
            let search_text = retrieval_text(
                question,
                &conversation.summarize(self.settings.retrieval_history_turns),
            );
            let mut progress = QueryProgress::new();

            match self
                .execute(question, &search_text, &history, &mut progress, cancel)
                .await
            {
                Ok(answer) => {
                    progress.advance();
                    let turn = ConversationTurn {
                        question: question.trim().to_owned(),
                        answer: answer.answer_text.clone(),
                        citations: answer
                            .citations
                            .iter()
                            .map(|c| c.section_id.clone())
                            .collect(),
                        timestamp: conversation.next_timestamp(),
                    };
                    conversation.append(turn);
                    tracing::info!(
                        latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        passages = answer.context_used.len(),
                        citations = answer.citations.len(),
                        degraded = answer.degraded,
                        "query answered"
                    );
                    Ok(answer)
                }
                Err(err) => {
                    let stage = progress.fail();
                    tracing::warn!(
                        stage = %stage,
                        kind = %err.kind,
                        latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "query failed: {}",
                        err.message
                    );
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        question: &str,
        search_text: &str,
        history: &[ConversationTurn],
        progress: &mut QueryProgress,
        cancel: &CancellationToken,
    ) -> Result<AnswerResult, QueryError> {
        let policy = &self.settings.retry;
        if question.trim().is_empty() {
            return Err(QueryError::invalid_input("question is empty"));
        }

        checkpoint(cancel)?;
        let vector = until_cancelled(
            cancel,
            policy.run("embed", self.settings.embedding_timeout, || {
                self.embedder.embed(search_text)
            }),
        )
        .await?;

        progress.advance();
        checkpoint(cancel)?;
        let passages = until_cancelled(
            cancel,
            policy.run("retrieve", self.settings.search_timeout, || {
                self.retriever
                    .retrieve(&vector, self.settings.top_k, &self.settings.namespace)
            }),
        )
        .await?;

        progress.advance();
        checkpoint(cancel)?;
        let context = self.assembler.assemble(&passages);
        tracing::debug!(
            retrieved = passages.len(),
            admitted = context.len(),
            chars = context.total_size,
            "context assembled"
        );

        progress.advance();
        checkpoint(cancel)?;
        until_cancelled(
            cancel,
            policy.run("synthesize", self.settings.llm_timeout, || {
                self.synthesizer.synthesize(question, &context, history)
            }),
        )
        .await
    }
}

/// Text embedded for search: recent prior questions, oldest first, then the
/// current one.
fn retrieval_text(question: &str, prior: &[ConversationTurn]) -> String {
    let mut text = String::new();
    for turn in prior {
        text.push_str(&turn.question);
        text.push('\n');
    }
    text.push_str(question.trim());
    text
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), QueryError> {
    if cancel.is_cancelled() {
        Err(QueryError::cancelled())
    } else {
        Ok(())
    }
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, QueryError>>,
) -> Result<T, QueryError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(QueryError::cancelled()),
        result = fut => result,
    }
}
