//! Prompt construction, the generative call, and citation parsing.

use std::collections::HashSet;
use std::sync::LazyLock;

use juris_llm::LlmProvider;
use juris_llm::provider::Message;
use regex::Regex;

use crate::context::ContextBlock;
use crate::conversation::ConversationTurn;
use crate::error::QueryError;

static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think regex"));

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("valid label regex"));

/// Shown to the caller whenever an answer had no statute text behind it.
pub const NO_GROUNDING_NOTICE: &str =
    "No supporting statute text was found for this question in the indexed Connecticut General Statutes.";

/// Index of all titles; the link shown for a consulted section with no URL of its own.
pub const CGS_TITLES_URL: &str = "https://www.cga.ct.gov/current/pub/titles.htm";

pub const LEGAL_NOTICE: &str = "Legal Information Notice: This analysis derives from automated \
statutory interpretation of Connecticut General Statutes. For application to specific \
circumstances, consult a licensed Connecticut attorney. No attorney-client relationship is \
formed through this interaction.";

const BASE_PROMPT: &str = "\
You are the Connecticut Legal Assistant. You explain Connecticut General Statutes \
and outline legal procedure while stressing the need for professional counsel.\n\
\n\
## Grounding\n\
- Answer ONLY from the numbered statute passages supplied in the user message.\n\
- Cite every statement with the passage label in square brackets, e.g. [1] or [2].\n\
- Never cite a label that was not supplied. Never invent section numbers.\n\
- If the passages do not answer the question, say so plainly.\n\
\n\
## Format\n\
- Markdown with ## and ### headers.\n\
- Separate substantive requirements from procedural steps.\n\
- Flag areas that need an attorney.\n\
\n\
## Limits\n\
- Do not predict case outcomes or draft legal documents.\n\
- Do not advance novel legal theories.\n\
\n\
End every answer with this notice:\n";

const NO_CONTEXT_INSTRUCTION: &str = "\
No statute passages were found for this question. Do not answer from memory. \
Begin your reply with exactly this sentence: ";

/// System instructions for one query. `grounded` is false when no passages were admitted.
#[must_use]
pub fn build_system_prompt(grounded: bool) -> String {
    let mut prompt = BASE_PROMPT.to_string();
    prompt.push('"');
    prompt.push_str(LEGAL_NOTICE);
    prompt.push('"');
    if !grounded {
        prompt.push_str("\n\n");
        prompt.push_str(NO_CONTEXT_INSTRUCTION);
        prompt.push('"');
        prompt.push_str(NO_GROUNDING_NOTICE);
        prompt.push('"');
    }
    prompt
}

/// A citation that maps to an admitted passage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub section_id: String,
    pub display_label: String,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerResult {
    pub answer_text: String,
    pub citations: Vec<Citation>,
    pub context_used: ContextBlock,
    /// No passages backed this answer.
    pub degraded: bool,
    /// Labels the model used that match no admitted passage.
    pub grounding_inconsistencies: Vec<String>,
}

/// A statute passage placed in front of the model, whether or not it was cited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsultedSource {
    pub section_id: String,
    pub source_url: String,
}

impl AnswerResult {
    /// Every admitted passage in label order. Passages without a URL point at
    /// [`CGS_TITLES_URL`]. Citations are not affected.
    #[must_use]
    pub fn consulted_sources(&self) -> Vec<ConsultedSource> {
        self.context_used
            .entries
            .iter()
            .map(|entry| ConsultedSource {
                section_id: entry.passage.section_id.clone(),
                source_url: entry
                    .passage
                    .source_url
                    .clone()
                    .unwrap_or_else(|| CGS_TITLES_URL.to_owned()),
            })
            .collect()
    }
}

pub struct Synthesizer<P> {
    provider: P,
}

impl<P: LlmProvider> Synthesizer<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// One generative call over `context` and `history`, then citation parsing.
    ///
    /// # Errors
    ///
    /// Provider failures mapped to [`QueryError`]; a reply that is empty after
    /// cleaning is `ServiceUnavailable`.
    pub async fn synthesize(
        &self,
        question: &str,
        context: &ContextBlock,
        history: &[ConversationTurn],
    ) -> Result<AnswerResult, QueryError> {
        let messages = build_messages(question, context, history);
        let raw = self.provider.chat(&messages).await?;
        parse_reply(&raw, context, self.provider.name())
    }
}

/// System prompt, prior exchanges, then context plus question as the final user turn.
#[must_use]
pub fn build_messages(
    question: &str,
    context: &ContextBlock,
    history: &[ConversationTurn],
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(Message::system(build_system_prompt(!context.is_empty())));
    for turn in history {
        messages.push(Message::user(turn.question.clone()));
        messages.push(Message::assistant(turn.answer.clone()));
    }

    let body = if context.is_empty() {
        format!("Statute passages: none found.\n\nQuestion: {question}")
    } else {
        format!(
            "Statute passages:\n\n{}\n\nQuestion: {question}",
            context.render()
        )
    };
    messages.push(Message::user(body));
    messages
}

/// Remove closed `<think>` reasoning blocks.
#[must_use]
pub fn strip_reasoning(raw: &str) -> String {
    THINK_RE.replace_all(raw, "").trim().to_string()
}

/// Bracketed numeric labels in first-appearance order, without repeats.
#[must_use]
pub fn extract_labels(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    LABEL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|label| seen.insert(label.clone()))
        .collect()
}

/// Turn a raw model reply into an [`AnswerResult`] validated against `context`.
///
/// # Errors
///
/// `ServiceUnavailable` if nothing remains after removing reasoning blocks.
pub fn parse_reply(
    raw: &str,
    context: &ContextBlock,
    provider: &str,
) -> Result<AnswerResult, QueryError> {
    let mut answer_text = strip_reasoning(raw);
    if answer_text.is_empty() {
        return Err(QueryError::unavailable(format!(
            "{provider} returned an empty answer"
        )));
    }

    let mut citations = Vec::new();
    let mut grounding_inconsistencies = Vec::new();
    for label in extract_labels(&answer_text) {
        if let Some(entry) = context.entry_by_label(&label) {
            citations.push(Citation {
                section_id: entry.passage.section_id.clone(),
                display_label: label,
                source_url: entry.passage.source_url.clone(),
            });
        } else {
            tracing::warn!(label = %label, admitted = context.len(), "grounding inconsistency: cited label has no passage");
            grounding_inconsistencies.push(label);
        }
    }

    let degraded = context.is_empty();
    if degraded && !answer_text.contains(NO_GROUNDING_NOTICE) {
        answer_text = format!("{NO_GROUNDING_NOTICE}\n\n{answer_text}");
    }

    Ok(AnswerResult {
        answer_text,
        citations,
        context_used: context.clone(),
        degraded,
        grounding_inconsistencies,
    })
}
