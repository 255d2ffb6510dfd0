//! Grounded statute question answering: retrieval, context assembly, cited
//! synthesis and per-session conversation state.

pub mod config;
pub mod context;
pub mod conversation;
pub mod embedder;
pub mod error;
pub mod passage;
pub mod pipeline;
pub mod retriever;
pub mod retry;
pub mod session;
pub mod synthesizer;

pub use config::Config;
pub use context::{ContextAssembler, ContextBlock, ContextEntry};
pub use conversation::{ConversationState, ConversationTurn};
pub use error::{QueryError, QueryErrorKind};
pub use passage::Passage;
pub use pipeline::{Orchestrator, PipelineSettings, QueryState};
pub use retry::RetryPolicy;
pub use session::{LegalAssistant, SessionRegistry};
pub use synthesizer::{AnswerResult, Citation, ConsultedSource};
