//! Sessions and the caller-facing `ask` entry point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use juris_llm::LlmProvider;
use juris_memory::VectorStore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::conversation::{ConversationState, ConversationTurn};
use crate::error::QueryError;
use crate::pipeline::Orchestrator;
use crate::synthesizer::AnswerResult;

const MAX_SESSION_ID_LEN: usize = 128;
const DEFAULT_MAX_SESSIONS: usize = 1_000;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3_600);

/// One conversation, owned by its session id.
#[derive(Debug)]
pub struct Session {
    id: String,
    conversation: ConversationState,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>, capacity: usize) -> Self {
        Self {
            id: id.into(),
            conversation: ConversationState::new(capacity),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }
}

type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

#[derive(Debug)]
struct Entry {
    session: SessionHandle,
    last_used: Instant,
}

impl Entry {
    /// Nobody outside the registry holds the session.
    fn is_idle(&self) -> bool {
        Arc::strong_count(&self.session) == 1
    }
}

/// Session lookup. Only the map is shared; each session is locked on its own,
/// so queries in different sessions never wait on each other.
///
/// Sessions unused for `idle_timeout` are dropped on the next lookup. When
/// `max_sessions` is reached the least recently used idle session makes room.
/// Sessions with a query in flight are never dropped.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Entry>>,
    capacity: usize,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl SessionRegistry {
    /// `capacity` bounds each session's conversation length.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity,
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, max_sessions: usize, idle_timeout: Duration) -> Self {
        self.max_sessions = max_sessions.max(1);
        self.idle_timeout = idle_timeout;
        self
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.conversation.capacity).with_limits(
            config.conversation.max_sessions,
            config.conversation.idle_timeout(),
        )
    }

    #[must_use]
    pub fn get_or_create(&self, id: &str) -> SessionHandle {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = sessions.get_mut(id) {
            entry.last_used = now;
            return Arc::clone(&entry.session);
        }

        self.expire(&mut sessions, now);
        if sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, entry)| entry.is_idle())
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    sessions.remove(&key);
                    tracing::debug!(session = %key, "session evicted to make room");
                }
                None => tracing::warn!(
                    max_sessions = self.max_sessions,
                    "every session is busy; admitting {id} over the limit"
                ),
            }
        }

        tracing::debug!(session = id, "session opened");
        let session = Arc::new(tokio::sync::Mutex::new(Session::new(id, self.capacity)));
        sessions.insert(
            id.to_owned(),
            Entry {
                session: Arc::clone(&session),
                last_used: now,
            },
        );
        session
    }

    fn expire(&self, sessions: &mut HashMap<String, Entry>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, entry| {
            !entry.is_idle() || now.duration_since(entry.last_used) < self.idle_timeout
        });
        let expired = before - sessions.len();
        if expired > 0 {
            tracing::debug!(expired, "idle sessions dropped");
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|entry| Arc::clone(&entry.session))
    }

    /// Drop a session and its history. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            tracing::debug!(session = id, "session closed");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check a caller-supplied session id: 1 to 128 ASCII letters, digits, `_` or `-`.
///
/// # Errors
///
/// `InvalidInput` describing the violation.
pub fn validate_session_id(id: &str) -> Result<(), QueryError> {
    if id.is_empty() {
        return Err(QueryError::invalid_input("session id is empty"));
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(QueryError::invalid_input(format!(
            "session id longer than {MAX_SESSION_ID_LEN} characters"
        )));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(QueryError::invalid_input(
            "session id may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

/// Grounded statute question answering across many concurrent sessions.
pub struct LegalAssistant<E, C> {
    orchestrator: Orchestrator<E, C>,
    sessions: SessionRegistry,
}

impl<E: LlmProvider, C: LlmProvider> LegalAssistant<E, C> {
    #[must_use]
    pub fn new(orchestrator: Orchestrator<E, C>, sessions: SessionRegistry) -> Self {
        Self {
            orchestrator,
            sessions,
        }
    }

    #[must_use]
    pub fn from_config(
        config: &Config,
        embedding_provider: E,
        chat_provider: C,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self::new(
            Orchestrator::from_config(config, embedding_provider, chat_provider, store),
            SessionRegistry::from_config(config),
        )
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Answer `question` within `session_id`, creating the session on first use.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a blank question or malformed session id, otherwise
    /// the pipeline failure. The session history is unchanged on error.
    pub async fn ask(&self, question: &str, session_id: &str) -> Result<AnswerResult, QueryError> {
        self.ask_with_cancel(question, session_id, &CancellationToken::new())
            .await
    }

    /// [`Self::ask`] that stops at the next stage boundary or external call once
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`Self::ask`], plus `Cancelled`.
    pub async fn ask_with_cancel(
        &self,
        question: &str,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AnswerResult, QueryError> {
        validate_session_id(session_id)?;
        if question.trim().is_empty() {
            return Err(QueryError::invalid_input("question is empty"));
        }

        let handle = self.sessions.get_or_create(session_id);
        let mut session = handle.lock().await;
        self.orchestrator
            .run(question, &mut session.conversation, cancel)
            .await
    }

    /// Turns recorded for `session_id`, oldest first. Empty for unknown sessions.
    pub async fn history(&self, session_id: &str) -> Vec<ConversationTurn> {
        let Some(handle) = self.sessions.get(session_id) else {
            return Vec::new();
        };
        let session = handle.lock().await;
        session.conversation.iter().cloned().collect()
    }

    /// Forget a session and its history.
    pub fn end_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryErrorKind;

    #[test]
    fn session_id_rules() {
        assert!(validate_session_id("user-42_a").is_ok());
        assert!(validate_session_id(&"a".repeat(128)).is_ok());
        for bad in ["", "has space", "slash/id", "ümlaut"] {
            let err = validate_session_id(bad).unwrap_err();
            assert_eq!(err.kind, QueryErrorKind::InvalidInput, "{bad:?}");
        }
        assert!(validate_session_id(&"a".repeat(129)).is_err());
    }

    #[tokio::test]
    async fn registry_reuses_sessions() {
        let registry = SessionRegistry::new(3);
        let a = registry.get_or_create("alice");
        let again = registry.get_or_create("alice");
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(registry.len(), 1);
        assert_eq!(a.lock().await.conversation().capacity(), 3);

        let _b = registry.get_or_create("bob");
        assert_eq!(registry.len(), 2);
        assert!(registry.remove("alice"));
        assert!(!registry.remove("alice"));
        assert!(registry.get("alice").is_none());
        assert_eq!(registry.get("bob").unwrap().lock().await.id(), "bob");
    }

    fn limited(max_sessions: usize) -> SessionRegistry {
        SessionRegistry::new(3).with_limits(max_sessions, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_expire() {
        let registry = limited(10);
        drop(registry.get_or_create("alice"));

        tokio::time::advance(Duration::from_secs(59)).await;
        drop(registry.get_or_create("bob"));
        assert_eq!(registry.len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        drop(registry.get_or_create("carol"));
        assert!(registry.get("alice").is_none());
        assert!(registry.get("bob").is_some());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_session_outlives_idle_timeout() {
        let registry = limited(10);
        let held = registry.get_or_create("alice");

        tokio::time::advance(Duration::from_secs(600)).await;
        drop(registry.get_or_create("bob"));

        let again = registry.get("alice").unwrap();
        assert!(Arc::ptr_eq(&held, &again));
    }

    #[tokio::test(start_paused = true)]
    async fn full_registry_evicts_least_recently_used() {
        let registry = limited(2);
        drop(registry.get_or_create("alice"));
        tokio::time::advance(Duration::from_secs(1)).await;
        drop(registry.get_or_create("bob"));
        tokio::time::advance(Duration::from_secs(1)).await;
        drop(registry.get_or_create("alice"));
        tokio::time::advance(Duration::from_secs(1)).await;

        drop(registry.get_or_create("carol"));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("bob").is_none());
        assert!(registry.get("alice").is_some());
        assert!(registry.get("carol").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn full_registry_of_busy_sessions_still_admits() {
        let registry = limited(1);
        let _alice = registry.get_or_create("alice");
        let _bob = registry.get_or_create("bob");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn limits_follow_config() {
        let mut config = Config::default();
        config.conversation.max_sessions = 7;
        config.conversation.idle_timeout_seconds = 30;
        let registry = SessionRegistry::from_config(&config);
        assert_eq!(registry.max_sessions, 7);
        assert_eq!(registry.idle_timeout, Duration::from_secs(30));
        assert_eq!(registry.capacity, config.conversation.capacity);
    }
}
