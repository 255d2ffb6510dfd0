//! Stage tracking for a single query.

use std::fmt;

/// Stage of a single query. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Embedding,
    Retrieving,
    Assembling,
    Synthesizing,
    Done,
    Failed,
}

impl QueryState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Retrieving => "retrieving",
            Self::Assembling => "assembling",
            Self::Synthesizing => "synthesizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The only forward transition from this state.
    #[must_use]
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Embedding => Some(Self::Retrieving),
            Self::Retrieving => Some(Self::Assembling),
            Self::Assembling => Some(Self::Synthesizing),
            Self::Synthesizing => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one query through its stages. Only linear advances and failure
/// from a non-terminal stage are possible.
#[derive(Debug)]
pub struct QueryProgress {
    state: QueryState,
}

impl Default for QueryProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryProgress {
    #[must_use]
    pub fn new() -> Self {
        tracing::debug!(state = %QueryState::Embedding, "query started");
        Self {
            state: QueryState::Embedding,
        }
    }

    #[must_use]
    pub fn state(&self) -> QueryState {
        self.state
    }

    /// Move to the next stage. No-op once terminal.
    pub fn advance(&mut self) -> QueryState {
        if let Some(next) = self.state.successor() {
            tracing::debug!(from = %self.state, to = %next, "query transition");
            self.state = next;
        }
        self.state
    }

    /// Enter `Failed` unless already terminal. Returns the stage that failed.
    pub fn fail(&mut self) -> QueryState {
        let at = self.state;
        if !at.is_terminal() {
            tracing::debug!(from = %at, to = %QueryState::Failed, "query transition");
            self.state = QueryState::Failed;
        }
        at
    }
}
