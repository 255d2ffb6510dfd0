//! Bounded per-session conversation log.

use std::collections::VecDeque;

/// A completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    /// Section ids cited by the answer, in citation order.
    pub citations: Vec<String>,
    /// Monotonic per-session counter.
    pub timestamp: u64,
}

/// FIFO log that never holds more than `capacity` turns.
#[derive(Debug, Clone)]
pub struct ConversationState {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
    clock: u64,
}

impl ConversationState {
    /// # Panics
    ///
    /// Panics if `capacity` is zero; configuration validation rejects that earlier.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "conversation capacity must be at least 1");
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
            clock: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Next timestamp for a turn in this session. Strictly increasing.
    pub fn next_timestamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Append `turn`, evicting the oldest turns beyond capacity.
    pub fn append(&mut self, turn: ConversationTurn) {
        self.clock = self.clock.max(turn.timestamp);
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            if let Some(evicted) = self.turns.pop_front() {
                tracing::debug!(timestamp = evicted.timestamp, "evicted oldest turn");
            }
        }
    }

    /// Most recent `max_turns` turns, oldest first.
    #[must_use]
    pub fn summarize(&self, max_turns: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(max_turns);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn turn(state: &mut ConversationState, q: &str) -> ConversationTurn {
        ConversationTurn {
            question: q.into(),
            answer: format!("answer to {q}"),
            citations: vec!["Sec. 46b-36g".into()],
            timestamp: state.next_timestamp(),
        }
    }

    #[test]
    fn summarize_returns_recent_turns_oldest_first() {
        let mut state = ConversationState::new(10);
        for q in ["q1", "q2", "q3", "q4"] {
            let t = turn(&mut state, q);
            state.append(t);
        }
        let recent: Vec<_> = state.summarize(2).into_iter().map(|t| t.question).collect();
        assert_eq!(recent, ["q3", "q4"]);
        assert_eq!(state.summarize(50).len(), 4);
        assert!(state.summarize(0).is_empty());
    }

    #[test]
    fn capacity_plus_one_evicts_oldest() {
        let mut state = ConversationState::new(3);
        for q in ["a", "b", "c", "d"] {
            let t = turn(&mut state, q);
            state.append(t);
        }
        assert_eq!(state.len(), 3);
        let questions: Vec<_> = state.iter().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, ["b", "c", "d"]);
    }

    #[test]
    fn timestamps_are_monotonic() {
        let mut state = ConversationState::new(2);
        let a = state.next_timestamp();
        let b = state.next_timestamp();
        assert!(b > a);
        state.append(ConversationTurn {
            question: "q".into(),
            answer: "a".into(),
            citations: Vec::new(),
            timestamp: 100,
        });
        assert!(state.next_timestamp() > 100);
    }

    #[test]
    #[should_panic(expected = "capacity")]
    fn zero_capacity_panics() {
        let _ = ConversationState::new(0);
    }

    proptest! {
        #[test]
        fn length_never_exceeds_capacity(capacity in 1usize..16, appends in 0usize..64) {
            let mut state = ConversationState::new(capacity);
            for i in 0..appends {
                let t = turn(&mut state, &format!("q{i}"));
                state.append(t);
                prop_assert!(state.len() <= capacity);
            }
            prop_assert_eq!(state.len(), appends.min(capacity));
            if appends > 0 {
                let newest = format!("q{}", appends - 1);
                prop_assert_eq!(&state.summarize(1)[0].question, &newest);
            }
        }
    }
}
