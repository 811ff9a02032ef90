//! Conversation memory.

use parking_lot::RwLock;

use super::turn::Turn;

/// Conversation memory for one logical generation.
///
/// A memory instance is exclusively owned by one generation call; the
/// controller appends prompt, corrective, and function turns, and replaces
/// the last assistant turn in place while a response streams.
pub trait Memory: Send + Sync {
    /// Appends a turn.
    fn add(&self, turn: Turn);

    /// Appends an assistant response turn.
    fn add_result(&self, turn: Turn);

    /// Replaces the last assistant turn (or appends one), used while a
    /// response streams incrementally.
    fn update_result(&self, turn: Turn);

    /// The full history, oldest first.
    fn history(&self) -> Vec<Turn>;

    /// The most recent turn.
    fn get_last(&self) -> Option<Turn>;

    /// Clears the history.
    fn reset(&self);
}

/// In-process [`Memory`] backed by a lock-guarded vector.
#[derive(Debug, Default)]
pub struct InMemory {
    turns: RwLock<Vec<Turn>>,
}

impl InMemory {
    /// Creates an empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of turns held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.read().len()
    }

    /// Whether the memory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.read().is_empty()
    }
}

impl Memory for InMemory {
    fn add(&self, turn: Turn) {
        self.turns.write().push(turn);
    }

    fn add_result(&self, turn: Turn) {
        self.turns.write().push(turn);
    }

    fn update_result(&self, turn: Turn) {
        let mut turns = self.turns.write();
        match turns.last_mut() {
            Some(last @ Turn::Assistant { .. }) => *last = turn,
            _ => turns.push(turn),
        }
    }

    fn history(&self) -> Vec<Turn> {
        self.turns.read().clone()
    }

    fn get_last(&self) -> Option<Turn> {
        self.turns.read().last().cloned()
    }

    fn reset(&self) {
        self.turns.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_and_history() {
        let memory = InMemory::new();
        memory.add(Turn::user_text("hello"));
        memory.add_result(Turn::Assistant {
            content: Some("hi".into()),
            function_calls: Vec::new(),
        });

        let history = memory.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text(), Some("hi"));
        assert_eq!(memory.get_last().unwrap().role(), "assistant");
    }

    #[test]
    fn test_update_result_replaces_last_assistant() {
        let memory = InMemory::new();
        memory.add(Turn::user_text("hello"));
        memory.update_result(Turn::Assistant {
            content: Some("partial".into()),
            function_calls: Vec::new(),
        });
        memory.update_result(Turn::Assistant {
            content: Some("partial plus more".into()),
            function_calls: Vec::new(),
        });

        assert_eq!(memory.len(), 2);
        assert_eq!(memory.get_last().unwrap().text(), Some("partial plus more"));
    }

    #[test]
    fn test_reset() {
        let memory = InMemory::new();
        memory.add(Turn::user_text("hello"));
        memory.reset();
        assert!(memory.is_empty());
        assert!(memory.get_last().is_none());
    }
}
