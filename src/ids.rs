// Task id generation

use crate::task::{Task, TaskId};
use uuid::Uuid;

/// Source of fresh task ids
///
/// The store still checks each generated id against the collection and asks
/// again on collision, so a generator only has to be unique in practice.
pub trait IdGenerator {
    fn next_id(&mut self) -> TaskId;
}

/// Time-ordered UUIDv7 ids
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&mut self) -> TaskId {
        TaskId::new(Uuid::now_v7().to_string())
    }
}

/// Monotonically increasing decimal ids
#[derive(Debug, Clone)]
pub struct SequentialIds {
    next: u64,
}

impl SequentialIds {
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    /// Continue after the largest numeric id already in use
    pub fn following(tasks: &[Task]) -> Self {
        let max = tasks
            .iter()
            .filter_map(|task| task.id.as_str().parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Self::starting_at(max.saturating_add(1))
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> TaskId {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        TaskId::new(id.to_string())
    }
}
