use super::descriptor::{State, TransferDescriptor, TransferId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Called with `(success, bytes_transferred)` in the cycle a transfer finishes.
pub type Callback = Box<dyn FnMut(bool, u64) + Send>;

/// Outcome of a finished transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Completion {
    pub id: TransferId,
    pub success: bool,
    pub bytes: u64,
    pub issue_cycle: u64,
    pub completion_cycle: u64,
}

impl Completion {
    #[must_use]
    pub fn from_descriptor(desc: &TransferDescriptor, cycle: u64) -> Self {
        Self {
            id: desc.id,
            success: desc.state == State::Complete,
            bytes: desc.progress,
            issue_cycle: desc.issue_cycle,
            completion_cycle: cycle,
        }
    }

    #[must_use]
    pub fn latency(&self) -> u64 {
        self.completion_cycle - self.issue_cycle
    }
}

/// Finished transfers kept until acknowledged, in completion order.
#[derive(Debug, Default, Clone)]
pub struct CompletionTable {
    inner: IndexMap<TransferId, Completion>,
}

impl CompletionTable {
    pub fn record(&mut self, completion: Completion) {
        let previous = self.inner.insert(completion.id, completion);
        debug_assert!(previous.is_none(), "transfer {} completed twice", completion.id);
    }

    #[must_use]
    pub fn get(&self, id: TransferId) -> Option<&Completion> {
        self.inner.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: TransferId) -> bool {
        self.inner.contains_key(&id)
    }

    /// Drop a completion.
    ///
    /// Returns `false` if `id` was not (or no longer) in the table.
    pub fn acknowledge(&mut self, id: TransferId) -> bool {
        self.inner.shift_remove(&id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Completion> {
        self.inner.values()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
