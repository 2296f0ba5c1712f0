use serde::{Deserialize, Serialize};

/// Point-in-time job counts for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs in the pending sequence
    pub pending: usize,

    /// Jobs being processed
    pub active: usize,

    /// Jobs waiting out a retry delay
    pub waiting: usize,

    pub completed: usize,

    pub failed: usize,

    /// Every record still held by the queue
    pub total: usize,
}

impl QueueStats {
    /// Nothing left to run or retry
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.active == 0 && self.waiting == 0
    }
}
