use std::collections::VecDeque;
use std::sync::Arc;

use crate::model::UiBackup;

/// Fixed-capacity backup history; the oldest entry is evicted first.
pub struct BackupRing {
    capacity: usize,
    next_sequence: u64,
    entries: VecDeque<Arc<UiBackup>>,
}

impl BackupRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            next_sequence: 0,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Stamps the next sequence number on `backup` and stores it.
    pub fn push(&mut self, mut backup: UiBackup) -> Arc<UiBackup> {
        self.next_sequence += 1;
        backup.sequence = self.next_sequence;
        let backup = Arc::new(backup);
        self.entries.push_back(Arc::clone(&backup));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        backup
    }

    pub fn latest(&self) -> Option<Arc<UiBackup>> {
        self.entries.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Arc<UiBackup>> {
        self.entries.iter().cloned().collect()
    }
}
