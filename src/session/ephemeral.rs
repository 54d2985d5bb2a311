use std::collections::VecDeque;

use crate::memory::MemoryRecord;

/// Bounded, newest-first buffer of recent records.
///
/// Inserting past capacity evicts the oldest insertion, regardless of
/// importance.
#[derive(Debug)]
pub struct EphemeralBuffer {
    entries: VecDeque<MemoryRecord>,
    capacity: usize,
}

impl EphemeralBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, record: MemoryRecord) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_front(record);
        self.entries.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Records, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.entries.iter()
    }

    /// Case-insensitive substring matches, newest first.
    pub fn search(&self, query: &str, content_type: Option<&str>) -> Vec<MemoryRecord> {
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|r| content_type.map_or(true, |t| r.content_type == t))
            .filter(|r| r.content.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }
}
