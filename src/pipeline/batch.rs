//! Bounded accumulation of successful results into write batches.

use crate::models::{PendingWrite, RecordId};

/// Successful results committed together as one write transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 1-based position of this batch within the run
    pub sequence: u64,
    pub items: Vec<PendingWrite>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first_id(&self) -> Option<&RecordId> {
        self.items.first().map(|item| &item.record_id)
    }

    pub fn last_id(&self) -> Option<&RecordId> {
        self.items.last().map(|item| &item.record_id)
    }

    pub fn record_ids(&self) -> Vec<RecordId> {
        self.items.iter().map(|item| item.record_id.clone()).collect()
    }

    /// Total rows carried; differs from `len` for multi-row inserts
    pub fn row_count(&self) -> usize {
        self.items.iter().map(|item| item.rows.len()).sum()
    }
}

/// Collects pending writes and hands back a full [`Batch`] exactly when the
/// capacity is reached.
#[derive(Debug)]
pub struct BatchAccumulator {
    capacity: usize,
    current: Vec<PendingWrite>,
    next_sequence: u64,
}

impl BatchAccumulator {
    /// A capacity of zero is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            current: Vec::with_capacity(capacity),
            next_sequence: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pending(&self) -> usize {
        self.current.len()
    }

    pub fn push(&mut self, item: PendingWrite) -> Option<Batch> {
        self.current.push(item);
        if self.current.len() >= self.capacity {
            Some(self.take())
        } else {
            None
        }
    }

    /// The remainder at end of stream, if any
    pub fn finish(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    fn take(&mut self) -> Batch {
        let items = std::mem::replace(&mut self.current, Vec::with_capacity(self.capacity));
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Batch { sequence, items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(id: usize) -> PendingWrite {
        PendingWrite {
            record_id: RecordId::new(format!("{id:05}")),
            group: None,
            rows: Vec::new(),
        }
    }

    #[test]
    fn flushes_exactly_at_capacity() {
        let mut accumulator = BatchAccumulator::new(1000);
        let mut sizes = Vec::new();
        for id in 0..2500 {
            if let Some(batch) = accumulator.push(write(id)) {
                sizes.push(batch.len());
            }
        }
        if let Some(batch) = accumulator.finish() {
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert!(accumulator.finish().is_none());
    }

    #[test]
    fn batches_are_numbered_and_keep_order() {
        let mut accumulator = BatchAccumulator::new(2);
        assert!(accumulator.push(write(1)).is_none());
        let first = accumulator.push(write(2)).unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.first_id().unwrap().as_str(), "00001");
        assert_eq!(first.last_id().unwrap().as_str(), "00002");

        accumulator.push(write(3));
        let rest = accumulator.finish().unwrap();
        assert_eq!(rest.sequence, 2);
        assert_eq!(rest.record_ids(), vec![RecordId::new("00003")]);
    }

    #[test]
    fn empty_stream_produces_no_batch() {
        let mut accumulator = BatchAccumulator::new(10);
        assert!(accumulator.finish().is_none());
    }
}
