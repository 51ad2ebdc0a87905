//! Arrival-order reassembly for decoded buffers.
//!
//! Chunks are numbered as they arrive from the channel, but decode workers may finish them in
//! any order. [`ReorderQueue`] holds early completions until every earlier sequence number has
//! either produced a buffer or failed, then releases them in arrival order.

use std::collections::{BTreeMap, VecDeque};

use crate::decode::DecodedBuffer;

#[derive(Debug, Default)]
pub struct ReorderQueue {
    next_seq: u64,
    /// `None` marks a chunk that failed to decode; it releases as a gap.
    pending: BTreeMap<u64, Option<DecodedBuffer>>,
}

impl ReorderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for `seq` and move every releasable buffer onto `out`.
    ///
    /// Returns the number of buffers released. Late or duplicate sequence numbers are ignored.
    pub fn insert(
        &mut self,
        seq: u64,
        buffer: Option<DecodedBuffer>,
        out: &mut VecDeque<DecodedBuffer>,
    ) -> usize {
        if seq < self.next_seq || self.pending.contains_key(&seq) {
            tracing::debug!(seq, next_seq = self.next_seq, "duplicate chunk completion ignored");
            return 0;
        }
        self.pending.insert(seq, buffer);

        let mut released = 0;
        while let Some(slot) = self.pending.remove(&self.next_seq) {
            self.next_seq += 1;
            if let Some(buffer) = slot {
                out.push_back(buffer);
                released += 1;
            }
        }
        released
    }

    /// Decoded buffers waiting on an earlier sequence number.
    pub fn waiting(&self) -> usize {
        self.pending.values().filter(|b| b.is_some()).count()
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn clear(&mut self) {
        self.next_seq = 0;
        self.pending.clear();
    }
}
