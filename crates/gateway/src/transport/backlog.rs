// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded binary-frame backlog used while no subscriber is attached.
//!
//! Unlike the reference's [`crate::kv`]-adjacent `RingBuffer` (which
//! overwrites a fixed-size byte array in place), frames here arrive as
//! discrete messages and must be replayed whole in FIFO order once a
//! subscriber attaches — so this is a deque of frames bounded by total
//! byte count, not a circular byte array.

use std::collections::VecDeque;

use bytes::Bytes;

/// FIFO queue of binary frames, bounded by total byte count. When a push
/// would exceed the cap, frames are dropped from the head until the total
/// is back under the cap.
pub struct BinaryBacklog {
    queue: VecDeque<Bytes>,
    total_bytes: usize,
    cap: usize,
}

impl BinaryBacklog {
    pub fn new(cap: usize) -> Self {
        Self { queue: VecDeque::new(), total_bytes: 0, cap }
    }

    /// Append a frame, evicting from the head until within the byte cap.
    pub fn push(&mut self, frame: Bytes) {
        self.total_bytes += frame.len();
        self.queue.push_back(frame);
        while self.total_bytes > self.cap {
            match self.queue.pop_front() {
                Some(evicted) => self.total_bytes -= evicted.len(),
                None => break,
            }
        }
    }

    /// Drain all buffered frames in FIFO order, for a subscriber's first
    /// flush. The backlog is empty afterward.
    pub fn drain(&mut self) -> Vec<Bytes> {
        self.total_bytes = 0;
        self.queue.drain(..).collect()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
#[path = "backlog_tests.rs"]
mod tests;
