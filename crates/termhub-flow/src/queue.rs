//! Ordered chunk queue with a maintained byte total.

use std::collections::VecDeque;

/// An ordered sequence of byte chunks plus their running byte total.
///
/// Invariant: `bytes()` always equals the sum of the lengths of the queued
/// chunks. Both reset together when the queue is drained or cleared, so the
/// total can never drift from the contents.
#[derive(Debug, Default)]
pub struct ChunkQueue {
    chunks: VecDeque<Vec<u8>>,
    bytes: usize,
}

impl ChunkQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk to the back of the queue.
    pub fn push(&mut self, chunk: Vec<u8>) {
        self.bytes += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Remove and return the oldest chunk.
    pub fn pop_oldest(&mut self) -> Option<Vec<u8>> {
        let chunk = self.chunks.pop_front()?;
        self.bytes -= chunk.len();
        Some(chunk)
    }

    /// Number of queued chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Total queued bytes.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Whether the queue holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Drain the queue into one contiguous buffer, preserving order.
    ///
    /// Allocates the full size once and bulk-copies each chunk, rather than
    /// growing through repeated small copies.
    pub fn concat(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes);
        for chunk in self.chunks.drain(..) {
            out.extend_from_slice(&chunk);
        }
        self.bytes = 0;
        out
    }

    /// Discard all queued chunks without emitting them.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.bytes = 0;
    }
}
