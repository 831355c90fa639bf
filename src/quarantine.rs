//! The bounded FIFO quarantine.
//!
//! Freed-into-quarantine slabs are held back from reuse so stale
//! pointers keep landing on memory the heap still controls. The bound
//! is a byte ratio of the whole reservation, precomputed into a slab
//! cap so the hot path never touches floating point.

use crate::constants::SLAB_SIZE;
use std::collections::VecDeque;

/// Outcome of a quarantine push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    /// The block was quarantined; the caller must invoke
    /// [`pop`](crate::ZebraBlockHeap::pop) once, in the same operation,
    /// to keep the ratio bound satisfied.
    SyncTrimRequired,
    /// The descriptor did not match an allocated slab. Nothing changed.
    Rejected,
}

impl PushResult {
    /// True when the push took effect.
    pub fn accepted(self) -> bool {
        self == Self::SyncTrimRequired
    }
}

/// Temperature tag attached to popped entries.
///
/// Multi-policy quarantines use the color to route hot entries
/// differently; this heap trims purely on size, so every pop is
/// [`Green`](Self::Green).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimColor {
    /// Non-hot: evicted to bound memory, not because of access patterns.
    Green,
}

/// FIFO of quarantined slab indices plus the ratio bookkeeping.
/// Lives inside the heap state and is only touched under the heap lock.
#[derive(Debug)]
pub(crate) struct Quarantine {
    queue: VecDeque<usize>,
    ratio: f32,
    max_slabs: usize,
    heap_size: usize,
}

impl Quarantine {
    pub(crate) fn new(heap_size: usize, ratio: f32) -> Self {
        let mut quarantine = Self {
            queue: VecDeque::new(),
            ratio: 0.0,
            max_slabs: 0,
            heap_size,
        };
        quarantine.set_ratio(ratio);
        quarantine
    }

    /// Updates the ratio and recomputes the slab cap. Non-finite input
    /// is ignored; finite input is clamped to `[0, 1]`. Never trims —
    /// trimming happens on the next push/pop pair.
    pub(crate) fn set_ratio(&mut self, ratio: f32) {
        if !ratio.is_finite() {
            return;
        }
        let ratio = ratio.max(0.0).min(1.0);
        self.ratio = ratio;
        let max_bytes = (f64::from(ratio) * self.heap_size as f64).floor() as usize;
        self.max_slabs = max_bytes / SLAB_SIZE;
    }

    pub(crate) fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Slab-count form of the byte-ratio bound.
    pub(crate) fn max_slabs(&self) -> usize {
        self.max_slabs
    }

    pub(crate) fn enqueue(&mut self, index: usize) {
        self.queue.push_back(index);
    }

    pub(crate) fn dequeue(&mut self) -> Option<usize> {
        self.queue.pop_front()
    }

    /// Removes every index, oldest first.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = usize> + '_ {
        self.queue.drain(..)
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(debug_assertions)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.queue.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_tracks_ratio() {
        let mut q = Quarantine::new(8 * SLAB_SIZE, 0.25);
        assert_eq!(q.max_slabs(), 2);

        q.set_ratio(1.0);
        assert_eq!(q.max_slabs(), 8);

        q.set_ratio(0.0);
        assert_eq!(q.max_slabs(), 0);
    }

    #[test]
    fn ratio_input_sanitized() {
        let mut q = Quarantine::new(4 * SLAB_SIZE, 0.5);
        q.set_ratio(f32::NAN);
        assert_eq!(q.ratio(), 0.5);

        q.set_ratio(7.0);
        assert_eq!(q.ratio(), 1.0);

        q.set_ratio(-1.0);
        assert_eq!(q.ratio(), 0.0);
    }

    #[test]
    fn fifo_order() {
        let mut q = Quarantine::new(4 * SLAB_SIZE, 1.0);
        q.enqueue(3);
        q.enqueue(1);
        q.enqueue(2);
        assert_eq!(q.dequeue(), Some(3));
        assert_eq!(q.drain().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(q.dequeue(), None);
    }
}
