use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{frame::RawVideoFrame, packet::RawPacket};

pub type PacketQueue = SharedQueue<RawPacket>;
pub type FrameQueue = SharedQueue<RawVideoFrame>;

/// FIFO of owned items behind a single lock. Clones share the same queue, one
/// clone held by the producer and one by the consumer.
///
/// The lock is only taken for the enqueue/dequeue itself; callers process items
/// after the guard is gone.
pub struct SharedQueue<T> {
    inner: Arc<Mutex<VecDeque<T>>>,
}

impl<T> SharedQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // a panicking holder cannot leave the deque half-modified
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Admission drop: enqueue only while below `capacity`, otherwise hand the
    /// item back untouched. Queued items are never evicted.
    pub fn push_bounded(&self, item: T, capacity: usize) -> Result<(), T> {
        let mut queue = self.lock();
        if queue.len() >= capacity {
            return Err(item);
        }
        queue.push_back(item);
        Ok(())
    }

    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discards everything queued, returning how many items were dropped.
    pub fn clear(&self) -> usize {
        let drained: Vec<T> = self.lock().drain(..).collect();
        drained.len()
    }

    /// Removes and returns everything queued, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }
}

impl<T> Clone for SharedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SharedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three queues of a player: two packet queues fed by the demuxer and the
/// display queue fed by the decoder.
#[derive(Clone, Default)]
pub struct PipelineQueues {
    pub decode: PacketQueue,
    pub record: PacketQueue,
    pub display: FrameQueue,
}

impl PipelineQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops any packet still waiting on either packet queue.
    pub fn purge_packets(&self) -> usize {
        self.decode.clear() + self.record.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = SharedQueue::new();
        for i in 0..5 {
            queue.push(i);
        }
        let consumer = queue.clone();
        assert_eq!(consumer.len(), 5);
        assert_eq!(consumer.drain(), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_bounded_drops_newest() {
        let queue = SharedQueue::new();
        for i in 0..3 {
            assert!(queue.push_bounded(i, 3).is_ok());
        }
        assert_eq!(queue.push_bounded(3, 3), Err(3));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(0));
        assert!(queue.push_bounded(4, 3).is_ok());
        assert_eq!(queue.drain(), vec![1, 2, 4]);
    }

    #[test]
    fn test_clear_reports_count() {
        let queue = SharedQueue::new();
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.clear(), 0);
        assert_eq!(queue.pop(), None);
    }
}
