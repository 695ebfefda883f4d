//! Thread-safe FIFO used for a worker's local left/right queues.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A simple multi-producer/multi-consumer FIFO of payload buffers.
#[derive(Default)]
pub struct Fifo {
    inner: Mutex<VecDeque<Arc<[u8]>>>,
}

impl Fifo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&self, payload: Arc<[u8]>) {
        self.inner.lock().push_back(payload);
    }

    /// Pop at most `n` items, returning however many were available.
    pub fn try_pop(&self, n: usize) -> Vec<Arc<[u8]>> {
        let mut inner = self.inner.lock();
        let take = n.min(inner.len());
        inner.drain(..take).collect()
    }

    /// Pop a single item, if any.
    pub fn try_pop_one(&self) -> Option<Arc<[u8]>> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop_preserve_order() {
        let fifo = Fifo::new();
        fifo.push_back(Arc::from(vec![1u8]));
        fifo.push_back(Arc::from(vec![2u8]));
        let popped = fifo.try_pop(1);
        assert_eq!(&*popped[0], &[1u8][..]);
        assert_eq!(fifo.len(), 1);
    }

    #[test]
    fn try_pop_never_exceeds_available() {
        let fifo = Fifo::new();
        fifo.push_back(Arc::from(vec![1u8]));
        let popped = fifo.try_pop(5);
        assert_eq!(popped.len(), 1);
    }
}
