//! Queue items and the scope-ended handle used to enqueue them.

use std::sync::Arc;

/// A single unit of work flowing through the queue.
///
/// `position_hint` places the item on the [0, 1) ring used by the spatial
/// item map and the centroidal distributor; the equal distributor uses it as
/// a static hash bucket. `sequence` is assigned by the producer that created
/// the item and is unique only within that producer's lifetime.
#[derive(Debug, Clone)]
pub struct Item {
    /// Sequence number assigned by the owning producer.
    pub sequence: u64,
    /// Position on the [0, 1) ring.
    pub position_hint: f64,
    /// Opaque payload bytes.
    pub payload: Arc<[u8]>,
}

impl Item {
    pub(crate) fn new(sequence: u64, position_hint: f64, payload: Arc<[u8]>) -> Self {
        Self {
            sequence,
            position_hint,
            payload,
        }
    }
}

/// A handle returned by [`crate::producer::Producer::push`].
///
/// The caller fills in the payload bytes and then either calls
/// [`ItemHandle::commit`] explicitly or lets the handle go out of scope, at
/// which point it commits automatically. This mirrors the source library's
/// scope-acquired `QueueItem`, which enqueued itself from its destructor.
pub struct ItemHandle {
    position_hint: f64,
    payload: Vec<u8>,
    sink: Option<Box<dyn FnOnce(Item) + Send>>,
    sequence: u64,
    committed: bool,
}

impl ItemHandle {
    pub(crate) fn new(
        sequence: u64,
        position_hint: f64,
        sink: Box<dyn FnOnce(Item) + Send>,
    ) -> Self {
        Self {
            position_hint,
            payload: Vec::new(),
            sink: Some(sink),
            sequence,
            committed: false,
        }
    }

    /// Append bytes to the item's payload buffer.
    pub fn write(&mut self, bytes: &[u8]) {
        self.payload.extend_from_slice(bytes);
    }

    /// Override the position hint set at construction.
    pub fn set_position_hint(&mut self, position_hint: f64) {
        self.position_hint = position_hint;
    }

    /// Finalize the item and hand it to the producer's distributor now,
    /// rather than waiting for the handle to drop.
    pub fn commit(mut self) {
        self.commit_internal();
    }

    fn commit_internal(&mut self) {
        if self.committed {
            return;
        }
        self.committed = true;
        if let Some(sink) = self.sink.take() {
            let item = Item::new(self.sequence, self.position_hint, self.payload.clone().into());
            sink(item);
        }
    }
}

impl Drop for ItemHandle {
    fn drop(&mut self) {
        self.commit_internal();
    }
}
