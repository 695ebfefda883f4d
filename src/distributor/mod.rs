//! The polymorphic surface the producer drives to place items on workers.

pub mod centroidal;
pub mod equal;

use crate::error::Result;
use crate::item::Item;
use crate::node::NodeId;

/// Request carried by a `GET_ITEM` wire message.
#[derive(Debug, Clone, Copy)]
pub struct GetItemRequest {
    pub node_id: NodeId,
    pub n_requested: u32,
    pub score: f32,
    pub slave_instance_id: u32,
    pub request_id: i32,
}

/// Queue-health report carried by a `SLAVE_FEEDBACK` wire message.
#[derive(Debug, Clone, Copy)]
pub struct SlaveFeedback {
    pub starving: bool,
    pub time: i64,
    pub right: bool,
}

/// A handle returned by [`crate::consumer::Consumer::send_feedback`].
///
/// The caller may adjust nothing further (the reading is fixed at
/// construction) and either call [`SlaveFeedbackHandle::commit`] explicitly
/// or let the handle drop, at which point it fires automatically. This
/// mirrors [`crate::item::ItemHandle`]: the source library's `SlaveFeedback`
/// was itself a scope-acquired `DataOStream` that sent on destruction.
pub struct SlaveFeedbackHandle {
    feedback: SlaveFeedback,
    sink: Option<Box<dyn FnOnce(SlaveFeedback) + Send>>,
    committed: bool,
}

impl SlaveFeedbackHandle {
    pub(crate) fn new(feedback: SlaveFeedback, sink: Box<dyn FnOnce(SlaveFeedback) + Send>) -> Self {
        Self {
            feedback,
            sink: Some(sink),
            committed: false,
        }
    }

    /// Send the feedback now, rather than waiting for the handle to drop.
    pub fn commit(mut self) {
        self.commit_internal();
    }

    fn commit_internal(&mut self) {
        if self.committed {
            return;
        }
        self.committed = true;
        if let Some(sink) = self.sink.take() {
            sink(self.feedback);
        }
    }
}

impl Drop for SlaveFeedbackHandle {
    fn drop(&mut self) {
        self.commit_internal();
    }
}

/// The capability set a producer needs from a distribution policy.
///
/// Implementations own their worker table and any per-item storage; the
/// producer only forwards commands and the scope-ended item handle into this
/// trait.
#[async_trait::async_trait]
pub trait PackageDistributor: Send + Sync {
    /// Take ownership of a newly pushed item. Synchronous: implementations
    /// only ever touch in-memory, lock-protected storage here.
    fn push(&self, item: Item);

    /// Handle a worker's request for up to `n_requested` items.
    async fn handle_get_item(&self, request: GetItemRequest) -> Result<()>;

    /// Handle a worker's queue-health report. Most policies ignore this.
    async fn handle_slave_feedback(&self, _node: NodeId, _feedback: SlaveFeedback) {}

    /// Called when an enqueue batch is known to have fully drained.
    async fn notify_queue_end(&self);

    /// Announce (or update) the set of workers this distributor serves.
    async fn set_workers(&self, workers: Vec<NodeId>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn feedback(right: bool) -> SlaveFeedback {
        SlaveFeedback {
            starving: true,
            time: 0,
            right,
        }
    }

    #[test]
    fn drop_commits_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        {
            let handle = SlaveFeedbackHandle::new(
                feedback(true),
                Box::new(move |fb| {
                    assert!(fb.right);
                    c.fetch_add(1, Ordering::SeqCst);
                }),
            );
            drop(handle);
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_commit_prevents_double_commit_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handle = SlaveFeedbackHandle::new(
            feedback(false),
            Box::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.commit();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
