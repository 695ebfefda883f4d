//! Producer endpoint: owns a distributor, forwards worker commands into it.

use crate::distributor::{GetItemRequest, PackageDistributor, SlaveFeedback};
use crate::error::Result;
use crate::item::ItemHandle;
use crate::node::NodeId;
use crate::protocol::{Transport, WireMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// The producer side of the queue: registers command handlers and owns a
/// [`PackageDistributor`].
pub struct Producer {
    distributor: Arc<dyn PackageDistributor>,
    transport: Arc<dyn Transport>,
    next_sequence: AtomicU64,
}

impl Producer {
    /// Create a producer that places items with `distributor` and replies
    /// over `transport`.
    pub fn new(distributor: Arc<dyn PackageDistributor>, transport: Arc<dyn Transport>) -> Self {
        Self {
            distributor,
            transport,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Begin enqueuing an item at `position_hint`. The returned handle
    /// commits into the distributor on drop or on an explicit `commit()`.
    pub fn push(&self, position_hint: f64) -> ItemHandle {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let distributor = Arc::clone(&self.distributor);
        ItemHandle::new(
            sequence,
            position_hint,
            Box::new(move |item| distributor.push(item)),
        )
    }

    /// Forward a peer's worker-table announcement into the distributor, then
    /// broadcast the updated peer set to every worker so thieves can seed
    /// their victim lists. Grounded on `updateNodeInfo()`'s
    /// `CMD_QUEUE_VICTIM_DATA` broadcast on every node-set change.
    pub async fn set_workers(&self, workers: Vec<NodeId>) -> Result<()> {
        self.distributor.set_workers(workers.clone()).await?;
        for &node in &workers {
            self.transport
                .send(
                    node,
                    WireMessage::QueueVictimData {
                        peers: workers.clone(),
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// Handle a `GET_ITEM` command from a worker.
    pub async fn handle_get_item(&self, request: GetItemRequest) -> Result<()> {
        self.distributor.handle_get_item(request).await
    }

    /// Handle a `SLAVE_FEEDBACK` command from a worker.
    pub async fn handle_slave_feedback(&self, node: NodeId, feedback: SlaveFeedback) {
        self.distributor.handle_slave_feedback(node, feedback).await;
    }

    /// Handle a `STEAL_ITEM` command directed at the producer. The producer
    /// is never a steal victim, so this always replies `QUEUE_DENY_MASTER`.
    pub async fn handle_steal_item(&self, node: NodeId, request_id: i32) -> Result<()> {
        warn!(%node, request_id, "rejecting steal attempt at producer");
        self.transport
            .send(node, WireMessage::QueueDenyMaster { request_id })
            .await
    }

    /// Notify the distributor that the current enqueue batch has drained.
    pub async fn notify_queue_end(&self) {
        self.distributor.notify_queue_end().await;
    }
}
