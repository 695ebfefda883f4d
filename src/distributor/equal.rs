//! Static, hash-bucket distribution: one FIFO per worker, fixed at first
//! push.

use super::{GetItemRequest, PackageDistributor};
use crate::error::{Error, Result};
use crate::item::Item;
use crate::node::NodeId;
use crate::protocol::{QueueEmptyReason, Transport, WireMessage};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

struct WorkerTable {
    nodes: Vec<NodeId>,
    index_of: HashMap<NodeId, usize>,
    queues: Vec<Mutex<VecDeque<Item>>>,
}

/// Distributes items to workers by partitioning `[0, 1)` into N equal
/// buckets. The worker table is allocated lazily on first [`push`](Self::push)
/// and is immutable afterward.
pub struct EqualDistributor {
    transport: Arc<dyn Transport>,
    pending_nodes: Mutex<Option<Vec<NodeId>>>,
    table: Mutex<Option<WorkerTable>>,
}

impl EqualDistributor {
    /// Create a distributor that sends replies over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            pending_nodes: Mutex::new(None),
            table: Mutex::new(None),
        }
    }

    fn bucket_for(nodes: &[NodeId], position_hint: f64) -> usize {
        let n = nodes.len();
        let abs_pos = n as f64 * position_hint;
        (abs_pos.floor() as isize).clamp(0, n as isize - 1) as usize
    }
}

#[async_trait::async_trait]
impl PackageDistributor for EqualDistributor {
    fn push(&self, item: Item) {
        let mut table = self.table.lock();
        if table.is_none() {
            let nodes = self
                .pending_nodes
                .lock()
                .clone()
                .unwrap_or_default();
            let index_of = nodes
                .iter()
                .enumerate()
                .map(|(i, n)| (*n, i))
                .collect();
            let queues = nodes.iter().map(|_| Mutex::new(VecDeque::new())).collect();
            *table = Some(WorkerTable {
                nodes,
                index_of,
                queues,
            });
        }
        let table = table.as_ref().expect("just allocated");
        if table.nodes.is_empty() {
            warn!("equal distributor has no workers; dropping pushed item");
            return;
        }
        let bucket = Self::bucket_for(&table.nodes, item.position_hint);
        table.queues[bucket].lock().push_back(item);
    }

    async fn handle_get_item(&self, request: GetItemRequest) -> Result<()> {
        let popped: Vec<Item> = {
            let table = self.table.lock();
            let table = match table.as_ref() {
                Some(t) => t,
                None => return Err(Error::UnknownWorker(request.node_id)),
            };
            let &index = table
                .index_of
                .get(&request.node_id)
                .ok_or(Error::UnknownWorker(request.node_id))?;
            let mut queue = table.queues[index].lock();
            let n = (request.n_requested as usize).min(queue.len());
            queue.drain(..n).collect()
        };

        let delivered = popped.len() as u32;
        for item in popped {
            self.transport
                .send(
                    request.node_id,
                    WireMessage::QueueItem {
                        wait: false,
                        payload: Some(item.payload),
                    },
                )
                .await?;
        }

        if delivered < request.n_requested {
            self.transport
                .send(
                    request.node_id,
                    WireMessage::QueueEmpty(QueueEmptyReason::FromDistributor {
                        request_id: request.request_id,
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn notify_queue_end(&self) {
        debug!("equal distributor: queue end");
    }

    async fn set_workers(&self, workers: Vec<NodeId>) -> Result<()> {
        if self.table.lock().is_some() {
            return Err(Error::WorkerTableFixed);
        }
        *self.pending_nodes.lock() = Some(workers);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChannelTransport;
    use std::sync::Arc;

    fn item(seq: u64, pos: f64) -> Item {
        Item::new(seq, pos, Arc::from(vec![seq as u8]))
    }

    #[tokio::test]
    async fn routes_by_equal_buckets() {
        let transport = Arc::new(ChannelTransport::new());
        let workers: Vec<NodeId> = (0..4).map(|_| NodeId::new()).collect();
        let mut receivers = Vec::new();
        for w in &workers {
            receivers.push(transport.register(*w));
        }

        let dist = EqualDistributor::new(transport.clone());
        dist.set_workers(workers.clone()).await.unwrap();

        for (seq, pos) in [(1u64, 0.1), (2, 0.3), (3, 0.6), (4, 0.9)] {
            dist.push(item(seq, pos));
        }

        for (i, w) in workers.iter().enumerate() {
            dist.handle_get_item(GetItemRequest {
                node_id: *w,
                n_requested: 10,
                score: 0.0,
                slave_instance_id: 0,
                request_id: i as i32,
            })
            .await
            .unwrap();
        }

        for (i, rx) in receivers.iter_mut().enumerate() {
            let first = rx.recv().await.unwrap();
            match first {
                WireMessage::QueueItem { payload: Some(p), .. } => {
                    assert_eq!(p[0], (i + 1) as u8);
                }
                other => panic!("expected item, got {other:?}"),
            }
            match rx.recv().await.unwrap() {
                WireMessage::QueueEmpty(QueueEmptyReason::FromDistributor { request_id }) => {
                    assert_eq!(request_id, i as i32)
                }
                other => panic!("expected empty, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn set_workers_rejected_after_first_push() {
        let transport = Arc::new(ChannelTransport::new());
        let dist = EqualDistributor::new(transport);
        let workers = vec![NodeId::new(), NodeId::new()];
        dist.set_workers(workers.clone()).await.unwrap();
        dist.push(item(1, 0.2));

        let err = dist.set_workers(workers).await.unwrap_err();
        assert!(matches!(err, Error::WorkerTableFixed));
    }
}
