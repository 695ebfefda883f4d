//! Wire messages exchanged between producer and workers, and the narrow
//! transport contract this crate depends on rather than implements.

use crate::node::NodeId;
use std::sync::Arc;

/// A single wire message. Field order matches the normative layout; framing
/// itself is the connection layer's job, not this crate's.
#[derive(Debug, Clone)]
pub enum WireMessage {
    /// Worker asks the producer for up to `n_requested` items.
    GetItem {
        n_requested: u32,
        score: f32,
        slave_instance_id: u32,
        request_id: i32,
    },
    /// Producer delivers (or heartbeats, if `wait` and no payload) one item.
    QueueItem {
        wait: bool,
        payload: Option<Arc<[u8]>>,
    },
    /// Load-aware delivery to a worker's left queue.
    QueueItemLeft { payload: Arc<[u8]> },
    /// Load-aware delivery to a worker's right queue.
    QueueItemRight { payload: Arc<[u8]> },
    /// Producer reports no more items for the given request (or a victim
    /// reports how many it delivered during a steal episode).
    QueueEmpty(QueueEmptyReason),
    /// Producer signals the whole queue has drained.
    MasterQueueEmpty,
    /// A thief asks a peer worker to hand over part of its queue.
    StealItem {
        ratio: u32,
        slave_instance_id: u32,
        request_id: i32,
    },
    /// A victim hands over one stolen item.
    StolenItem { payload: Arc<[u8]> },
    /// A victim declines a steal request (has too little to offer).
    QueueDeny { request_id: i32 },
    /// The producer declines a steal request directed at it (always, since
    /// the producer is never a steal victim).
    QueueDenyMaster { request_id: i32 },
    /// A worker reports queue health to the producer.
    SlaveFeedback {
        starving: bool,
        time: i64,
        right: bool,
    },
    /// Producer bootstraps a worker's peer set for stealing.
    QueueVictimData { peers: Vec<NodeId> },
}

/// `QUEUE_EMPTY` is overloaded: from the distributor it carries the request
/// id that came up empty; from a steal victim it carries how many items it
/// actually delivered. Modeled as a tagged union instead of a single
/// context-dependent field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEmptyReason {
    /// Sent by the producer: no items matched `request_id`.
    FromDistributor { request_id: i32 },
    /// Sent by a steal victim: exactly `n_delivered` `StolenItem`s preceded
    /// this message.
    FromVictim { n_delivered: u32 },
}

/// Minimal send contract the producer and consumer protocol depend on.
///
/// A real deployment backs this with the connection/transport layer (out of
/// scope for this crate); tests and examples use [`ChannelTransport`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `msg` to `to`. Errors if there is no route to that peer or the
    /// channel has been closed.
    async fn send(&self, to: NodeId, msg: WireMessage) -> crate::error::Result<()>;
}

/// An in-process [`Transport`] backed by per-node `tokio::mpsc` channels.
///
/// Lets a single process host a producer and several simulated worker
/// endpoints exchanging real [`WireMessage`]s, without a network stack.
#[derive(Clone, Default)]
pub struct ChannelTransport {
    routes: Arc<dashmap::DashMap<NodeId, tokio::sync::mpsc::UnboundedSender<WireMessage>>>,
}

impl ChannelTransport {
    /// Create an empty transport with no registered routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `node` as a recipient, returning the receiving half of its
    /// inbound channel.
    pub fn register(&self, node: NodeId) -> tokio::sync::mpsc::UnboundedReceiver<WireMessage> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.routes.insert(node, tx);
        rx
    }

    /// Remove `node`'s route, if any.
    pub fn unregister(&self, node: &NodeId) {
        self.routes.remove(node);
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, to: NodeId, msg: WireMessage) -> crate::error::Result<()> {
        let tx = self
            .routes
            .get(&to)
            .ok_or(crate::error::Error::NoRoute(to))?;
        tx.send(msg).map_err(|_| crate::error::Error::ChannelClosed)
    }
}
