//! The stealing side of a work-stealing worker.
//!
//! Runs as its own task, concurrently with the consumer's command-handling
//! task. It owns the victim list and probes peers whenever the local queues
//! run low.

use super::fifo::Fifo;
use crate::config::Config;
use crate::error::Error;
use crate::node::NodeId;
use crate::protocol::{Transport, WireMessage};
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, trace, warn};

/// A candidate peer a thief may steal from.
#[derive(Debug, Clone, Copy)]
struct Victim {
    node: NodeId,
    cooldown_until: Instant,
}

/// Events a consumer's command handlers forward into the thief's private
/// channel while a steal episode is in flight.
#[derive(Debug, Clone)]
pub enum ThiefEvent {
    StolenItem(Arc<[u8]>),
    Deny { request_id: i32 },
    DenyMaster,
    Empty { n_delivered: u32 },
}

/// Handle used by a [`crate::consumer::Consumer`] to talk to its thief:
/// forward wire events in, and reseed the victim list when the peer set
/// changes.
#[derive(Clone)]
pub struct ThiefHandle {
    events: mpsc::UnboundedSender<ThiefEvent>,
    victims: Arc<SyncMutex<Vec<Victim>>>,
}

impl ThiefHandle {
    pub fn forward(&self, event: ThiefEvent) {
        let _ = self.events.send(event);
    }

    /// Replace the victim list, excluding `self_id` and `producer_id`, and
    /// shuffle it. Called when the peer set changes (e.g. on receipt of
    /// `QUEUE_VICTIM_DATA`).
    pub fn reseed(&self, peers: &[NodeId], self_id: NodeId, producer_id: NodeId) {
        use rand::seq::SliceRandom;
        let mut candidates: Vec<Victim> = peers
            .iter()
            .filter(|p| **p != self_id && **p != producer_id)
            .map(|p| Victim {
                node: *p,
                cooldown_until: Instant::now(),
            })
            .collect();
        candidates.shuffle(&mut rand::thread_rng());
        *self.victims.lock() = candidates;
    }

    /// Relegate `node` to the back of the victim list with a short cooldown.
    /// Called from the consumer's `STEAL_ITEM` handler when it rate-limits
    /// the peer that just stole from it.
    pub fn relegate(&self, node: NodeId, cooldown: Duration) {
        let mut victims = self.victims.lock();
        if let Some(pos) = victims.iter().position(|v| v.node == node) {
            let mut v = victims.remove(pos);
            v.cooldown_until = Instant::now() + cooldown;
            victims.push(v);
        } else {
            victims.push(Victim {
                node,
                cooldown_until: Instant::now() + cooldown,
            });
        }
    }
}

/// The background thief task for one worker.
pub struct Thief {
    self_id: NodeId,
    transport: Arc<dyn Transport>,
    config: Config,
    queue_left: Arc<Fifo>,
    queue_right: Arc<Fifo>,
    victims: Arc<SyncMutex<Vec<Victim>>>,
    cursor: AtomicUsize,
    next_request_id: AtomicI32,
    events: AsyncMutex<mpsc::UnboundedReceiver<ThiefEvent>>,
}

impl Thief {
    /// Create a thief and the handle its owning consumer uses to drive it.
    pub fn new(
        self_id: NodeId,
        transport: Arc<dyn Transport>,
        config: Config,
        queue_left: Arc<Fifo>,
        queue_right: Arc<Fifo>,
    ) -> (Self, ThiefHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let victims = Arc::new(SyncMutex::new(Vec::new()));
        let handle = ThiefHandle {
            events: tx,
            victims: Arc::clone(&victims),
        };
        let thief = Self {
            self_id,
            transport,
            config,
            queue_left,
            queue_right,
            victims,
            cursor: AtomicUsize::new(0),
            next_request_id: AtomicI32::new(0),
            events: AsyncMutex::new(rx),
        };
        (thief, handle)
    }

    /// Run the probe loop until the process shuts down. Intended to be
    /// spawned as its own task alongside the consumer's command loop.
    pub async fn run(&self) {
        loop {
            self.tick().await;
        }
    }

    /// One iteration of the probe loop: returns quickly (after a short sleep)
    /// when the local queues are sufficiently full, otherwise runs one full
    /// steal episode against the next eligible victim.
    async fn tick(&self) {
        let local_total = self.queue_left.len() + self.queue_right.len();
        if local_total > self.config.prefetch_mark as usize {
            tokio::time::sleep(Duration::from_millis(20)).await;
            return;
        }

        let victim = {
            let victims = self.victims.lock();
            if victims.is_empty() {
                None
            } else {
                let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % victims.len();
                Some(victims[idx])
            }
        };

        let Some(victim) = victim else {
            tokio::time::sleep(Duration::from_millis(20)).await;
            return;
        };

        if Instant::now() < victim.cooldown_until {
            return;
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        trace!(self = %self.self_id, victim = %victim.node, request_id, "probing victim");
        if self
            .transport
            .send(
                victim.node,
                WireMessage::StealItem {
                    ratio: self.config.steal_ratio,
                    slave_instance_id: 0,
                    request_id,
                },
            )
            .await
            .is_err()
        {
            return;
        }

        self.drain_episode(victim.node, request_id).await;
    }

    async fn drain_episode(&self, victim_node: NodeId, request_id: i32) {
        let mut received = 0u32;
        loop {
            let event = {
                let mut events = self.events.lock().await;
                tokio::time::timeout(self.config.steal_recv_timeout, events.recv()).await
            };

            match event {
                Ok(Some(ThiefEvent::StolenItem(payload))) => {
                    self.queue_left.push_back(payload);
                    received += 1;
                }
                Ok(Some(ThiefEvent::Deny { request_id: rid })) if rid == request_id => {
                    self.relegate(victim_node, Duration::from_millis(100));
                    return;
                }
                Ok(Some(ThiefEvent::Deny { .. })) => {
                    // Stale reply from an earlier episode; ignore and keep draining.
                }
                Ok(Some(ThiefEvent::DenyMaster)) => {
                    self.erase(victim_node);
                    return;
                }
                Ok(Some(ThiefEvent::Empty { n_delivered })) => {
                    if n_delivered != received {
                        let err = Error::StealCountMismatch {
                            expected: n_delivered,
                            observed: received,
                        };
                        warn!(%victim_node, request_id, %err, "steal episode ended in error");
                    }
                    return;
                }
                Ok(None) => return, // channel closed, shutting down
                Err(_elapsed) => {
                    trace!(%victim_node, "steal receive timed out");
                    return;
                }
            }
        }
    }

    fn relegate(&self, node: NodeId, cooldown: Duration) {
        let mut victims = self.victims.lock();
        if let Some(pos) = victims.iter().position(|v| v.node == node) {
            let mut v = victims.remove(pos);
            v.cooldown_until = Instant::now() + cooldown;
            victims.push(v);
        }
        debug!(%node, "relegated victim");
    }

    fn erase(&self, node: NodeId) {
        self.victims.lock().retain(|v| v.node != node);
        debug!(%node, "erased victim permanently");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChannelTransport;

    fn thief_with(n_victims: usize) -> (Thief, ThiefHandle, Vec<NodeId>, Arc<ChannelTransport>) {
        let transport = Arc::new(ChannelTransport::new());
        let self_id = NodeId::new();
        let victims: Vec<NodeId> = (0..n_victims).map(|_| NodeId::new()).collect();
        let (thief, handle) = Thief::new(
            self_id,
            transport.clone(),
            Config::default(),
            Arc::new(Fifo::new()),
            Arc::new(Fifo::new()),
        );
        handle.reseed(&victims, self_id, NodeId::new());
        (thief, handle, victims, transport)
    }

    #[tokio::test]
    async fn reseed_excludes_self_and_producer() {
        let transport = Arc::new(ChannelTransport::new());
        let self_id = NodeId::new();
        let producer_id = NodeId::new();
        let other = NodeId::new();
        let (_thief, handle) = Thief::new(
            self_id,
            transport,
            Config::default(),
            Arc::new(Fifo::new()),
            Arc::new(Fifo::new()),
        );
        handle.reseed(&[self_id, producer_id, other], self_id, producer_id);
        let victims = handle.victims.lock();
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0].node, other);
    }

    #[tokio::test]
    async fn drain_episode_counts_stolen_items_and_stops_on_empty() {
        let (thief, handle, victims, _transport) = thief_with(1);
        let victim = victims[0];

        let events_task = {
            let handle = handle.clone();
            tokio::spawn(async move {
                handle.forward(ThiefEvent::StolenItem(Arc::from(vec![1u8])));
                handle.forward(ThiefEvent::StolenItem(Arc::from(vec![2u8])));
                handle.forward(ThiefEvent::Empty { n_delivered: 2 });
            })
        };
        events_task.await.unwrap();

        thief.drain_episode(victim, 0).await;
        assert_eq!(thief.queue_left.len(), 2);
    }

    #[tokio::test]
    async fn deny_relegates_victim() {
        let (thief, _handle, victims, _transport) = thief_with(2);
        let victim = victims[0];
        // Simulate a deny by calling relegate directly, as the episode would.
        thief.relegate(victim, Duration::from_secs(60));
        let locked = thief.victims.lock();
        assert!(Instant::now() < locked.last().unwrap().cooldown_until);
    }

    #[tokio::test]
    async fn deny_master_erases_victim() {
        let (thief, _handle, victims, _transport) = thief_with(2);
        let victim = victims[0];
        thief.erase(victim);
        let locked = thief.victims.lock();
        assert!(!locked.iter().any(|v| v.node == victim));
    }
}
