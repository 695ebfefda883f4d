//! Centroidal, load-aware distribution.
//!
//! Workers live on the ring `[0, 1)`. Each [`handle_get_item`](CentroidalDistributor::handle_get_item)
//! call nudges worker positions toward a weighted centroid of their observed
//! delivery share (a 1-D Lloyd relaxation step) before selecting items
//! nearest the requesting worker.

use super::{GetItemRequest, PackageDistributor, SlaveFeedback};
use crate::config::{Config, IdleLimitPolicy};
use crate::error::{Error, Result};
use crate::item::Item;
use crate::node::NodeId;
use crate::protocol::{QueueEmptyReason, Transport, WireMessage};
use crate::spatial_map::SpatialItemMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, trace};

#[derive(Debug, Clone, Copy)]
struct NodeInfo {
    position: f64,
    dist_left: f64,
    dist_right: f64,
    total_score: f64,
    total_load: f64,
    idle_counter: u64,
}

struct State {
    nodes: IndexMap<NodeId, NodeInfo>,
    score_window: VecDeque<(f64, NodeId)>,
    total_score: f64,
    /// Sum of every delivered item's score since the last `notify_queue_end`,
    /// across all workers. Unwindowed, unlike `total_score`.
    total_load: f64,
}

/// Load-aware distributor that relaxes worker positions on the ring toward a
/// weighted centroid of recent delivery activity.
pub struct CentroidalDistributor {
    transport: Arc<dyn Transport>,
    config: Config,
    item_map: SpatialItemMap,
    state: Mutex<State>,
}

impl CentroidalDistributor {
    /// Create a distributor that sends replies over `transport`, tuned by
    /// `config`.
    pub fn new(transport: Arc<dyn Transport>, config: Config) -> Self {
        let item_map = SpatialItemMap::new(1.0, config.max_distance);
        Self {
            transport,
            config,
            item_map,
            state: Mutex::new(State {
                nodes: IndexMap::new(),
                score_window: VecDeque::new(),
                total_score: 0.0,
                total_load: 0.0,
            }),
        }
    }

    fn init_workers(state: &mut State, nodes: Vec<NodeId>) {
        let n = nodes.len();
        state.nodes.clear();
        state.score_window.clear();
        state.total_score = 0.0;
        state.total_load = 0.0;
        for (i, node) in nodes.into_iter().enumerate() {
            let position = (i as f64 + 0.5) / n as f64;
            let span = 1.0 / n as f64;
            state.nodes.insert(
                node,
                NodeInfo {
                    position,
                    dist_left: span,
                    dist_right: span,
                    total_score: 0.0,
                    total_load: 0.0,
                    idle_counter: 0,
                },
            );
        }
    }

    /// Lloyd relaxation step: recompute every worker's position as the
    /// midpoint of its score-weighted Voronoi cell boundaries, then refresh
    /// each worker's `(dist_left, dist_right)` from the committed positions.
    fn update_workers(state: &mut State) {
        if state.total_score <= f64::EPSILON {
            return;
        }
        let n = state.nodes.len();
        if n < 2 {
            return;
        }

        let positions: Vec<f64> = state.nodes.values().map(|i| i.position).collect();
        let scores: Vec<f64> = state.nodes.values().map(|i| i.total_score).collect();

        let mut new_positions = vec![0.0f64; n];
        for i in 0..n {
            let prev = (i + n - 1) % n;
            let next = (i + 1) % n;

            let pos_prev = unwrap_toward(positions[i], positions[prev], true);
            let pos_next = unwrap_toward(positions[i], positions[next], false);

            let s_prev = scores[prev] + 1.0;
            let s_i = scores[i] + 1.0;
            let s_next = scores[next] + 1.0;

            let prev_border = (pos_prev * s_i + positions[i] * s_prev) / (s_prev + s_i);
            let next_border = (positions[i] * s_next + pos_next * s_i) / (s_i + s_next);
            new_positions[i] = (prev_border + next_border) / 2.0;
        }
        for p in new_positions.iter_mut() {
            *p = p.rem_euclid(1.0);
        }

        for (i, (_, info)) in state.nodes.iter_mut().enumerate() {
            info.position = new_positions[i];
        }
        for i in 0..n {
            let prev = (i + n - 1) % n;
            let next = (i + 1) % n;
            let pos_prev = unwrap_toward(new_positions[i], new_positions[prev], true);
            let pos_next = unwrap_toward(new_positions[i], new_positions[next], false);
            let info = &mut state.nodes[i];
            info.dist_left = new_positions[i] - pos_prev;
            info.dist_right = pos_next - new_positions[i];
        }
    }

    fn update_scores(&self, state: &mut State, score: f64, node: NodeId) {
        state.score_window.push_back((score, node));
        if let Some(info) = state.nodes.get_mut(&node) {
            info.total_score += score;
            info.total_load += score;
        }
        state.total_load += score;
        if state.score_window.len() > self.config.score_window {
            if let Some((s0, n0)) = state.score_window.pop_front() {
                if let Some(info) = state.nodes.get_mut(&n0) {
                    info.total_score -= s0;
                }
            }
        }
        state.total_score = state.score_window.iter().map(|(s, _)| *s).sum();
    }
}

/// Reflect `neighbor` across the ring boundary so it compares directly
/// against `center` without wraparound, based on which side it sits on.
fn unwrap_toward(center: f64, neighbor: f64, is_prev: bool) -> f64 {
    if is_prev {
        if neighbor > center {
            neighbor - 1.0
        } else {
            neighbor
        }
    } else if neighbor < center {
        neighbor + 1.0
    } else {
        neighbor
    }
}

#[async_trait::async_trait]
impl PackageDistributor for CentroidalDistributor {
    fn push(&self, item: Item) {
        self.item_map.insert(item.position_hint, item);
    }

    async fn handle_get_item(&self, request: GetItemRequest) -> Result<()> {
        let (position, dist_left, dist_right) = {
            let mut state = self.state.lock();
            Self::update_workers(&mut state);
            let info = state
                .nodes
                .get(&request.node_id)
                .copied()
                .ok_or(Error::UnknownWorker(request.node_id))?;
            (info.position, info.dist_left, info.dist_right)
        };

        if dist_left > 0.0 && dist_right > 0.0 {
            self.item_map.set_max_distance(dist_left, dist_right);
        }

        let out = self
            .item_map
            .try_remove(request.n_requested as usize, position);
        let delivered = out.len() as u32;

        for item in out {
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

        if delivered > 0 {
            let mut state = self.state.lock();
            for _ in 0..delivered {
                self.update_scores(&mut state, 1.0, request.node_id);
            }
            if let Some(info) = state.nodes.get_mut(&request.node_id) {
                info.idle_counter = 0;
            }
        }

        if delivered < request.n_requested {
            if self.item_map.is_empty() {
                self.transport
                    .send(
                        request.node_id,
                        WireMessage::QueueEmpty(QueueEmptyReason::FromDistributor {
                            request_id: request.request_id,
                        }),
                    )
                    .await?;
                let mut state = self.state.lock();
                if let Some(info) = state.nodes.get_mut(&request.node_id) {
                    info.idle_counter = 0;
                }
            } else {
                self.transport
                    .send(
                        request.node_id,
                        WireMessage::QueueItem {
                            wait: true,
                            payload: None,
                        },
                    )
                    .await?;

                let overrun = {
                    let mut state = self.state.lock();
                    let info = state
                        .nodes
                        .get_mut(&request.node_id)
                        .ok_or(Error::UnknownWorker(request.node_id))?;
                    info.idle_counter += 1;
                    (info.idle_counter > self.config.idle_limit).then_some(info.idle_counter)
                };

                if let Some(count) = overrun {
                    match self.config.idle_limit_policy {
                        IdleLimitPolicy::LogAndError => {
                            error!(node = %request.node_id, count, "idle limit exceeded");
                            return Err(Error::IdleLimitExceeded {
                                node: request.node_id,
                                count,
                            });
                        }
                        IdleLimitPolicy::Reset => {
                            let mut state = self.state.lock();
                            if let Some(info) = state.nodes.get_mut(&request.node_id) {
                                info.idle_counter = 0;
                            }
                        }
                    }
                }
            }
        }

        trace!(node = %request.node_id, delivered, "handled get_item");
        Ok(())
    }

    async fn handle_slave_feedback(&self, node: NodeId, feedback: SlaveFeedback) {
        debug!(%node, starving = feedback.starving, "slave feedback");
    }

    async fn notify_queue_end(&self) {
        let mut state = self.state.lock();
        for info in state.nodes.values_mut() {
            info.total_load = 0.0;
        }
        state.total_load = 0.0;
        debug!("centroidal distributor: queue end, total_load reset");
    }

    async fn set_workers(&self, workers: Vec<NodeId>) -> Result<()> {
        let mut state = self.state.lock();
        if state.nodes.is_empty() {
            Self::init_workers(&mut state, workers);
        } else {
            debug!("centroidal worker table already initialized; ignoring set_workers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChannelTransport;

    fn distributor(n: usize) -> (Arc<CentroidalDistributor>, Vec<NodeId>, ChannelTransport) {
        let transport = ChannelTransport::new();
        let dist = Arc::new(CentroidalDistributor::new(
            Arc::new(transport.clone()),
            Config::default(),
        ));
        let nodes: Vec<NodeId> = (0..n).map(|_| NodeId::new()).collect();
        (dist, nodes, transport)
    }

    #[tokio::test]
    async fn init_workers_places_n3_evenly() {
        let (dist, nodes, _transport) = distributor(3);
        dist.set_workers(nodes.clone()).await.unwrap();

        let state = dist.state.lock();
        let positions: Vec<f64> = state.nodes.values().map(|i| i.position).collect();
        for (got, want) in positions.iter().zip([1.0 / 6.0, 0.5, 5.0 / 6.0]) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
        for info in state.nodes.values() {
            assert!((info.dist_left - 1.0 / 3.0).abs() < 1e-9);
            assert!((info.dist_right - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn update_favors_high_score_neighbor() {
        let (dist, nodes, _transport) = distributor(3);
        dist.set_workers(nodes.clone()).await.unwrap();

        {
            let mut state = dist.state.lock();
            for _ in 0..40 {
                dist.update_scores(&mut state, 10.0, nodes[1]);
            }
        }
        {
            let mut state = dist.state.lock();
            CentroidalDistributor::update_workers(&mut state);
            // Higher score widens a worker's own cell: the shared borders on
            // both sides of node[1] pull toward its neighbors, so node[0]'s
            // and node[2]'s territory shrinks on the side facing node[1].
            let w0 = state.nodes.get(&nodes[0]).unwrap();
            let w2 = state.nodes.get(&nodes[2]).unwrap();
            assert!(w0.dist_right > w0.dist_left);
            assert!(w2.dist_left > w2.dist_right);
            let w1 = state.nodes.get(&nodes[1]).unwrap();
            assert!((w1.position - 0.5).abs() < 1e-9);
            assert!(w1.dist_left > 1.0 / 3.0);
            assert!(w1.dist_right > 1.0 / 3.0);
        }
    }

    #[tokio::test]
    async fn delivers_nearest_item_and_updates_score() {
        let (dist, nodes, transport) = distributor(1);
        dist.set_workers(nodes.clone()).await.unwrap();
        let mut rx = transport.register(nodes[0]);

        dist.push(Item::new(1, 0.5, Arc::from(vec![42u8])));

        dist.handle_get_item(GetItemRequest {
            node_id: nodes[0],
            n_requested: 1,
            score: 0.0,
            slave_instance_id: 0,
            request_id: 1,
        })
        .await
        .unwrap();

        match rx.recv().await.unwrap() {
            WireMessage::QueueItem {
                wait: false,
                payload: Some(p),
            } => assert_eq!(p[0], 42),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn idle_limit_exceeded_surfaces_error() {
        let nodes: Vec<NodeId> = (0..3).map(|_| NodeId::new()).collect();
        let config = Config::default().with_idle_limit(2, IdleLimitPolicy::LogAndError);
        let transport = ChannelTransport::new();
        let dist = Arc::new(CentroidalDistributor::new(Arc::new(transport.clone()), config));
        dist.set_workers(nodes.clone()).await.unwrap();
        let _rx = transport.register(nodes[0]);
        let _rx1 = transport.register(nodes[1]);
        let _rx2 = transport.register(nodes[2]);

        // node[0] sits at position 1/6 with radius 1/3, node[1] at 1/2. An
        // item at 0.6 sits squarely in node[1]'s cell (ring distance ~0.43
        // from node[0], past its 1/3 radius), so every poll from node[0] is
        // a heartbeat miss rather than an empty-queue signal, as long as
        // node[1] never polls for it.
        dist.push(Item::new(1, 0.6, Arc::from(vec![1u8])));

        let req = GetItemRequest {
            node_id: nodes[0],
            n_requested: 1,
            score: 0.0,
            slave_instance_id: 0,
            request_id: 1,
        };
        let _ = dist.handle_get_item(req).await;
        let _ = dist.handle_get_item(req).await;
        let third = dist.handle_get_item(req).await;
        assert!(matches!(third, Err(Error::IdleLimitExceeded { .. })));
    }

    #[tokio::test]
    async fn total_load_accumulates_globally_and_resets_on_queue_end() {
        let (dist, nodes, transport) = distributor(1);
        dist.set_workers(nodes.clone()).await.unwrap();
        let _rx = transport.register(nodes[0]);

        dist.push(Item::new(1, 0.5, Arc::from(vec![1u8])));
        dist.push(Item::new(2, 0.5, Arc::from(vec![2u8])));
        dist.handle_get_item(GetItemRequest {
            node_id: nodes[0],
            n_requested: 2,
            score: 0.0,
            slave_instance_id: 0,
            request_id: 1,
        })
        .await
        .unwrap();

        {
            let state = dist.state.lock();
            assert!((state.total_load - 2.0).abs() < 1e-9);
            let info = state.nodes.get(&nodes[0]).unwrap();
            assert!((info.total_load - 2.0).abs() < 1e-9);
        }

        dist.notify_queue_end().await;
        let state = dist.state.lock();
        assert_eq!(state.total_load, 0.0);
        assert_eq!(state.nodes.get(&nodes[0]).unwrap().total_load, 0.0);
    }

    #[tokio::test]
    async fn idle_counter_resets_once_map_drains_to_empty() {
        let nodes: Vec<NodeId> = (0..3).map(|_| NodeId::new()).collect();
        let config = Config::default().with_idle_limit(5, IdleLimitPolicy::LogAndError);
        let transport = ChannelTransport::new();
        let dist = Arc::new(CentroidalDistributor::new(Arc::new(transport.clone()), config));
        dist.set_workers(nodes.clone()).await.unwrap();
        let _rx0 = transport.register(nodes[0]);
        let _rx1 = transport.register(nodes[1]);
        let _rx2 = transport.register(nodes[2]);

        // Item sits in node[1]'s cell, out of node[0]'s radius: node[0]'s
        // polls miss without draining the map, bumping its idle_counter.
        dist.push(Item::new(1, 0.6, Arc::from(vec![1u8])));
        let req0 = GetItemRequest {
            node_id: nodes[0],
            n_requested: 1,
            score: 0.0,
            slave_instance_id: 0,
            request_id: 1,
        };
        dist.handle_get_item(req0).await.unwrap();
        dist.handle_get_item(req0).await.unwrap();
        {
            let state = dist.state.lock();
            assert!(state.nodes.get(&nodes[0]).unwrap().idle_counter > 0);
        }

        // node[1] drains the map; node[0]'s next poll now hits the
        // `item_map.is_empty()` branch and must reset its idle_counter too.
        dist.handle_get_item(GetItemRequest {
            node_id: nodes[1],
            n_requested: 1,
            score: 0.0,
            slave_instance_id: 0,
            request_id: 2,
        })
        .await
        .unwrap();
        dist.handle_get_item(req0).await.unwrap();
        let state = dist.state.lock();
        assert_eq!(state.nodes.get(&nodes[0]).unwrap().idle_counter, 0);
    }
}
