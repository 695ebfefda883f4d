//! # taskmesh
//!
//! A producer/worker task queue library: a pluggable family of
//! distributors decide which worker receives which item, and a
//! work-stealing overlay lets idle workers pull from busy peers.
//!
//! ## Core Concepts
//!
//! - **Items**: opaque payloads placed on the queue with a position hint in
//!   `[0, 1)`, committed through a scope-ended [`item::ItemHandle`].
//! - **Distributors**: the [`distributor::PackageDistributor`] trait and its
//!   two implementations — [`distributor::equal::EqualDistributor`] (static
//!   hash buckets) and [`distributor::centroidal::CentroidalDistributor`]
//!   (load-aware, relaxes worker boundaries toward a centroidal Voronoi
//!   partition of the ring).
//! - **Producer**: [`producer::Producer`] owns a distributor and answers
//!   `GET_ITEM`/`SLAVE_FEEDBACK`/`STEAL_ITEM` commands from workers.
//! - **Consumer**: [`consumer::Consumer`] is a worker's queue endpoint —
//!   dual left/right FIFOs fed by the distributor, plus the victim side of
//!   peer steal requests.
//! - **Thief**: [`consumer::thief::Thief`] is the background task that
//!   probes peers for work when a worker's local queues run low.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐        GET_ITEM / SLAVE_FEEDBACK       ┌──────────────────┐
//! │     Producer      │◄─────────────────────────────────────►│     Consumer      │
//! │  (PackageDistributor)  QUEUE_ITEM / QUEUE_EMPTY            │ (queue_left/right) │
//! └──────────────────┘                                        └────────┬─────────┘
//!                                                                       │ runs low
//!                                                                       ▼
//!                                                              ┌──────────────────┐
//!                                                              │       Thief       │
//!                                                              │  STEAL_ITEM ...   │
//!                                                              └────────┬─────────┘
//!                                                                       │
//!                                                          peer Consumer (victim side)
//! ```
//!
//! Framing, connection setup, and authentication are out of scope for this
//! crate; embedders supply a [`protocol::Transport`] implementation. Tests
//! and examples use the in-process [`protocol::ChannelTransport`].
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taskmesh::config::Config;
//! use taskmesh::distributor::centroidal::CentroidalDistributor;
//! use taskmesh::node::NodeId;
//! use taskmesh::producer::Producer;
//! use taskmesh::protocol::ChannelTransport;
//!
//! #[tokio::main]
//! async fn main() -> taskmesh::error::Result<()> {
//!     let transport = Arc::new(ChannelTransport::new());
//!     let distributor = Arc::new(CentroidalDistributor::new(transport.clone(), Config::default()));
//!     let producer = Producer::new(distributor, transport);
//!
//!     let worker = NodeId::new();
//!     producer.set_workers(vec![worker]).await?;
//!
//!     let mut handle = producer.push(0.42);
//!     handle.write(b"payload");
//!     handle.commit();
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Error types and the crate-wide `Result` alias.
pub mod error;

/// Worker identity.
pub mod node;

/// Queue items and the scope-ended handle used to enqueue them.
pub mod item;

/// Concurrent, position-keyed item store used by the centroidal distributor.
pub mod spatial_map;

/// Wire messages and the transport contract the protocol depends on.
pub mod protocol;

/// Runtime configuration shared by the distributors and the consumer.
pub mod config;

/// Structured logging setup for embedding binaries.
pub mod telemetry;

/// The [`distributor::PackageDistributor`] trait and its implementations.
pub mod distributor;

/// The producer endpoint.
pub mod producer;

/// The worker-side queue endpoint and its work-stealing overlay.
pub mod consumer;

/// Convenient re-exports of the most commonly needed types.
pub mod prelude {
    pub use crate::config::{Config, IdleLimitPolicy};
    pub use crate::consumer::{thief::Thief, Consumer};
    pub use crate::distributor::{
        centroidal::CentroidalDistributor, equal::EqualDistributor, PackageDistributor,
    };
    pub use crate::error::{Error, Result};
    pub use crate::item::{Item, ItemHandle};
    pub use crate::node::NodeId;
    pub use crate::producer::Producer;
    pub use crate::protocol::{ChannelTransport, Transport, WireMessage};
}

/// Returns the current version of the crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
