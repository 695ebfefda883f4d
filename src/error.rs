//! Error types for the crate.
//!
//! Errors are grouped by the subsystem that raises them, following the
//! failure classes from the producer/consumer protocol and the distributor
//! family.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Distributor errors
    // ========================================================================
    /// The worker table was already allocated and cannot be reshaped.
    #[error("worker table is fixed and cannot be reshaped after first push")]
    WorkerTableFixed,

    /// A command referenced a worker the distributor has no record of.
    #[error("unknown worker: {0:?}")]
    UnknownWorker(crate::node::NodeId),

    /// The centroidal distributor's idle counter exceeded the configured limit.
    #[error("worker {node:?} exceeded idle limit ({count} consecutive empty polls)")]
    IdleLimitExceeded {
        /// The worker that starved.
        node: crate::node::NodeId,
        /// Number of consecutive starved polls observed.
        count: u64,
    },

    // ========================================================================
    // Protocol errors
    // ========================================================================
    /// A message arrived that the receiving handler does not recognize.
    #[error("unimplemented command: {0}")]
    UnimplementedCommand(&'static str),

    /// A steal episode's delivered count did not match its `QUEUE_EMPTY` count.
    #[error("steal episode mismatch: expected {expected} stolen items, observed {observed}")]
    StealCountMismatch {
        /// Count announced by the victim's `QUEUE_EMPTY`.
        expected: u32,
        /// Count actually received as `STOLEN_ITEM`.
        observed: u32,
    },

    // ========================================================================
    // Transport errors
    // ========================================================================
    /// The in-process transport could not reach the given peer.
    #[error("transport: no route to {0:?}")]
    NoRoute(crate::node::NodeId),

    /// Sending on a closed channel transport.
    #[error("transport channel closed")]
    ChannelClosed,

    // ========================================================================
    // Configuration / logging errors
    // ========================================================================
    /// A logging subscriber could not be installed.
    #[error("logging initialization failed: {0}")]
    Logging(String),

    /// Invalid configuration value.
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },
}
