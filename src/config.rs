//! Runtime configuration.
//!
//! Constructing a [`Config`] is the embedder's job: this crate does not load
//! configuration from files, the environment, or a CLI.

use std::time::Duration;

/// Tunables shared by the distributors and the work-stealing consumer.
#[derive(Debug, Clone)]
pub struct Config {
    /// Low-water mark on local queue size that triggers starvation feedback
    /// and thief probing.
    pub prefetch_mark: u32,
    /// Informational hint about how many items a consumer would like
    /// prefetched; current delivery policy does not act on it.
    pub prefetch_amount: u32,
    /// Length of the centroidal distributor's score sliding window.
    pub score_window: usize,
    /// Maximum per-worker radius on the ring.
    pub max_distance: f64,
    /// Consecutive starved `GET_ITEM` polls before the idle-limit policy
    /// fires.
    pub idle_limit: u64,
    /// Numerator of the steal ratio out of 255 (source used 128/255).
    pub steal_ratio: u32,
    /// Per-message receive timeout while a thief is draining a steal
    /// episode.
    pub steal_recv_timeout: Duration,
    /// What to do when a worker's idle counter exceeds `idle_limit`.
    pub idle_limit_policy: IdleLimitPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefetch_mark: 10,
            prefetch_amount: 10,
            score_window: 128,
            max_distance: 1.0,
            idle_limit: 2000,
            steal_ratio: 128,
            steal_recv_timeout: Duration::from_millis(500),
            idle_limit_policy: IdleLimitPolicy::LogAndError,
        }
    }
}

impl Config {
    /// Start from defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prefetch low-water mark.
    pub fn with_prefetch_mark(mut self, mark: u32) -> Self {
        self.prefetch_mark = mark;
        self
    }

    /// Set the informational prefetch amount.
    pub fn with_prefetch_amount(mut self, amount: u32) -> Self {
        self.prefetch_amount = amount;
        self
    }

    /// Set the centroidal score window length.
    pub fn with_score_window(mut self, window: usize) -> Self {
        self.score_window = window;
        self
    }

    /// Set the idle-limit threshold and policy.
    pub fn with_idle_limit(mut self, limit: u64, policy: IdleLimitPolicy) -> Self {
        self.idle_limit = limit;
        self.idle_limit_policy = policy;
        self
    }

    /// Set the steal ratio (numerator out of 255).
    pub fn with_steal_ratio(mut self, ratio: u32) -> Self {
        self.steal_ratio = ratio;
        self
    }

    /// Set the per-message steal receive timeout.
    pub fn with_steal_recv_timeout(mut self, timeout: Duration) -> Self {
        self.steal_recv_timeout = timeout;
        self
    }
}

/// What a centroidal distributor does when a worker's `idle_counter`
/// exceeds [`Config::idle_limit`].
///
/// The source terminated the whole process (`exit(-1)`); this crate always
/// stays in-process and instead chooses between these policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleLimitPolicy {
    /// Log at `error` level and return [`crate::error::Error::IdleLimitExceeded`]
    /// from the handler that observed the overrun.
    LogAndError,
    /// Silently reset the counter and continue.
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = Config::default();
        assert_eq!(config.prefetch_mark, 10);
        assert_eq!(config.score_window, 128);
        assert_eq!(config.max_distance, 1.0);
        assert_eq!(config.idle_limit, 2000);
        assert_eq!(config.steal_ratio, 128);
        assert_eq!(config.steal_recv_timeout, Duration::from_millis(500));
    }

    #[test]
    fn builder_overrides_apply() {
        let config = Config::new().with_prefetch_mark(20).with_score_window(64);
        assert_eq!(config.prefetch_mark, 20);
        assert_eq!(config.score_window, 64);
    }
}
