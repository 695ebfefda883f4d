//! Concurrent, position-keyed item store with bounded-radius extraction.
//!
//! Keys live on the ring `[0, max_key)` with wraparound. `try_remove` pulls
//! out up to `n` payloads nearest a center point, restricted to a caller-set
//! `(max_left, max_right)` window, ordered by ring distance and then by
//! insertion order for ties.

use crate::item::Item;
use parking_lot::Mutex;

struct Entry {
    key: f64,
    insertion_order: u64,
    item: Item,
}

struct Inner {
    entries: Vec<Entry>,
    next_insertion_order: u64,
    max_key: f64,
    max_left: f64,
    max_right: f64,
}

/// A concurrent multimap from ring position to queued items.
pub struct SpatialItemMap {
    inner: Mutex<Inner>,
}

impl SpatialItemMap {
    /// Create a map over the ring `[0, max_key)` with an initial symmetric
    /// extraction radius of `initial_distance` on both sides.
    pub fn new(max_key: f64, initial_distance: f64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                next_insertion_order: 0,
                max_key,
                max_left: initial_distance,
                max_right: initial_distance,
            }),
        }
    }

    /// Insert a payload at `key`.
    pub fn insert(&self, key: f64, item: Item) {
        let mut inner = self.inner.lock();
        let insertion_order = inner.next_insertion_order;
        inner.next_insertion_order += 1;
        inner.entries.push(Entry {
            key,
            insertion_order,
            item,
        });
    }

    /// Set the per-request extraction radii used by the next [`try_remove`].
    ///
    /// [`try_remove`]: SpatialItemMap::try_remove
    pub fn set_max_distance(&self, left: f64, right: f64) {
        let mut inner = self.inner.lock();
        inner.max_left = left.max(0.0);
        inner.max_right = right.max(0.0);
    }

    /// Extract up to `n` payloads within the configured radii of `center`,
    /// nearest-first, ties broken by insertion order. Never blocks; returns
    /// fewer than `n` if fewer qualify.
    pub fn try_remove(&self, n: usize, center: f64) -> Vec<Item> {
        if n == 0 {
            return Vec::new();
        }
        let mut inner = self.inner.lock();
        let max_key = inner.max_key;
        let max_left = inner.max_left;
        let max_right = inner.max_right;

        let mut candidates: Vec<(usize, f64, u64)> = inner
            .entries
            .iter()
            .enumerate()
            .filter_map(|(idx, e)| {
                let (dist, side_ok) = ring_distance_signed(center, e.key, max_key);
                let within = match side_ok {
                    Side::Left => dist <= max_left,
                    Side::Right => dist <= max_right,
                    Side::Same => true,
                };
                within.then_some((idx, dist, e.insertion_order))
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.cmp(&b.2))
        });
        candidates.truncate(n);

        let mut indices: Vec<usize> = candidates.iter().map(|c| c.0).collect();
        indices.sort_unstable_by(|a, b| b.cmp(a)); // remove back-to-front

        let mut removed = Vec::with_capacity(indices.len());
        for idx in indices {
            removed.push(inner.entries.remove(idx).item);
        }
        // `removed` is currently in descending-index (reverse distance) order
        // because we removed back-to-front; restore the distance-sorted order.
        removed.reverse();
        removed
    }

    /// Number of payloads currently stored.
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the map currently holds no payloads.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Remove all payloads.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}

enum Side {
    Left,
    Right,
    Same,
}

/// Ring distance from `center` to `key` on `[0, max_key)`, together with
/// which side of `center` the shorter path approaches from.
fn ring_distance_signed(center: f64, key: f64, max_key: f64) -> (f64, Side) {
    if (center - key).abs() < f64::EPSILON {
        return (0.0, Side::Same);
    }
    let direct = key - center;
    let wrapped = if direct > 0.0 {
        direct - max_key
    } else {
        direct + max_key
    };
    if direct.abs() <= wrapped.abs() {
        if direct > 0.0 {
            (direct, Side::Right)
        } else {
            (-direct, Side::Left)
        }
    } else if wrapped > 0.0 {
        (wrapped, Side::Right)
    } else {
        (-wrapped, Side::Left)
    }
}
