//! 🎲 Picking the active node.
//!
//! Random rather than round-robin, so a fleet of freshly restarted clients doesn't
//! stampede node zero. The randomness is injected, never global.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

/// 🎯 Chooses which of `node_count` nodes becomes active. `node_count` is never zero.
pub trait NodeSelector: Send {
    fn select(&mut self, node_count: usize) -> usize;
}

/// 🎲 Uniform pick, seeded from a per-instance `RandomState` and a counter.
#[derive(Debug)]
pub struct RandomNodeSelector {
    state: RandomState,
    draws: u64,
}

impl RandomNodeSelector {
    pub fn new() -> Self {
        Self {
            state: RandomState::new(),
            draws: 0,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut hasher = self.state.build_hasher();
        hasher.write_u64(self.draws);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        hasher.write_u64(nanos);
        self.draws = self.draws.wrapping_add(1);
        hasher.finish()
    }
}

impl Default for RandomNodeSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeSelector for RandomNodeSelector {
    fn select(&mut self, node_count: usize) -> usize {
        (self.next_u64() % node_count as u64) as usize
    }
}

/// 📌 Always the same node (clamped to the list). Tests love it; so do single-node setups.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedNodeSelector(pub usize);

impl NodeSelector for FixedNodeSelector {
    fn select(&mut self, node_count: usize) -> usize {
        self.0.min(node_count - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_random_stays_in_bounds() {
        let mut selector = RandomNodeSelector::new();
        for count in 1..=7 {
            for _ in 0..50 {
                assert!(selector.select(count) < count);
            }
        }
    }

    #[test]
    fn the_one_where_random_eventually_visits_everyone() {
        let mut selector = RandomNodeSelector::new();
        let mut seen = [false; 3];
        for _ in 0..500 {
            seen[selector.select(3)] = true;
        }
        assert!(seen.iter().all(|s| *s), "500 draws and a node never came up: {seen:?}");
    }

    #[test]
    fn the_one_where_fixed_is_fixed_but_not_out_of_range() {
        assert_eq!(FixedNodeSelector(1).select(3), 1);
        assert_eq!(FixedNodeSelector(9).select(3), 2);
    }
}
