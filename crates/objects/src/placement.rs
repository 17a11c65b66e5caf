//! Replica placement policies
//!
//! A policy orders the holders by preference for one chunk. The store
//! writes the primary to the first holder that accepts it and the
//! secondaries to the holders that follow.

use crate::holder::ChunkHolder;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Which built-in policy to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlacementKind {
    /// Uniform shuffle
    #[default]
    Random,
    /// Spread replicas across zones before reusing one
    ZoneAware,
}

impl PlacementKind {
    /// Build the policy
    pub fn build(self) -> Box<dyn PlacementPolicy> {
        match self {
            PlacementKind::Random => Box::new(RandomPlacement::new()),
            PlacementKind::ZoneAware => Box::new(ZoneAwarePlacement::new()),
        }
    }
}

/// Orders candidate holders for a new chunk
pub trait PlacementPolicy: Send + Sync + Debug {
    /// Policy name for stats and logs
    fn name(&self) -> &'static str;

    /// Every index into `holders`, most preferred first
    fn order(&self, holders: &[Arc<dyn ChunkHolder>]) -> Vec<usize>;
}

fn seeded_or_entropy(seed: Option<u64>) -> Mutex<StdRng> {
    Mutex::new(match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    })
}

/// Uniformly random order
#[derive(Debug)]
pub struct RandomPlacement {
    rng: Mutex<StdRng>,
}

impl RandomPlacement {
    /// Seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: seeded_or_entropy(None),
        }
    }

    /// Deterministic order for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: seeded_or_entropy(Some(seed)),
        }
    }
}

impl Default for RandomPlacement {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementPolicy for RandomPlacement {
    fn name(&self) -> &'static str {
        "random"
    }

    fn order(&self, holders: &[Arc<dyn ChunkHolder>]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..holders.len()).collect();
        order.shuffle(&mut *self.rng.lock());
        order
    }
}

/// Round-robin over zones, random within a zone
#[derive(Debug)]
pub struct ZoneAwarePlacement {
    rng: Mutex<StdRng>,
}

impl ZoneAwarePlacement {
    /// Seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: seeded_or_entropy(None),
        }
    }

    /// Deterministic order for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: seeded_or_entropy(Some(seed)),
        }
    }
}

impl Default for ZoneAwarePlacement {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementPolicy for ZoneAwarePlacement {
    fn name(&self) -> &'static str {
        "zone-aware"
    }

    fn order(&self, holders: &[Arc<dyn ChunkHolder>]) -> Vec<usize> {
        let mut shuffled: Vec<usize> = (0..holders.len()).collect();
        shuffled.shuffle(&mut *self.rng.lock());

        // zones in order of first appearance, each with its holders
        let mut zones: Vec<(&str, Vec<usize>)> = Vec::new();
        for idx in shuffled {
            let zone = holders[idx].zone();
            match zones.iter_mut().find(|(z, _)| *z == zone) {
                Some((_, members)) => members.push(idx),
                None => zones.push((zone, vec![idx])),
            }
        }

        let mut order = Vec::with_capacity(holders.len());
        let mut round = 0;
        while order.len() < holders.len() {
            for (_, members) in &zones {
                if let Some(&idx) = members.get(round) {
                    order.push(idx);
                }
            }
            round += 1;
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::MemoryChunkHolder;
    use std::collections::HashSet;

    fn holders(zones: &[&str]) -> Vec<Arc<dyn ChunkHolder>> {
        zones
            .iter()
            .enumerate()
            .map(|(i, z)| {
                Arc::new(MemoryChunkHolder::new(format!("chunkserver-{}", i), *z))
                    as Arc<dyn ChunkHolder>
            })
            .collect()
    }

    #[test]
    fn test_random_is_permutation() {
        let hs = holders(&["a", "b", "a", "b", "a"]);
        let policy = RandomPlacement::seeded(7);
        for _ in 0..20 {
            let mut order = policy.order(&hs);
            order.sort_unstable();
            assert_eq!(order, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let hs = holders(&["a", "b", "c", "d"]);
        assert_eq!(
            RandomPlacement::seeded(42).order(&hs),
            RandomPlacement::seeded(42).order(&hs)
        );
    }

    #[test]
    fn test_zone_aware_spreads_first() {
        let hs = holders(&["dc-0", "dc-1", "dc-0", "dc-1", "dc-0"]);
        let policy = ZoneAwarePlacement::seeded(3);
        for _ in 0..20 {
            let order = policy.order(&hs);
            assert_eq!(order.len(), 5);
            let first_two: HashSet<&str> = order[..2].iter().map(|&i| hs[i].zone()).collect();
            assert_eq!(first_two.len(), 2);
        }
    }

    #[test]
    fn test_kind_from_config() {
        assert_eq!(PlacementKind::Random.build().name(), "random");
        assert_eq!(PlacementKind::ZoneAware.build().name(), "zone-aware");
    }
}
