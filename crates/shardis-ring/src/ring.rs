//! Consistent-hash ring with virtual nodes.
//!
//! Each target (shard id) is hashed onto the ring `replicas` times, at
//! `hash(id + "0")`, `hash(id + "1")`, and so on. A resource is owned by
//! the target holding the first position strictly greater than the
//! resource's own hash, wrapping around to the smallest position.
//!
//! Positions live in a hash map; the sorted view used by lookups is built
//! lazily and thrown away on every mutation, so a burst of `add_target`
//! calls only pays for one sort.

use std::cell::OnceCell;
use std::collections::HashMap;

use tracing::debug;

use crate::error::RingError;
use crate::hasher::{Crc32Hasher, RingHasher};
use crate::ShardId;

/// Virtual nodes per target when none is given.
pub const DEFAULT_REPLICAS: usize = 64;

#[derive(Debug)]
struct Target {
    id: ShardId,
    positions: Vec<u32>,
}

/// A consistent-hash ring mapping resources to shard ids.
#[derive(Debug)]
pub struct HashRing<H = Crc32Hasher> {
    hasher: H,
    replicas: usize,
    /// Registered targets in insertion order.
    targets: Vec<Target>,
    position_to_target: HashMap<u32, ShardId>,
    /// Sorted snapshot of `position_to_target`. Empty cell = dirty.
    sorted: OnceCell<Vec<(u32, ShardId)>>,
}

impl Default for HashRing<Crc32Hasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl HashRing<Crc32Hasher> {
    /// Creates an empty ring with the CRC-32 hasher and 64 replicas.
    pub fn new() -> Self {
        Self::with_hasher(Crc32Hasher, DEFAULT_REPLICAS)
    }
}

impl<H: RingHasher> HashRing<H> {
    /// Creates an empty ring with the given hasher and replica count.
    ///
    /// # Panics
    ///
    /// Panics if `replicas` is zero.
    pub fn with_hasher(hasher: H, replicas: usize) -> Self {
        assert!(replicas > 0, "replica count must be at least 1");
        Self {
            hasher,
            replicas,
            targets: Vec::new(),
            position_to_target: HashMap::new(),
            sorted: OnceCell::new(),
        }
    }

    /// Number of virtual nodes each target owns.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Returns true if no target is registered.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Number of registered targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Registered targets in insertion order.
    pub fn targets(&self) -> impl Iterator<Item = &ShardId> {
        self.targets.iter().map(|t| &t.id)
    }

    /// Returns true if `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.targets.iter().any(|t| t.id.as_str() == id)
    }

    /// Adds a target, hashing it onto `replicas` positions.
    ///
    /// A position that collides with one already on the ring is taken over
    /// by the new target.
    pub fn add_target(&mut self, id: impl Into<ShardId>) -> Result<&mut Self, RingError> {
        let id = id.into();
        if self.contains(id.as_str()) {
            return Err(RingError::TargetExists(id));
        }

        let mut positions = Vec::with_capacity(self.replicas);
        for i in 0..self.replicas {
            let position = self.hasher.hash(&format!("{id}{i}"));
            self.position_to_target.insert(position, id.clone());
            positions.push(position);
        }

        debug!(target_id = %id, replicas = self.replicas, "ring: target added");
        self.targets.push(Target { id, positions });
        self.sorted.take();
        Ok(self)
    }

    /// Adds several targets in order, stopping at the first failure.
    pub fn add_targets<I, T>(&mut self, ids: I) -> Result<&mut Self, RingError>
    where
        I: IntoIterator<Item = T>,
        T: Into<ShardId>,
    {
        for id in ids {
            self.add_target(id)?;
        }
        Ok(self)
    }

    /// Removes a target and every position it still owns.
    pub fn remove_target(&mut self, id: &str) -> Result<&mut Self, RingError> {
        let Some(idx) = self.targets.iter().position(|t| t.id.as_str() == id) else {
            return Err(RingError::TargetMissing(ShardId::from(id)));
        };
        let target = self.targets.remove(idx);

        for position in &target.positions {
            // a later target may have taken this position over
            if self.position_to_target.get(position) == Some(&target.id) {
                self.position_to_target.remove(position);
            }
        }

        debug!(target_id = %target.id, "ring: target removed");
        self.sorted.take();
        Ok(self)
    }

    /// Returns the target that owns `resource`.
    pub fn lookup(&self, resource: &str) -> Result<&ShardId, RingError> {
        self.lookup_list(resource, 1)?
            .into_iter()
            .next()
            .ok_or(RingError::Empty)
    }

    /// Returns up to `count` distinct targets for `resource`, in ring order
    /// starting at the owner.
    ///
    /// Returns an empty list when the ring has no targets.
    pub fn lookup_list(&self, resource: &str, count: usize) -> Result<Vec<&ShardId>, RingError> {
        if count == 0 {
            return Err(RingError::InvalidCount);
        }
        if self.position_to_target.is_empty() {
            return Ok(Vec::new());
        }
        if self.targets.len() == 1 {
            return Ok(vec![&self.targets[0].id]);
        }

        let wanted = count.min(self.targets.len());
        let point = self.hasher.hash(resource);
        let sorted = self.sorted_positions();

        // first position strictly above the resource, then wrap around
        let start = sorted.partition_point(|(pos, _)| *pos <= point);
        let mut results: Vec<&ShardId> = Vec::with_capacity(wanted);
        for (_, target) in sorted[start..].iter().chain(sorted[..start].iter()) {
            if !results.contains(&target) {
                results.push(target);
                if results.len() == wanted {
                    break;
                }
            }
        }
        Ok(results)
    }

    fn sorted_positions(&self) -> &[(u32, ShardId)] {
        self.sorted.get_or_init(|| {
            let mut sorted: Vec<(u32, ShardId)> = self
                .position_to_target
                .iter()
                .map(|(pos, id)| (*pos, id.clone()))
                .collect();
            sorted.sort_unstable_by_key(|(pos, _)| *pos);
            sorted
        })
    }
}

impl<H> std::fmt::Display for HashRing<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.targets.iter().map(|t| t.id.as_str()).collect();
        write!(f, "HashRing{{targets:[{}]}}", ids.join(","))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::hasher::Md5Hasher;

    /// Places targets at fixed positions so lookups can be checked by hand.
    struct TableHasher(HashMap<String, u32>);

    impl RingHasher for TableHasher {
        fn hash(&self, input: &str) -> u32 {
            self.0.get(input).copied().unwrap_or(0)
        }
    }

    fn table_ring() -> HashRing<TableHasher> {
        let table = [
            ("a0", 10), ("b0", 20), ("c0", 30),
            ("r5", 5), ("r10", 10), ("r25", 25), ("r35", 35),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let mut ring = HashRing::with_hasher(TableHasher(table), 1);
        ring.add_targets(["a", "b", "c"]).unwrap();
        ring
    }

    #[test]
    fn lookup_takes_first_position_strictly_above() {
        let ring = table_ring();
        assert_eq!(ring.lookup("r5").unwrap().as_str(), "a");
        // equal position is not "greater than": skips to the next one
        assert_eq!(ring.lookup("r10").unwrap().as_str(), "b");
        assert_eq!(ring.lookup("r25").unwrap().as_str(), "c");
        // past the last position wraps to the smallest
        assert_eq!(ring.lookup("r35").unwrap().as_str(), "a");
    }

    #[test]
    fn lookup_list_walks_and_wraps() {
        let ring = table_ring();
        let ids: Vec<&str> = ring
            .lookup_list("r25", 3)
            .unwrap()
            .into_iter()
            .map(|id| id.as_str())
            .collect();
        assert_eq!(ids, ["c", "a", "b"]);

        // asking for more than exist stops at the ring size
        assert_eq!(ring.lookup_list("r5", 10).unwrap().len(), 3);
    }

    #[test]
    fn empty_ring_errors() {
        let ring = HashRing::new();
        assert_eq!(ring.lookup("k"), Err(RingError::Empty));
        assert!(ring.lookup_list("k", 2).unwrap().is_empty());
        assert_eq!(ring.lookup_list("k", 0), Err(RingError::InvalidCount));
    }

    #[test]
    fn single_target_short_circuits() {
        let mut ring = HashRing::new();
        ring.add_target("only").unwrap();
        for key in ["a", "b", "zzz", ""] {
            assert_eq!(ring.lookup(key).unwrap().as_str(), "only");
        }
        assert_eq!(ring.lookup_list("x", 5).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_add_and_missing_remove_fail() {
        let mut ring = HashRing::new();
        ring.add_target("s1").unwrap();
        assert_eq!(
            ring.add_target("s1").unwrap_err(),
            RingError::TargetExists("s1".into())
        );
        assert_eq!(
            ring.remove_target("s2").unwrap_err(),
            RingError::TargetMissing("s2".into())
        );
    }

    #[test]
    fn remove_drops_all_positions() {
        let mut ring = HashRing::new();
        ring.add_targets(["s1", "s2", "s3"]).unwrap();
        ring.remove_target("s2").unwrap();

        assert!(!ring.contains("s2"));
        assert_eq!(ring.len(), 2);
        for i in 0..500 {
            assert_ne!(ring.lookup(&format!("key:{i}")).unwrap().as_str(), "s2");
        }
    }

    #[test]
    fn sorted_cache_is_rebuilt_after_mutation() {
        let mut ring = HashRing::new();
        ring.add_targets(["s1", "s2"]).unwrap();
        let before = ring.lookup("cache-key").unwrap().clone();

        ring.add_target("s3").unwrap();
        // every key must now be routable to s3 somewhere in the keyspace
        let hits_s3 = (0..2000).any(|i| ring.lookup(&format!("k{i}")).unwrap().as_str() == "s3");
        assert!(hits_s3, "new target never returned: sorted view went stale");

        ring.remove_target("s3").unwrap();
        assert_eq!(ring.lookup("cache-key").unwrap(), &before);
    }

    #[test]
    fn display_lists_targets() {
        let mut ring = HashRing::with_hasher(Md5Hasher, 8);
        ring.add_targets(["alpha", "beta"]).unwrap();
        assert_eq!(ring.to_string(), "HashRing{targets:[alpha,beta]}");
        assert_eq!(ring.replicas(), 8);
    }

    #[test]
    fn distribution_is_balanced() {
        let mut ring = HashRing::new();
        let ids = ["s0", "s1", "s2", "s3", "s4"];
        ring.add_targets(ids).unwrap();

        let samples = 50_000;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for i in 0..samples {
            let id = ring.lookup(&format!("user:{i}:profile")).unwrap();
            *counts.entry(id.to_string()).or_default() += 1;
        }

        let expected = samples / ids.len();
        for id in ids {
            let got = counts.get(id).copied().unwrap_or(0);
            assert!(got > 0, "{id} received no keys");
            assert!(
                got < expected * 3,
                "{id} received {got} keys, expected about {expected}"
            );
        }
    }
}
