//! Consistent hash ring over peer endpoints
//!
//! Each peer contributes `virtual_nodes` points, placed by hashing
//! `"{endpoint}-{index}"`. A key maps to the first point at or clockwise of
//! its own hash. Placement depends only on membership and the virtual node
//! count, so every node computes identical assignments.

use std::collections::BTreeMap;

/// Consistent-hash mapping of partition keys to peers
#[derive(Debug, Clone)]
pub struct HashRing {
    points: BTreeMap<u64, usize>,
    peers: Vec<String>,
}

impl HashRing {
    /// Build a ring over the given endpoints
    pub fn new(peers: Vec<String>, virtual_nodes: usize) -> Self {
        let mut points = BTreeMap::new();
        for (index, peer) in peers.iter().enumerate() {
            for vnode in 0..virtual_nodes {
                let point = hash_bytes(format!("{peer}-{vnode}").as_bytes());
                points.insert(point, index);
            }
        }
        Self { points, peers }
    }

    /// The peer owning this key, or `None` for an empty ring
    pub fn peer_for(&self, key: &[u8]) -> Option<&str> {
        let hash = hash_bytes(key);
        let index = self
            .points
            .range(hash..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, index)| *index)?;
        self.peers.get(index).map(String::as_str)
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// First eight digest bytes, big-endian
fn hash_bytes(input: &[u8]) -> u64 {
    let digest = md5::compute(input);
    u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}
