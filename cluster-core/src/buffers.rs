//! Pending-edit buffers staging unresolved clustering work.
//!
//! Six logically distinct sets hold bodies and joints whose cluster
//! membership is not yet resolved: pending anchors, rigid joints with
//! two/one/zero clumped endpoints, unclumped bodies, and pending motors.
//! Ordered buffers are keyed by (cached weight, id) so that the highest
//! priority entry pops first and iteration order is deterministic.
//!
//! The weight caches exist because a body's live weight can drift while the
//! entry sits in a buffer (a joint is added, the footprint changes); the
//! cache guarantees the erase key always matches the insert key.
//!
//! Every insertion asserts the entry's absence and every removal asserts its
//! presence: a duplicate or a miss is a modeling bug in the calling
//! sequence, not a recoverable condition.

use std::collections::BTreeSet;

use cluster_types::{BodyId, EdgeId, Weight};
use hashbrown::HashMap;

/// Ordered entry for the pending-anchor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct AnchorEntry {
    size: i64,
    body: BodyId,
}

/// Ordered entry for weight-keyed rigid-joint buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RigidEntry {
    weight: Weight,
    edge: EdgeId,
}

/// Ordered entry for the unclumped-body buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct BodyEntry {
    weight: Weight,
    body: BodyId,
}

/// The staging buffers of the clustering engine.
#[derive(Debug, Default)]
pub(crate) struct PendingBuffers {
    anchors: BTreeSet<AnchorEntry>,
    anchor_sizes: HashMap<BodyId, i64>,

    rigid_twos: BTreeSet<EdgeId>,
    rigid_ones: BTreeSet<RigidEntry>,
    rigid_one_weights: HashMap<EdgeId, Weight>,
    rigid_zeros: BTreeSet<EdgeId>,

    bodies: BTreeSet<BodyEntry>,
    body_weights: HashMap<BodyId, Weight>,

    motors: Vec<EdgeId>,
    motor_angles: BTreeSet<EdgeId>,
    edges: BTreeSet<EdgeId>,
}

impl PendingBuffers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// All buffers drained: the terminal per-tick state.
    pub(crate) fn is_empty(&self) -> bool {
        self.anchors.is_empty()
            && self.rigid_twos.is_empty()
            && self.rigid_ones.is_empty()
            && self.rigid_zeros.is_empty()
            && self.bodies.is_empty()
            && self.motors.is_empty()
            && self.edges.is_empty()
            && self.motor_angles.is_empty()
    }

    // --- anchors ---

    pub(crate) fn anchors_insert(&mut self, body: BodyId, size: i64) {
        let fresh = self.anchor_sizes.insert(body, size).is_none();
        assert!(fresh, "anchor {body} already pending");
        let inserted = self.anchors.insert(AnchorEntry { size, body });
        assert!(inserted);
    }

    pub(crate) fn anchors_erase(&mut self, body: BodyId) {
        let size = match self.anchor_sizes.remove(&body) {
            Some(size) => size,
            None => panic!("anchor {body} not pending"),
        };
        let removed = self.anchors.remove(&AnchorEntry { size, body });
        assert!(removed);
    }

    pub(crate) fn anchors_contains(&self, body: BodyId) -> bool {
        self.anchor_sizes.contains_key(&body)
    }

    pub(crate) fn anchors_is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// The pending anchor on the largest body.
    pub(crate) fn biggest_anchor(&self) -> Option<BodyId> {
        self.anchors.last().map(|entry| entry.body)
    }

    // --- rigid joints, two clumped endpoints ---

    pub(crate) fn rigid_twos_insert(&mut self, edge: EdgeId) {
        let inserted = self.rigid_twos.insert(edge);
        assert!(inserted, "rigid {edge} already in twos");
    }

    pub(crate) fn rigid_twos_erase(&mut self, edge: EdgeId) {
        let removed = self.rigid_twos.remove(&edge);
        assert!(removed, "rigid {edge} not in twos");
    }

    pub(crate) fn rigid_twos_contains(&self, edge: EdgeId) -> bool {
        self.rigid_twos.contains(&edge)
    }

    pub(crate) fn rigid_twos_is_empty(&self) -> bool {
        self.rigid_twos.is_empty()
    }

    pub(crate) fn first_rigid_two(&self) -> Option<EdgeId> {
        self.rigid_twos.first().copied()
    }

    // --- rigid joints, one clumped endpoint ---

    pub(crate) fn rigid_ones_insert(&mut self, edge: EdgeId, weight: Weight) {
        let fresh = self.rigid_one_weights.insert(edge, weight).is_none();
        assert!(fresh, "rigid {edge} already in ones");
        let inserted = self.rigid_ones.insert(RigidEntry { weight, edge });
        assert!(inserted);
    }

    pub(crate) fn rigid_ones_erase(&mut self, edge: EdgeId) {
        let weight = match self.rigid_one_weights.remove(&edge) {
            Some(weight) => weight,
            None => panic!("rigid {edge} not in ones"),
        };
        let removed = self.rigid_ones.remove(&RigidEntry { weight, edge });
        assert!(removed);
    }

    pub(crate) fn rigid_ones_contains(&self, edge: EdgeId) -> bool {
        self.rigid_one_weights.contains_key(&edge)
    }

    pub(crate) fn rigid_ones_is_empty(&self) -> bool {
        self.rigid_ones.is_empty()
    }

    /// The pending one-endpoint joint whose clumped side is heaviest.
    pub(crate) fn biggest_rigid_one(&self) -> Option<EdgeId> {
        self.rigid_ones.last().map(|entry| entry.edge)
    }

    // --- rigid joints, no clumped endpoint ---

    pub(crate) fn rigid_zeros_insert(&mut self, edge: EdgeId) {
        let inserted = self.rigid_zeros.insert(edge);
        assert!(inserted, "rigid {edge} already in zeros");
    }

    pub(crate) fn rigid_zeros_erase(&mut self, edge: EdgeId) {
        let removed = self.rigid_zeros.remove(&edge);
        assert!(removed, "rigid {edge} not in zeros");
    }

    pub(crate) fn rigid_zeros_contains(&self, edge: EdgeId) -> bool {
        self.rigid_zeros.contains(&edge)
    }

    pub(crate) fn rigid_zeros_is_empty(&self) -> bool {
        self.rigid_zeros.is_empty()
    }

    /// Whether a rigid joint sits in any of the three rigid buffers.
    pub(crate) fn in_rigid_buffers(&self, edge: EdgeId) -> bool {
        self.rigid_twos_contains(edge)
            || self.rigid_zeros_contains(edge)
            || self.rigid_ones_contains(edge)
    }

    /// Remove a rigid joint from whichever rigid buffer holds it.
    /// Returns false if no buffer held it.
    pub(crate) fn remove_from_rigid_buffers(&mut self, edge: EdgeId) -> bool {
        if self.rigid_twos.remove(&edge) || self.rigid_zeros.remove(&edge) {
            return true;
        }
        if self.rigid_ones_contains(edge) {
            self.rigid_ones_erase(edge);
            return true;
        }
        false
    }

    // --- unclumped bodies ---

    pub(crate) fn bodies_insert(&mut self, body: BodyId, weight: Weight) {
        let fresh = self.body_weights.insert(body, weight).is_none();
        assert!(fresh, "body {body} already pending");
        let inserted = self.bodies.insert(BodyEntry { weight, body });
        assert!(inserted);
    }

    pub(crate) fn bodies_erase(&mut self, body: BodyId) {
        let weight = match self.body_weights.remove(&body) {
            Some(weight) => weight,
            None => panic!("body {body} not pending"),
        };
        let removed = self.bodies.remove(&BodyEntry { weight, body });
        assert!(removed);
    }

    pub(crate) fn bodies_contains(&self, body: BodyId) -> bool {
        self.body_weights.contains_key(&body)
    }

    pub(crate) fn bodies_is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// The heaviest pending body.
    pub(crate) fn biggest_body(&self) -> Option<BodyId> {
        self.bodies.last().map(|entry| entry.body)
    }

    // --- motors ---

    pub(crate) fn motors_insert(&mut self, edge: EdgeId) {
        assert!(!self.motors_contains(edge), "motor {edge} already pending");
        self.motors.push(edge);
    }

    pub(crate) fn motors_erase(&mut self, edge: EdgeId) {
        let pos = match self.motors.iter().position(|&m| m == edge) {
            Some(pos) => pos,
            None => panic!("motor {edge} not pending"),
        };
        self.motors.remove(pos);
    }

    pub(crate) fn motors_contains(&self, edge: EdgeId) -> bool {
        self.motors.contains(&edge)
    }

    pub(crate) fn motors_is_empty(&self) -> bool {
        self.motors.is_empty()
    }

    pub(crate) fn take_motors(&mut self) -> Vec<EdgeId> {
        std::mem::take(&mut self.motors)
    }

    // --- angle-dirty motors ---

    pub(crate) fn motor_angles_insert(&mut self, edge: EdgeId) {
        let inserted = self.motor_angles.insert(edge);
        assert!(inserted, "motor {edge} already angle-dirty");
    }

    pub(crate) fn motor_angles_erase(&mut self, edge: EdgeId) {
        let removed = self.motor_angles.remove(&edge);
        assert!(removed, "motor {edge} not angle-dirty");
    }

    pub(crate) fn motor_angles_contains(&self, edge: EdgeId) -> bool {
        self.motor_angles.contains(&edge)
    }

    pub(crate) fn first_motor_angle(&self) -> Option<EdgeId> {
        self.motor_angles.first().copied()
    }

    // --- non-clustering edges awaiting classification ---

    pub(crate) fn edges_insert(&mut self, edge: EdgeId) {
        let inserted = self.edges.insert(edge);
        assert!(inserted, "edge {edge} already pending");
    }

    pub(crate) fn edges_contains(&self, edge: EdgeId) -> bool {
        self.edges.contains(&edge)
    }

    /// Remove an edge from the pending set if present.
    pub(crate) fn edges_take(&mut self, edge: EdgeId) -> bool {
        self.edges.remove(&edge)
    }

    pub(crate) fn first_edge(&self) -> Option<EdgeId> {
        self.edges.first().copied()
    }

    // --- metrics ---

    pub(crate) fn pending_rigid(&self) -> usize {
        self.rigid_twos.len() + self.rigid_ones.len() + self.rigid_zeros.len()
    }

    pub(crate) fn pending_bodies(&self) -> usize {
        self.bodies.len()
    }

    pub(crate) fn pending_motors(&self) -> usize {
        self.motors.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_order_is_by_size_then_id() {
        let mut buffers = PendingBuffers::new();
        buffers.anchors_insert(BodyId::new(1), 5);
        buffers.anchors_insert(BodyId::new(2), 9);
        buffers.anchors_insert(BodyId::new(3), 9);

        assert_eq!(buffers.biggest_anchor(), Some(BodyId::new(3)));
        buffers.anchors_erase(BodyId::new(3));
        assert_eq!(buffers.biggest_anchor(), Some(BodyId::new(2)));
        buffers.anchors_erase(BodyId::new(2));
        assert_eq!(buffers.biggest_anchor(), Some(BodyId::new(1)));
    }

    #[test]
    fn test_erase_uses_cached_key() {
        let mut buffers = PendingBuffers::new();
        let w = Weight::of_body(false, 4.0, 2);
        buffers.rigid_ones_insert(EdgeId::new(7), w);
        // Even if the live weight drifted, the cached key still matches.
        buffers.rigid_ones_erase(EdgeId::new(7));
        assert!(buffers.rigid_ones_is_empty());
    }

    #[test]
    #[should_panic(expected = "already pending")]
    fn test_duplicate_insert_is_fatal() {
        let mut buffers = PendingBuffers::new();
        buffers.bodies_insert(BodyId::new(1), Weight::ZERO);
        buffers.bodies_insert(BodyId::new(1), Weight::ZERO);
    }

    #[test]
    #[should_panic(expected = "not pending")]
    fn test_missing_erase_is_fatal() {
        let mut buffers = PendingBuffers::new();
        buffers.bodies_erase(BodyId::new(1));
    }

    #[test]
    fn test_remove_from_rigid_buffers_scans_all_three() {
        let mut buffers = PendingBuffers::new();
        buffers.rigid_twos_insert(EdgeId::new(1));
        buffers.rigid_ones_insert(EdgeId::new(2), Weight::ZERO);
        buffers.rigid_zeros_insert(EdgeId::new(3));

        assert!(buffers.remove_from_rigid_buffers(EdgeId::new(1)));
        assert!(buffers.remove_from_rigid_buffers(EdgeId::new(2)));
        assert!(buffers.remove_from_rigid_buffers(EdgeId::new(3)));
        assert!(!buffers.remove_from_rigid_buffers(EdgeId::new(4)));
    }

    #[test]
    fn test_biggest_body_pops_heaviest() {
        let mut buffers = PendingBuffers::new();
        buffers.bodies_insert(BodyId::new(1), Weight::of_body(false, 2.0, 1));
        buffers.bodies_insert(BodyId::new(2), Weight::of_body(true, 1.0, 1));
        buffers.bodies_insert(BodyId::new(3), Weight::of_body(false, 9.0, 1));

        // Anchored dominates.
        assert_eq!(buffers.biggest_body(), Some(BodyId::new(2)));
    }

    #[test]
    fn test_is_empty_covers_every_buffer() {
        let mut buffers = PendingBuffers::new();
        assert!(buffers.is_empty());
        buffers.motor_angles_insert(EdgeId::new(1));
        assert!(!buffers.is_empty());
        buffers.motor_angles_erase(EdgeId::new(1));
        assert!(buffers.is_empty());
    }
}
