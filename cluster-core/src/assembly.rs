//! Assemblies: motor-connected groups of clumps.

use std::collections::BTreeSet;

use cluster_types::{AssemblyId, ClumpId, EdgeId};
use hashbrown::HashMap;

/// A maximal group of clumps connected by motor joints.
///
/// One clump is the root; every other clump is attached by exactly one
/// structural motor. Motors that would connect two clumps already in the
/// same assembly (or in two assemblies that refuse to merge) are tracked as
/// *inconsistent* and carry no attachment.
///
/// An assembly also records the non-clustering edges classified against it:
/// internal edges join two of its own bodies, external edges reach another
/// assembly. The assembly is anchored exactly when its root clump is.
#[derive(Debug, Clone)]
pub struct Assembly {
    id: AssemblyId,
    root: ClumpId,
    clumps: BTreeSet<ClumpId>,
    attach: HashMap<ClumpId, EdgeId>,
    motor_children: HashMap<EdgeId, ClumpId>,
    inconsistent_motors: BTreeSet<EdgeId>,
    internal_edges: BTreeSet<EdgeId>,
    external_edges: BTreeSet<EdgeId>,
    published: bool,
    can_sleep: bool,
}

impl Assembly {
    /// Create a single-clump assembly rooted at `root`.
    #[must_use]
    pub(crate) fn new(id: AssemblyId, root: ClumpId) -> Self {
        let mut clumps = BTreeSet::new();
        clumps.insert(root);
        Self {
            id,
            root,
            clumps,
            attach: HashMap::new(),
            motor_children: HashMap::new(),
            inconsistent_motors: BTreeSet::new(),
            internal_edges: BTreeSet::new(),
            external_edges: BTreeSet::new(),
            published: false,
            can_sleep: true,
        }
    }

    /// This assembly's id.
    #[must_use]
    pub fn id(&self) -> AssemblyId {
        self.id
    }

    /// The root clump.
    #[must_use]
    pub fn root(&self) -> ClumpId {
        self.root
    }

    /// Number of member clumps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clumps.len()
    }

    /// Whether the assembly has no clumps. Never true for a live assembly.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clumps.is_empty()
    }

    /// Whether `clump` is a member.
    #[must_use]
    pub fn contains(&self, clump: ClumpId) -> bool {
        self.clumps.contains(&clump)
    }

    /// Iterate member clumps in id order.
    pub fn clumps(&self) -> impl Iterator<Item = ClumpId> + '_ {
        self.clumps.iter().copied()
    }

    /// Whether the assembly has been announced downstream.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.published
    }

    pub(crate) fn set_published(&mut self) {
        self.published = true;
    }

    /// Whether every member body currently permits sleep.
    #[must_use]
    pub fn can_sleep(&self) -> bool {
        self.can_sleep
    }

    pub(crate) fn set_can_sleep(&mut self, can_sleep: bool) {
        self.can_sleep = can_sleep;
    }

    /// Attach a clump via the structural motor `motor`.
    pub(crate) fn add_clump(&mut self, clump: ClumpId, motor: EdgeId) {
        let inserted = self.clumps.insert(clump);
        assert!(inserted, "{clump} already in {}", self.id);
        let fresh = self.attach.insert(clump, motor).is_none();
        assert!(fresh);
        let fresh = self.motor_children.insert(motor, clump).is_none();
        assert!(fresh, "{motor} already structural in {}", self.id);
    }

    /// The clump a structural motor attaches, if `motor` is structural here.
    #[must_use]
    pub fn motor_child(&self, motor: EdgeId) -> Option<ClumpId> {
        self.motor_children.get(&motor).copied()
    }

    /// The structural motor attaching a non-root clump.
    #[must_use]
    pub fn attach_motor(&self, clump: ClumpId) -> Option<EdgeId> {
        self.attach.get(&clump).copied()
    }

    /// Iterate structural motors with the clump each attaches.
    pub fn motors(&self) -> impl Iterator<Item = (EdgeId, ClumpId)> + '_ {
        self.motor_children.iter().map(|(&m, &c)| (m, c))
    }

    /// Detach one structural motor and its clump, if any remain.
    pub(crate) fn pop_motor(&mut self) -> Option<(EdgeId, ClumpId)> {
        let (&motor, &clump) = self.motor_children.iter().next()?;
        self.motor_children.remove(&motor);
        let detached = self.attach.remove(&clump);
        assert_eq!(detached, Some(motor));
        let removed = self.clumps.remove(&clump);
        assert!(removed);
        Some((motor, clump))
    }

    /// Remaining clumps after all structural motors were popped. Consumes
    /// the member set; only valid during teardown.
    pub(crate) fn take_clumps(&mut self) -> BTreeSet<ClumpId> {
        assert!(self.attach.is_empty(), "structural motors still attached");
        std::mem::take(&mut self.clumps)
    }

    pub(crate) fn add_inconsistent_motor(&mut self, motor: EdgeId) {
        let inserted = self.inconsistent_motors.insert(motor);
        assert!(inserted, "{motor} already inconsistent in {}", self.id);
    }

    /// Remove `motor` from the inconsistent set if present.
    pub(crate) fn clear_inconsistent_motor(&mut self, motor: EdgeId) -> bool {
        self.inconsistent_motors.remove(&motor)
    }

    /// Whether `motor` is tracked as inconsistent.
    #[must_use]
    pub fn contains_inconsistent_motor(&self, motor: EdgeId) -> bool {
        self.inconsistent_motors.contains(&motor)
    }

    pub(crate) fn pop_inconsistent_motor(&mut self) -> Option<EdgeId> {
        self.inconsistent_motors.pop_first()
    }

    // --- classified non-clustering edges ---

    pub(crate) fn add_internal_edge(&mut self, edge: EdgeId) {
        let inserted = self.internal_edges.insert(edge);
        assert!(inserted, "{edge} already internal to {}", self.id);
    }

    pub(crate) fn remove_internal_edge(&mut self, edge: EdgeId) {
        let removed = self.internal_edges.remove(&edge);
        assert!(removed, "{edge} not internal to {}", self.id);
    }

    pub(crate) fn add_external_edge(&mut self, edge: EdgeId) {
        let inserted = self.external_edges.insert(edge);
        assert!(inserted, "{edge} already external to {}", self.id);
    }

    pub(crate) fn remove_external_edge(&mut self, edge: EdgeId) {
        let removed = self.external_edges.remove(&edge);
        assert!(removed, "{edge} not external to {}", self.id);
    }

    /// Whether the edge is classified internal here.
    #[must_use]
    pub fn contains_internal_edge(&self, edge: EdgeId) -> bool {
        self.internal_edges.contains(&edge)
    }

    /// Whether the edge is classified external here.
    #[must_use]
    pub fn contains_external_edge(&self, edge: EdgeId) -> bool {
        self.external_edges.contains(&edge)
    }

    pub(crate) fn first_internal_edge(&self) -> Option<EdgeId> {
        self.internal_edges.first().copied()
    }

    pub(crate) fn first_external_edge(&self) -> Option<EdgeId> {
        self.external_edges.first().copied()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn clump(n: u64) -> ClumpId {
        ClumpId::new(n)
    }

    fn motor(n: u64) -> EdgeId {
        EdgeId::new(n)
    }

    #[test]
    fn test_add_clump_tracks_attachment() {
        let mut a = Assembly::new(AssemblyId::new(0), clump(1));
        a.add_clump(clump(2), motor(10));

        assert_eq!(a.len(), 2);
        assert_eq!(a.motor_child(motor(10)), Some(clump(2)));
        assert_eq!(a.attach_motor(clump(2)), Some(motor(10)));
        assert_eq!(a.attach_motor(clump(1)), None);
    }

    #[test]
    fn test_teardown_pops_motors_then_clumps() {
        let mut a = Assembly::new(AssemblyId::new(0), clump(1));
        a.add_clump(clump(2), motor(10));
        a.add_clump(clump(3), motor(11));

        let mut popped = Vec::new();
        while let Some((m, c)) = a.pop_motor() {
            popped.push((m, c));
        }
        assert_eq!(popped.len(), 2);

        let rest = a.take_clumps();
        assert_eq!(rest.len(), 1);
        assert!(rest.contains(&clump(1)));
    }

    #[test]
    #[should_panic(expected = "structural motors still attached")]
    fn test_take_clumps_requires_empty_attachments() {
        let mut a = Assembly::new(AssemblyId::new(0), clump(1));
        a.add_clump(clump(2), motor(10));
        let _ = a.take_clumps();
    }

    #[test]
    fn test_edge_classification_sets() {
        let mut a = Assembly::new(AssemblyId::new(0), clump(1));
        a.add_internal_edge(motor(20));
        a.add_external_edge(motor(21));

        assert!(a.contains_internal_edge(motor(20)));
        assert!(a.contains_external_edge(motor(21)));
        assert_eq!(a.first_internal_edge(), Some(motor(20)));

        a.remove_internal_edge(motor(20));
        a.remove_external_edge(motor(21));
        assert_eq!(a.first_internal_edge(), None);
        assert_eq!(a.first_external_edge(), None);
    }

    #[test]
    fn test_inconsistent_motors() {
        let mut a = Assembly::new(AssemblyId::new(0), clump(1));
        a.add_inconsistent_motor(motor(5));
        assert!(a.contains_inconsistent_motor(motor(5)));
        assert_eq!(a.pop_inconsistent_motor(), Some(motor(5)));
        assert_eq!(a.pop_inconsistent_motor(), None);
    }
}
