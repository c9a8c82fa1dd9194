//! Clumps: rooted spanning trees of rigid-jointed bodies.

use std::collections::BTreeSet;

use cluster_types::{AssemblyId, BodyId, ClumpId, EdgeId};
use hashbrown::HashMap;

/// A body's link to its parent in the clump's spanning tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanLink {
    /// The parent body.
    pub parent: BodyId,
    /// The rigid joint realizing the link.
    pub joint: EdgeId,
}

/// A maximal set of bodies connected only by rigid joints, structured as a
/// spanning tree with one distinguished root body.
///
/// Rigid joints whose endpoints both already lie in the clump cannot join
/// the tree without creating a cycle; they are tracked in the *inconsistent*
/// set instead. An anchored clump owns exactly one anchor, always at its
/// root.
#[derive(Debug, Clone)]
pub struct Clump {
    id: ClumpId,
    root: BodyId,
    members: BTreeSet<BodyId>,
    links: HashMap<BodyId, SpanLink>,
    tree_joints: HashMap<EdgeId, BodyId>,
    anchor: Option<BodyId>,
    inconsistent: BTreeSet<EdgeId>,
    assembly: Option<AssemblyId>,
}

impl Clump {
    /// Create a single-body clump rooted at `root`.
    #[must_use]
    pub fn new(id: ClumpId, root: BodyId) -> Self {
        let mut members = BTreeSet::new();
        members.insert(root);
        Self {
            id,
            root,
            members,
            links: HashMap::new(),
            tree_joints: HashMap::new(),
            anchor: None,
            inconsistent: BTreeSet::new(),
            assembly: None,
        }
    }

    /// This clump's id.
    #[must_use]
    pub fn id(&self) -> ClumpId {
        self.id
    }

    /// The distinguished root body.
    #[must_use]
    pub fn root(&self) -> BodyId {
        self.root
    }

    /// Number of member bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the clump has no members. Never true for a live clump,
    /// which always holds at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `body` is a member.
    #[must_use]
    pub fn contains(&self, body: BodyId) -> bool {
        self.members.contains(&body)
    }

    /// Iterate member bodies in id order.
    pub fn members(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.members.iter().copied()
    }

    /// Whether the clump owns an anchor.
    #[must_use]
    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }

    /// The anchored body, if any. Always the root when present.
    #[must_use]
    pub fn anchor(&self) -> Option<BodyId> {
        self.anchor
    }

    /// The owning assembly, if the clump has been grouped.
    #[must_use]
    pub fn assembly(&self) -> Option<AssemblyId> {
        self.assembly
    }

    pub(crate) fn set_assembly(&mut self, assembly: Option<AssemblyId>) {
        self.assembly = assembly;
    }

    /// Transfer anchor ownership to the clump. The anchor's body must be
    /// the root; a non-root body cannot retroactively become one.
    pub(crate) fn attach_anchor(&mut self, body: BodyId) {
        assert_eq!(body, self.root, "anchor must sit at the clump root");
        assert!(self.anchor.is_none(), "clump {} already anchored", self.id);
        self.anchor = Some(body);
    }

    /// Release the anchor back to the caller.
    pub(crate) fn take_anchor(&mut self) -> Option<BodyId> {
        self.anchor.take()
    }

    /// Absorb an unclumped body as a child of `base` across `joint`.
    pub(crate) fn absorb(&mut self, child: BodyId, base: BodyId, joint: EdgeId) {
        assert!(self.members.contains(&base), "base {base} not a member");
        let inserted = self.members.insert(child);
        assert!(inserted, "{child} already a member of {}", self.id);
        self.links.insert(
            child,
            SpanLink {
                parent: base,
                joint,
            },
        );
        self.tree_joints.insert(joint, child);
    }

    /// The spanning-tree link of a non-root member.
    #[must_use]
    pub fn link(&self, body: BodyId) -> Option<SpanLink> {
        self.links.get(&body).copied()
    }

    /// If `joint` is a tree edge, the child body it attaches.
    #[must_use]
    pub fn tree_child(&self, joint: EdgeId) -> Option<BodyId> {
        self.tree_joints.get(&joint).copied()
    }

    /// Whether `joint` is part of the spanning tree.
    #[must_use]
    pub fn is_tree_joint(&self, joint: EdgeId) -> bool {
        self.tree_joints.contains_key(&joint)
    }

    pub(crate) fn add_inconsistent(&mut self, joint: EdgeId) {
        let inserted = self.inconsistent.insert(joint);
        assert!(inserted, "{joint} already inconsistent in {}", self.id);
    }

    pub(crate) fn remove_inconsistent(&mut self, joint: EdgeId) {
        let removed = self.inconsistent.remove(&joint);
        assert!(removed, "{joint} not inconsistent in {}", self.id);
    }

    /// Remove `joint` from the inconsistent set if present.
    pub(crate) fn clear_inconsistent(&mut self, joint: EdgeId) -> bool {
        self.inconsistent.remove(&joint)
    }

    /// Whether `joint` is tracked as inconsistent.
    #[must_use]
    pub fn contains_inconsistent(&self, joint: EdgeId) -> bool {
        self.inconsistent.contains(&joint)
    }

    /// Iterate inconsistent joints in id order.
    pub fn inconsistents(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.inconsistent.iter().copied()
    }

    pub(crate) fn take_inconsistents(&mut self) -> BTreeSet<EdgeId> {
        std::mem::take(&mut self.inconsistent)
    }

    /// Collect `top` and every body below it in the tree, parents before
    /// children. Reversing the result yields a leaves-first order safe for
    /// one-at-a-time detachment.
    #[must_use]
    pub fn subtree(&self, top: BodyId) -> Vec<BodyId> {
        assert!(self.members.contains(&top), "{top} not a member");
        let mut children: HashMap<BodyId, Vec<BodyId>> = HashMap::new();
        for (&child, link) in &self.links {
            children.entry(link.parent).or_default().push(child);
        }
        // Deterministic traversal: visit children in id order.
        for list in children.values_mut() {
            list.sort_unstable();
        }

        let mut order = Vec::new();
        let mut stack = vec![top];
        while let Some(body) = stack.pop() {
            order.push(body);
            if let Some(kids) = children.get(&body) {
                stack.extend(kids.iter().copied());
            }
        }
        order
    }

    /// Detach a leaf-position member: it must have no remaining children.
    pub(crate) fn detach(&mut self, body: BodyId) {
        assert_ne!(body, self.root, "cannot detach the root");
        debug_assert!(
            !self.links.values().any(|l| l.parent == body),
            "{body} still has children"
        );
        let removed = self.members.remove(&body);
        assert!(removed, "{body} not a member of {}", self.id);
        if let Some(link) = self.links.remove(&body) {
            self.tree_joints.remove(&link.joint);
        }
    }

    /// Try to replace the tree edge `joint` with an inconsistent joint that
    /// reconnects the subtree it would sever.
    ///
    /// On success the severed subtree is re-rooted at the inconsistent
    /// joint's inside endpoint, `joint` leaves the tree, and the clump stays
    /// connected. Returns false when no inconsistent joint bridges the cut,
    /// in which case the caller must detach the subtree.
    pub(crate) fn reroute<F>(&mut self, joint: EdgeId, endpoints: F) -> bool
    where
        F: Fn(EdgeId) -> (BodyId, BodyId),
    {
        let child = match self.tree_joints.get(&joint) {
            Some(&child) => child,
            None => panic!("{joint} is not a tree edge of {}", self.id),
        };
        let severed: BTreeSet<BodyId> = self.subtree(child).into_iter().collect();

        let bridge = self.inconsistent.iter().copied().find(|&candidate| {
            let (x, y) = endpoints(candidate);
            // Only joints internal to this clump can bridge; cross-clump
            // inconsistents (weight ties) have one endpoint elsewhere.
            self.members.contains(&x)
                && self.members.contains(&y)
                && (severed.contains(&x) != severed.contains(&y))
        });

        let Some(bridge) = bridge else {
            return false;
        };

        let (x, y) = endpoints(bridge);
        let (inside, outside) = if severed.contains(&x) { (x, y) } else { (y, x) };

        // Re-root the severed subtree at the bridge's inside endpoint by
        // reversing the parent chain from it up to the old attachment.
        let mut chain = Vec::new();
        let mut cursor = inside;
        while cursor != child {
            let link = self.links[&cursor];
            chain.push((cursor, link));
            cursor = link.parent;
        }
        for (body, link) in chain {
            self.links.insert(
                link.parent,
                SpanLink {
                    parent: body,
                    joint: link.joint,
                },
            );
            self.tree_joints.insert(link.joint, link.parent);
        }
        self.tree_joints.remove(&joint);
        // `inside`'s old link is dead: either a reversal repointed its former
        // parent at it, or (inside == child) `joint` just left the tree. The
        // insert below replaces it with the bridge link.
        self.links.insert(
            inside,
            SpanLink {
                parent: outside,
                joint: bridge,
            },
        );
        self.tree_joints.insert(bridge, inside);
        self.remove_inconsistent(bridge);
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn body(n: u64) -> BodyId {
        BodyId::new(n)
    }

    fn joint(n: u64) -> EdgeId {
        EdgeId::new(n)
    }

    /// root(0) - 1 - 2, with 3 hanging off 1.
    fn diamond_free() -> Clump {
        let mut c = Clump::new(ClumpId::new(0), body(0));
        c.absorb(body(1), body(0), joint(10));
        c.absorb(body(2), body(1), joint(11));
        c.absorb(body(3), body(1), joint(12));
        c
    }

    #[test]
    fn test_absorb_builds_tree() {
        let c = diamond_free();
        assert_eq!(c.len(), 4);
        assert_eq!(c.link(body(2)), Some(SpanLink { parent: body(1), joint: joint(11) }));
        assert_eq!(c.tree_child(joint(10)), Some(body(1)));
        assert!(c.is_tree_joint(joint(12)));
        assert!(c.link(body(0)).is_none());
    }

    #[test]
    fn test_anchor_must_sit_at_root() {
        let mut c = Clump::new(ClumpId::new(0), body(0));
        c.attach_anchor(body(0));
        assert!(c.is_anchored());
        assert_eq!(c.take_anchor(), Some(body(0)));
        assert!(!c.is_anchored());
    }

    #[test]
    #[should_panic(expected = "anchor must sit at the clump root")]
    fn test_anchor_rejects_non_root() {
        let mut c = diamond_free();
        c.attach_anchor(body(1));
    }

    #[test]
    fn test_subtree_is_parents_first() {
        let c = diamond_free();
        let order = c.subtree(body(1));
        assert_eq!(order[0], body(1));
        assert_eq!(order.len(), 3);
        // Leaves-first after reversal: every parent appears after its child.
        let rev: Vec<_> = order.into_iter().rev().collect();
        let pos1 = rev.iter().position(|&b| b == body(1)).unwrap();
        let pos2 = rev.iter().position(|&b| b == body(2)).unwrap();
        assert!(pos2 < pos1);
    }

    #[test]
    fn test_detach_leaf() {
        let mut c = diamond_free();
        c.detach(body(2));
        assert!(!c.contains(body(2)));
        assert!(!c.is_tree_joint(joint(11)));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_reroute_uses_bridging_inconsistent() {
        // 0 - 1 - 2 with an inconsistent joint 0 - 2.
        let mut c = Clump::new(ClumpId::new(0), body(0));
        c.absorb(body(1), body(0), joint(10));
        c.absorb(body(2), body(1), joint(11));
        c.add_inconsistent(joint(20));

        let endpoints = |e: EdgeId| {
            if e == joint(20) {
                (body(0), body(2))
            } else if e == joint(10) {
                (body(0), body(1))
            } else {
                (body(1), body(2))
            }
        };

        // Remove tree edge 0-1: the severed subtree {1, 2} reattaches via
        // the former inconsistent 0-2 joint, re-rooted at 2.
        assert!(c.reroute(joint(10), endpoints));
        assert!(!c.is_tree_joint(joint(10)));
        assert!(c.is_tree_joint(joint(20)));
        assert!(!c.contains_inconsistent(joint(20)));

        assert_eq!(c.link(body(2)), Some(SpanLink { parent: body(0), joint: joint(20) }));
        assert_eq!(c.link(body(1)), Some(SpanLink { parent: body(2), joint: joint(11) }));
        assert!(c.link(body(0)).is_none());
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_reroute_fails_without_bridge() {
        let mut c = diamond_free();
        let endpoints = |_: EdgeId| (body(0), body(1));
        assert!(!c.reroute(joint(11), endpoints));
        // Tree unchanged on failure.
        assert!(c.is_tree_joint(joint(11)));
    }
}
