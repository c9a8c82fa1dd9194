//! The staged clustering engine and its fixed-point driver.
//!
//! Host edits arrive through the `on_*` entry points and are staged into the
//! pending buffers; nothing is clustered eagerly. [`ClusterEngine::process`]
//! then drains the buffers pass by pass. Every destructive step (clump or
//! assembly teardown) re-expresses its fallout as reinsertions into *earlier*
//! buffers, so the driver is a plain trampoline loop rather than a web of
//! mutually recursive calls, and the weight ordering makes it terminate.
//!
//! All clustering state lives here: the graph is consulted read-only, and a
//! body's clump membership is exactly its entry in the engine's own map.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use cluster_graph::PartGraph;
use cluster_types::{
    AssemblyId, BodyId, ClumpId, ClusterError, ClusterEvent, EdgeId, EdgeKind, Result, Weight,
};
use hashbrown::HashMap;
use nalgebra::Isometry3;
use tracing::{debug, trace};

use crate::assembly::Assembly;
use crate::buffers::PendingBuffers;
use crate::clump::Clump;

/// Counters describing the engine's current load, for host diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineMetrics {
    /// Live clumps.
    pub clumps: usize,
    /// Live assemblies (published or not).
    pub assemblies: usize,
    /// Rigid joints awaiting classification, across all three rigid buffers.
    pub pending_rigid: usize,
    /// Bodies awaiting clump membership.
    pub pending_bodies: usize,
    /// Motor joints awaiting assembly placement.
    pub pending_motors: usize,
    /// Events recorded and not yet drained.
    pub queued_events: usize,
}

/// Incremental connectivity-clustering engine.
///
/// Mirrors the host world's structural edits into clumps and assemblies. The
/// protocol is: mutate the [`PartGraph`] first, call the matching `on_*`
/// entry point, and call [`process`](Self::process) once per tick (or
/// whenever downstream stages need a settled view). Events recorded during
/// processing are drained with [`take_events`](Self::take_events).
///
/// Entry points return [`ClusterError`] for caller-protocol violations;
/// internal invariant breaks are fatal assertions, since continuing with a
/// corrupt partition silently poisons everything downstream.
#[derive(Debug, Default)]
pub struct ClusterEngine {
    buffers: PendingBuffers,
    clumps: HashMap<ClumpId, Clump>,
    assemblies: HashMap<AssemblyId, Assembly>,
    body_clump: HashMap<BodyId, ClumpId>,

    /// Clumps awaiting (re-)placement into an assembly.
    anchored_clumps: BTreeSet<ClumpId>,
    free_clumps: BTreeSet<ClumpId>,
    /// Assemblies built this pass but not yet announced downstream.
    fresh_assemblies: BTreeSet<AssemblyId>,
    /// External edges announced via [`ClusterEvent::ExternalEdgeAdded`].
    reported_edges: BTreeSet<EdgeId>,
    /// Per clump root: the root's frame in its motor's parent endpoint.
    motor_frames: HashMap<BodyId, Isometry3<f64>>,

    events: Vec<ClusterEvent>,
    next_clump: u64,
    next_assembly: u64,
    processing: bool,
}

impl ClusterEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- entry points ---

    /// Register a freshly added body. Must be called before any of the
    /// body's edges are mirrored.
    pub fn on_body_added(&mut self, graph: &PartGraph, body: BodyId) -> Result<()> {
        assert!(!self.processing, "re-entrant engine call");
        if !graph.contains_body(body) {
            return Err(ClusterError::UnknownBody(body));
        }
        if self.body_clump.contains_key(&body) || self.buffers.bodies_contains(body) {
            return Err(ClusterError::DuplicateBody(body));
        }
        debug_assert_eq!(
            graph.incident_edges(body).count(),
            0,
            "bodies join before their edges"
        );
        self.buffers.bodies_insert(body, graph.weight(body));
        if graph.anchored(body) {
            self.buffers.anchors_insert(body, graph.footprint_floor(body));
        }
        Ok(())
    }

    /// Unregister a body about to leave the graph. All its edges must have
    /// been removed first; its clump, if any, is torn down.
    pub fn on_body_removing(&mut self, graph: &PartGraph, body: BodyId) -> Result<()> {
        assert!(!self.processing, "re-entrant engine call");
        if !graph.contains_body(body) {
            return Err(ClusterError::UnknownBody(body));
        }
        let edges = graph.incident_edges(body).count();
        if edges != 0 {
            return Err(ClusterError::BodyHasEdges { body, edges });
        }
        if graph.anchored(body) {
            self.remove_anchor(graph, body);
        }
        if !self.buffers.bodies_contains(body) {
            let cid = self.clump_of_req(body);
            self.destroy_clump(graph, cid);
        }
        self.buffers.bodies_erase(body);
        Ok(())
    }

    /// Register a freshly added edge. Both endpoints must already be
    /// mirrored; the edge is staged by kind.
    pub fn on_edge_added(&mut self, graph: &PartGraph, edge: EdgeId) -> Result<()> {
        assert!(!self.processing, "re-entrant engine call");
        if !graph.contains_edge(edge) {
            return Err(ClusterError::UnknownEdge(edge));
        }
        let (a, b) = graph.endpoints(edge);
        assert!(
            self.knows_body(a) && self.knows_body(b),
            "endpoints must be mirrored before their edges"
        );
        match graph.kind(edge) {
            EdgeKind::Rigid => {
                if self.buffers.in_rigid_buffers(edge) {
                    return Err(ClusterError::DuplicateEdge(edge));
                }
                self.buffers.rigid_twos_insert(edge);
            }
            EdgeKind::Motor => {
                if self.buffers.motors_contains(edge) {
                    return Err(ClusterError::DuplicateEdge(edge));
                }
                self.buffers.motors_insert(edge);
                self.buffers.motor_angles_insert(edge);
            }
            EdgeKind::Breakable | EdgeKind::Contact => {
                if self.buffers.edges_contains(edge) || self.reported_edges.contains(&edge) {
                    return Err(ClusterError::DuplicateEdge(edge));
                }
                self.buffers.edges_insert(edge);
            }
        }
        Ok(())
    }

    /// Unregister an edge about to leave the graph.
    pub fn on_edge_removing(&mut self, graph: &PartGraph, edge: EdgeId) -> Result<()> {
        assert!(!self.processing, "re-entrant engine call");
        if !graph.contains_edge(edge) {
            return Err(ClusterError::UnknownEdge(edge));
        }
        match graph.kind(edge) {
            EdgeKind::Rigid => self.remove_rigid(graph, edge),
            EdgeKind::Motor => self.remove_motor(graph, edge),
            EdgeKind::Breakable | EdgeKind::Contact => self.remove_edge(graph, edge),
        }
        Ok(())
    }

    /// A body just became anchored. The graph flag must already be set.
    pub fn on_anchor_added(&mut self, graph: &PartGraph, body: BodyId) -> Result<()> {
        assert!(!self.processing, "re-entrant engine call");
        if !graph.contains_body(body) {
            return Err(ClusterError::UnknownBody(body));
        }
        assert!(graph.anchored(body), "graph flips before notification");
        self.buffers.anchors_insert(body, graph.footprint_floor(body));
        Ok(())
    }

    /// A body just lost its anchor. The graph flag must already be cleared.
    /// An anchor attached to a clump tears the clump down.
    pub fn on_anchor_removing(&mut self, graph: &PartGraph, body: BodyId) -> Result<()> {
        assert!(!self.processing, "re-entrant engine call");
        if !graph.contains_body(body) {
            return Err(ClusterError::UnknownBody(body));
        }
        assert!(!graph.anchored(body), "graph flips before notification");
        self.remove_anchor(graph, body);
        Ok(())
    }

    /// A motor joint's drive angle changed; its child clump's frame will be
    /// recomputed during the next [`process`](Self::process).
    pub fn on_motor_angle_changed(&mut self, graph: &PartGraph, edge: EdgeId) -> Result<()> {
        assert!(!self.processing, "re-entrant engine call");
        if !graph.contains_edge(edge) {
            return Err(ClusterError::UnknownEdge(edge));
        }
        let kind = graph.kind(edge);
        if !kind.is_motor() {
            return Err(ClusterError::WrongEdgeKind {
                edge,
                expected: EdgeKind::Motor,
                actual: kind,
            });
        }
        if !self.buffers.motor_angles_contains(edge) {
            self.buffers.motor_angles_insert(edge);
        }
        Ok(())
    }

    /// A body's sleep permission changed. Settles the partition, then
    /// recomputes the owning assembly's aggregate permission and emits
    /// [`ClusterEvent::WakeRequest`] when it flipped.
    pub fn on_can_sleep_changed(&mut self, graph: &PartGraph, body: BodyId) -> Result<()> {
        assert!(!self.processing, "re-entrant engine call");
        if !graph.contains_body(body) {
            return Err(ClusterError::UnknownBody(body));
        }
        self.process(graph);
        let cid = self.clump_of_req(body);
        let aid = match self.clump_ref(cid).assembly() {
            Some(aid) => aid,
            None => panic!("{cid} has no assembly after processing"),
        };
        let can_sleep = self.compute_can_sleep(graph, aid);
        let assembly = self.assembly_mut(aid);
        if assembly.can_sleep() != can_sleep {
            assembly.set_can_sleep(can_sleep);
            self.events.push(ClusterEvent::WakeRequest(aid));
        }
        Ok(())
    }

    // --- the fixed-point driver ---

    /// Drain every pending buffer to the fixed point.
    ///
    /// Clump passes run in a nested trampoline: any pass that pushes work
    /// into an earlier buffer reports it and the driver restarts from the
    /// anchors. The tail passes (motors, assembly publication, edge
    /// classification, motor angles) each run once, since nothing they do
    /// can invalidate a clump.
    pub fn process(&mut self, graph: &PartGraph) {
        assert!(!self.processing, "process is not re-entrant");
        self.processing = true;
        debug!(
            pending_rigid = self.buffers.pending_rigid(),
            pending_bodies = self.buffers.pending_bodies(),
            pending_motors = self.buffers.pending_motors(),
            "clustering pass"
        );

        loop {
            loop {
                loop {
                    self.process_anchors(graph);
                    if self.process_rigid_twos(graph) {
                        break;
                    }
                }
                if self.process_rigid_ones(graph) {
                    break;
                }
            }
            if self.process_bodies(graph) {
                break;
            }
        }
        assert!(self.buffers.anchors_is_empty());
        assert!(self.buffers.rigid_twos_is_empty());
        assert!(self.buffers.rigid_ones_is_empty());
        assert!(self.buffers.rigid_zeros_is_empty());
        assert!(self.buffers.bodies_is_empty());

        self.process_motors(graph);
        self.process_assemblies(graph);
        self.process_edges(graph);
        self.process_motor_angles(graph);

        self.processing = false;
        debug_assert!(self.is_up_to_date());
    }

    /// Whether every buffer and work set has been drained.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.buffers.is_empty()
            && self.anchored_clumps.is_empty()
            && self.free_clumps.is_empty()
            && self.fresh_assemblies.is_empty()
    }

    // --- queries ---

    /// The clump a body belongs to, if it has been clustered.
    #[must_use]
    pub fn clump_of(&self, body: BodyId) -> Option<ClumpId> {
        self.body_clump.get(&body).copied()
    }

    /// The assembly a body belongs to, if its clump has been grouped.
    #[must_use]
    pub fn assembly_of(&self, body: BodyId) -> Option<AssemblyId> {
        let cid = *self.body_clump.get(&body)?;
        self.clump_ref(cid).assembly()
    }

    /// Look up a clump.
    #[must_use]
    pub fn clump(&self, clump: ClumpId) -> Option<&Clump> {
        self.clumps.get(&clump)
    }

    /// Look up an assembly.
    #[must_use]
    pub fn assembly(&self, assembly: AssemblyId) -> Option<&Assembly> {
        self.assemblies.get(&assembly)
    }

    /// Number of live clumps.
    #[must_use]
    pub fn clump_count(&self) -> usize {
        self.clumps.len()
    }

    /// Number of live assemblies.
    #[must_use]
    pub fn assembly_count(&self) -> usize {
        self.assemblies.len()
    }

    /// The clump root's frame in its attaching motor's parent endpoint,
    /// for roots of motor-attached clumps.
    #[must_use]
    pub fn motor_root_frame(&self, root: BodyId) -> Option<Isometry3<f64>> {
        self.motor_frames.get(&root).copied()
    }

    /// Drain the queued events, in the order they were recorded.
    pub fn take_events(&mut self) -> Vec<ClusterEvent> {
        std::mem::take(&mut self.events)
    }

    /// Peek at the queued events without draining them.
    #[must_use]
    pub fn events(&self) -> &[ClusterEvent] {
        &self.events
    }

    /// Snapshot of the engine's load counters.
    #[must_use]
    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            clumps: self.clumps.len(),
            assemblies: self.assemblies.len(),
            pending_rigid: self.buffers.pending_rigid(),
            pending_bodies: self.buffers.pending_bodies(),
            pending_motors: self.buffers.pending_motors(),
            queued_events: self.events.len(),
        }
    }

    /// Verify the structural invariants, panicking on any violation.
    /// Intended for tests and debugging, not the hot path.
    pub fn check_invariants(&self, graph: &PartGraph) {
        for (&body, &cid) in &self.body_clump {
            assert!(self.clump_ref(cid).contains(body));
            assert!(
                !self.buffers.bodies_contains(body),
                "{body} both clumped and pending"
            );
        }
        for (&cid, clump) in &self.clumps {
            assert_eq!(self.body_clump.get(&clump.root()), Some(&cid));
            if let Some(anchor) = clump.anchor() {
                assert_eq!(anchor, clump.root(), "anchor away from the root");
                assert!(graph.anchored(anchor));
            }
            for body in clump.members() {
                assert_eq!(self.body_clump.get(&body), Some(&cid));
                if body == clump.root() {
                    continue;
                }
                // every non-root member reaches the root through tree links
                let mut cursor = body;
                let mut hops = 0;
                while let Some(link) = clump.link(cursor) {
                    cursor = link.parent;
                    hops += 1;
                    assert!(hops <= clump.len(), "spanning tree of {cid} has a cycle");
                }
                assert_eq!(cursor, clump.root(), "{body} does not reach the root");
            }
            match clump.assembly() {
                Some(aid) => assert!(self.assembly_ref(aid).contains(cid)),
                None => assert!(
                    self.anchored_clumps.contains(&cid) || self.free_clumps.contains(&cid),
                    "{cid} neither assembled nor awaiting placement"
                ),
            }
        }
        for (&aid, assembly) in &self.assemblies {
            assert!(assembly.contains(assembly.root()));
            for cid in assembly.clumps() {
                assert_eq!(self.clump_ref(cid).assembly(), Some(aid));
            }
        }
    }

    // --- clump passes ---

    /// Attach pending anchors, biggest footprint first. An anchor can only
    /// attach to a clump it would root; anything else is torn down first.
    fn process_anchors(&mut self, graph: &PartGraph) {
        while let Some(body) = self.buffers.biggest_anchor() {
            match self.body_clump.get(&body).copied() {
                Some(cid) => {
                    let (at_root, assembled) = {
                        let clump = self.clump_ref(cid);
                        (clump.root() == body, clump.assembly().is_some())
                    };
                    if at_root && !assembled {
                        self.buffers.anchors_erase(body);
                        let was_free = self.free_clumps.remove(&cid);
                        assert!(was_free, "{cid} should await placement unanchored");
                        self.clump_mut(cid).attach_anchor(body);
                        self.anchored_clumps.insert(cid);
                        trace!(clump = %cid, anchor = %body, "anchor attached");
                    } else {
                        // the anchor stays pending; the rebuilt clump will
                        // root at it next round
                        self.destroy_clump(graph, cid);
                    }
                }
                None => {
                    self.buffers.anchors_erase(body);
                    let cid = self.new_clump(body);
                    self.clump_mut(cid).attach_anchor(body);
                    self.anchored_clumps.insert(cid);
                    // a fresh anchored root reclassifies its rigid joints
                    let weight = graph.weight(body);
                    let rigids: Vec<EdgeId> = graph.rigid_edges(body).collect();
                    for r in rigids {
                        let removed = self.buffers.remove_from_rigid_buffers(r);
                        assert!(removed, "joint {r} of an unclumped body must be buffered");
                        if self.body_clump.contains_key(&graph.other_body(r, body)) {
                            self.buffers.rigid_twos_insert(r);
                        } else {
                            self.buffers.rigid_ones_insert(r, weight);
                        }
                    }
                }
            }
        }
    }

    /// Classify joints whose endpoints' membership is unknown or conflicting.
    /// Returns false when an anchored teardown requires restarting from the
    /// anchor pass.
    fn process_rigid_twos(&mut self, graph: &PartGraph) -> bool {
        while let Some(r) = self.buffers.first_rigid_two() {
            let (a, b) = graph.endpoints(r);
            // any assembly touching an unresolved rigid joint is stale
            for body in [a, b] {
                if let Some(aid) = self.assembly_of(body) {
                    self.destroy_assembly(graph, aid);
                }
            }
            let ca = self.body_clump.get(&a).copied();
            let cb = self.body_clump.get(&b).copied();
            match (ca, cb) {
                (None, None) => {
                    self.buffers.rigid_twos_erase(r);
                    self.buffers.rigid_zeros_insert(r);
                }
                (Some(cid), None) | (None, Some(cid)) => {
                    self.buffers.rigid_twos_erase(r);
                    let weight = graph.weight(self.clump_ref(cid).root());
                    self.buffers.rigid_ones_insert(r, weight);
                }
                (Some(c0), Some(c1)) if c0 == c1 => {
                    // cycle-closing joint: contained, never restructures
                    self.buffers.rigid_twos_erase(r);
                    self.clump_mut(c0).add_inconsistent(r);
                }
                (Some(c0), Some(c1)) => {
                    if !self.resolve_clump_conflict(graph, r, c0, c1) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Two distinct clumps claim `r`. The lighter side yields; anchored
    /// stalemates are recorded as inconsistent instead of merged. Returns
    /// false when an anchor went back to its buffer.
    fn resolve_clump_conflict(
        &mut self,
        graph: &PartGraph,
        r: EdgeId,
        c0: ClumpId,
        c1: ClumpId,
    ) -> bool {
        let anchored0 = self.clump_ref(c0).is_anchored();
        let anchored1 = self.clump_ref(c1).is_anchored();
        let w0 = graph.weight(self.clump_ref(c0).root());
        let w1 = graph.weight(self.clump_ref(c1).root());

        if !anchored0 || !anchored1 {
            // the free (or lighter, or younger) side re-derives; the joint
            // is reclassified by the teardown itself
            let loser = if anchored0 {
                c1
            } else if anchored1 {
                c0
            } else {
                match w0.cmp(&w1) {
                    Ordering::Less => c0,
                    Ordering::Greater => c1,
                    Ordering::Equal => c0.max(c1),
                }
            };
            self.destroy_clump(graph, loser);
            return true;
        }

        // Both anchored: anchored clumps never merge. A joint between equal
        // weights (or against a single-body clump, which a teardown could
        // never improve) is recorded on both sides; otherwise the lighter
        // multi-body side is rebuilt around its own anchor.
        let loser = match w0.cmp(&w1) {
            Ordering::Less => Some(c0),
            Ordering::Greater => Some(c1),
            Ordering::Equal => None,
        };
        match loser {
            Some(loser) if self.clump_ref(loser).len() > 1 => {
                self.destroy_clump(graph, loser);
                false
            }
            _ => {
                self.buffers.rigid_twos_erase(r);
                self.clump_mut(c0).add_inconsistent(r);
                self.clump_mut(c1).add_inconsistent(r);
                true
            }
        }
    }

    /// Grow clumps across joints with exactly one clumped endpoint,
    /// heaviest clump first. Returns false to restart from the anchors.
    fn process_rigid_ones(&mut self, graph: &PartGraph) -> bool {
        while let Some(r) = self.buffers.biggest_rigid_one() {
            let (a, b) = graph.endpoints(r);
            let (base, lone) = match (self.body_clump.get(&a), self.body_clump.get(&b)) {
                (Some(_), None) => (a, b),
                (None, Some(_)) => (b, a),
                _ => panic!("{r} does not have exactly one clumped endpoint"),
            };
            let cid = self.clump_of_req(base);
            if let Some(aid) = self.clump_ref(cid).assembly() {
                self.destroy_assembly(graph, aid);
            }

            let root_weight = graph.weight(self.clump_ref(cid).root());
            if root_weight < graph.weight(lone) {
                // the lone body outweighs the whole clump's root: rebuild
                // around the heavier body instead of absorbing it. Its
                // buffer key dates from before its joints existed, so
                // re-key it or the retry re-pops the lighter seed forever.
                self.buffers.bodies_erase(lone);
                self.buffers.bodies_insert(lone, graph.weight(lone));
                self.destroy_clump(graph, cid);
                return false;
            }

            self.buffers.rigid_ones_erase(r);
            self.buffers.bodies_erase(lone);
            self.body_clump.insert(lone, cid);
            self.clump_mut(cid).absorb(lone, base, r);
            trace!(clump = %cid, body = %lone, joint = %r, "absorbed");

            // the new member's other rigid joints change classification
            let mut settled = true;
            let others: Vec<EdgeId> = graph.rigid_edges(lone).filter(|&e| e != r).collect();
            for r2 in others {
                let other = graph.other_body(r2, lone);
                match self.body_clump.get(&other).copied() {
                    Some(oc) if oc == cid => {
                        self.buffers.rigid_ones_erase(r2);
                        self.clump_mut(cid).add_inconsistent(r2);
                    }
                    Some(_) => {
                        self.buffers.rigid_ones_erase(r2);
                        self.buffers.rigid_twos_insert(r2);
                        settled = false;
                    }
                    None => {
                        self.buffers.rigid_zeros_erase(r2);
                        self.buffers.rigid_ones_insert(r2, root_weight);
                    }
                }
            }
            if !settled {
                return false;
            }
        }
        true
    }

    /// Seed clumps for the remaining unclumped bodies, heaviest first.
    /// Returns false when a seeded clump has joints to grow across.
    fn process_bodies(&mut self, graph: &PartGraph) -> bool {
        while let Some(body) = self.buffers.biggest_body() {
            let rigids: Vec<EdgeId> = graph.rigid_edges(body).collect();
            let cid = self.new_clump(body);
            self.free_clumps.insert(cid);
            if rigids.is_empty() {
                continue;
            }
            let weight = graph.weight(body);
            for r in rigids {
                self.buffers.rigid_zeros_erase(r);
                self.buffers.rigid_ones_insert(r, weight);
            }
            return false;
        }
        true
    }

    // --- assembly passes ---

    /// Group clumps into assemblies across the pending motors.
    fn process_motors(&mut self, graph: &PartGraph) {
        // every anchored clump seeds its own assembly and never joins
        // another: anchored structures do not move relative to each other
        while let Some(&cid) = self.anchored_clumps.first() {
            self.new_assembly(cid);
        }

        // unanchored assemblies touched by a pending motor are stale
        let pending = self.buffers.take_motors();
        let mut doomed = BTreeSet::new();
        for &m in &pending {
            let (a, b) = graph.endpoints(m);
            for body in [a, b] {
                if let Some(aid) = self.assembly_of(body) {
                    if !self.assembly_is_anchored(aid) {
                        doomed.insert(aid);
                    }
                }
            }
        }
        for aid in doomed {
            self.destroy_assembly(graph, aid);
        }

        // strongest motor first, so the heaviest structures shape the
        // grouping and ties fall to stable id order
        let mut motors = self.buffers.take_motors();
        motors.extend(pending);
        let mut keyed: Vec<(Weight, EdgeId)> = motors
            .into_iter()
            .map(|m| (self.motor_power(graph, m), m))
            .collect();
        keyed.sort_unstable();

        while let Some((_, m)) = keyed.pop() {
            let (a, b) = graph.endpoints(m);
            let ca = self.clump_of_req(a);
            let cb = self.clump_of_req(b);
            let aa = self.clump_ref(ca).assembly();
            let ab = self.clump_ref(cb).assembly();
            match (aa, ab) {
                (Some(x), Some(y)) if x == y => {
                    self.assembly_mut(x).add_inconsistent_motor(m);
                }
                (Some(x), Some(y)) => {
                    // assemblies never merge; the motor is recorded on both
                    self.assembly_mut(x).add_inconsistent_motor(m);
                    self.assembly_mut(y).add_inconsistent_motor(m);
                }
                (Some(x), None) => self.attach_clump(x, cb, m),
                (None, Some(y)) => self.attach_clump(y, ca, m),
                (None, None) => {
                    if ca == cb {
                        let aid = self.new_assembly(ca);
                        self.assembly_mut(aid).add_inconsistent_motor(m);
                    } else {
                        let w0 = graph.weight(self.clump_ref(ca).root());
                        let w1 = graph.weight(self.clump_ref(cb).root());
                        let (root, child) = match w0.cmp(&w1) {
                            Ordering::Greater => (ca, cb),
                            Ordering::Less => (cb, ca),
                            Ordering::Equal => (ca.min(cb), ca.max(cb)),
                        };
                        let aid = self.new_assembly(root);
                        self.attach_clump(aid, child, m);
                    }
                }
            }
        }

        // motorless leftovers become singleton assemblies
        while let Some(&cid) = self.free_clumps.first() {
            self.new_assembly(cid);
        }
    }

    /// Publish the assemblies built this pass.
    fn process_assemblies(&mut self, graph: &PartGraph) {
        while let Some(aid) = self.fresh_assemblies.pop_first() {
            let can_sleep = self.compute_can_sleep(graph, aid);
            let assembly = self.assembly_mut(aid);
            assembly.set_can_sleep(can_sleep);
            assembly.set_published();
            trace!(assembly = %aid, "assembly published");
            self.events.push(ClusterEvent::AssemblyCreated(aid));
        }
    }

    /// Classify pending non-clustering edges against the settled assemblies.
    fn process_edges(&mut self, graph: &PartGraph) {
        while let Some(e) = self.buffers.first_edge() {
            let taken = self.buffers.edges_take(e);
            assert!(taken);
            let (a, b) = graph.endpoints(e);
            let x = self.assembly_of_req(a);
            let y = self.assembly_of_req(b);
            if x == y {
                self.assembly_mut(x).add_internal_edge(e);
            } else {
                self.assembly_mut(x).add_external_edge(e);
                self.assembly_mut(y).add_external_edge(e);
                // two anchored assemblies cannot move relative to each
                // other, so the edge needs no dynamic tracking
                if !(self.assembly_is_anchored(x) && self.assembly_is_anchored(y)) {
                    self.reported_edges.insert(e);
                    self.events.push(ClusterEvent::ExternalEdgeAdded(e));
                }
            }
        }
    }

    /// Recompute the root frames of clumps attached by angle-dirty motors.
    fn process_motor_angles(&mut self, graph: &PartGraph) {
        while let Some(m) = self.buffers.first_motor_angle() {
            self.buffers.motor_angles_erase(m);
            self.refresh_motor_frame(graph, m);
        }
    }

    fn refresh_motor_frame(&mut self, graph: &PartGraph, m: EdgeId) {
        assert!(!self.buffers.motors_contains(m), "{m} still unplaced");
        let (a, b) = graph.endpoints(m);
        let ca = self.clump_of_req(a);
        let aid = match self.clump_ref(ca).assembly() {
            Some(aid) => aid,
            None => panic!("{ca} has no assembly after the motor pass"),
        };
        let Some(child_clump) = self.assembly_ref(aid).motor_child(m) else {
            trace!(motor = %m, "non-structural motor; no frame to refresh");
            return;
        };
        let (child_body, parent_body) = if child_clump == ca { (a, b) } else { (b, a) };
        let child_in_parent = graph.frame_in(m, parent_body);

        let root = self.clump_ref(child_clump).root();
        let root_in_parent = if child_body == root {
            child_in_parent
        } else {
            let child_in_root = self.body_in_root(graph, child_clump, child_body);
            child_in_parent * child_in_root.inverse()
        };
        self.motor_frames.insert(root, root_in_parent);
    }

    /// A body's frame in its clump root's frame, composed along the
    /// spanning-tree links.
    fn body_in_root(&self, graph: &PartGraph, cid: ClumpId, body: BodyId) -> Isometry3<f64> {
        let clump = self.clump_ref(cid);
        let mut frame = Isometry3::identity();
        let mut cursor = body;
        while let Some(link) = clump.link(cursor) {
            frame = graph.frame_in(link.joint, link.parent) * frame;
            cursor = link.parent;
        }
        assert_eq!(cursor, clump.root(), "{body} does not reach the root");
        frame
    }

    // --- construction helpers ---

    fn new_clump(&mut self, root: BodyId) -> ClumpId {
        let id = ClumpId::new(self.next_clump);
        self.next_clump += 1;
        self.buffers.bodies_erase(root);
        self.body_clump.insert(root, id);
        self.clumps.insert(id, Clump::new(id, root));
        trace!(clump = %id, root = %root, "new clump");
        id
    }

    fn new_assembly(&mut self, root: ClumpId) -> AssemblyId {
        let removed = self.anchored_clumps.remove(&root) || self.free_clumps.remove(&root);
        assert!(removed, "{root} not awaiting placement");
        let id = AssemblyId::new(self.next_assembly);
        self.next_assembly += 1;
        self.assemblies.insert(id, Assembly::new(id, root));
        self.clump_mut(root).set_assembly(Some(id));
        self.fresh_assemblies.insert(id);
        trace!(assembly = %id, root = %root, "new assembly");
        id
    }

    fn attach_clump(&mut self, aid: AssemblyId, clump: ClumpId, motor: EdgeId) {
        let removed = self.free_clumps.remove(&clump);
        assert!(removed, "{clump} not awaiting placement unanchored");
        self.assembly_mut(aid).add_clump(clump, motor);
        self.clump_mut(clump).set_assembly(Some(aid));
    }

    // --- teardown: destructive steps expressed as buffer reinsertion ---

    /// Tear a clump down to pending bodies, anchors, and joints.
    fn destroy_clump(&mut self, graph: &PartGraph, cid: ClumpId) {
        if let Some(aid) = self.clump_ref(cid).assembly() {
            self.destroy_assembly(graph, aid);
        }
        debug!(clump = %cid, "destroying clump");
        let removed = self.anchored_clumps.remove(&cid) || self.free_clumps.remove(&cid);
        assert!(removed, "{cid} not awaiting placement");
        let mut clump = match self.clumps.remove(&cid) {
            Some(clump) => clump,
            None => panic!("unknown clump {cid}"),
        };

        let members: Vec<BodyId> = clump.members().collect();
        let mut internal = BTreeSet::new();
        let mut external = BTreeSet::new();
        for &m in &members {
            for r in graph.rigid_edges(m) {
                if clump.contains(graph.other_body(r, m)) {
                    internal.insert(r);
                } else {
                    external.insert(r);
                }
            }
        }

        // inconsistent joints go back to pending; a weight-tie joint also
        // leaves the peer clump's set
        for r in clump.take_inconsistents() {
            let (a, b) = graph.endpoints(r);
            for body in [a, b] {
                if let Some(peer) = self.body_clump.get(&body).copied() {
                    if peer != cid {
                        self.clump_mut(peer).clear_inconsistent(r);
                    }
                }
            }
            self.buffers.rigid_twos_insert(r);
        }
        for r in internal {
            if !self.buffers.in_rigid_buffers(r) {
                self.buffers.rigid_twos_insert(r);
            }
        }

        for &m in &members {
            self.body_clump.remove(&m);
            self.buffers.bodies_insert(m, graph.weight(m));
        }
        if let Some(anchor) = clump.take_anchor() {
            self.buffers.anchors_insert(anchor, graph.footprint_floor(anchor));
        }

        // joints into the rest of the world re-key on the surviving side
        for r in external {
            self.buffers.remove_from_rigid_buffers(r);
            let (a, b) = graph.endpoints(r);
            let sides = (
                self.body_clump.get(&a).copied(),
                self.body_clump.get(&b).copied(),
            );
            match sides {
                (None, None) => self.buffers.rigid_zeros_insert(r),
                (Some(oc), None) | (None, Some(oc)) => {
                    let weight = graph.weight(self.clump_ref(oc).root());
                    self.buffers.rigid_ones_insert(r, weight);
                }
                (Some(_), Some(_)) => panic!("{r} external to {cid} on both sides"),
            }
        }
    }

    /// Tear an assembly down to pending motors and work-set clumps.
    fn destroy_assembly(&mut self, graph: &PartGraph, aid: AssemblyId) {
        debug!(assembly = %aid, "destroying assembly");
        if self.fresh_assemblies.remove(&aid) {
            // never published: no downstream state to unwind
        } else {
            self.remove_assembly_edges(graph, aid);
            self.events.push(ClusterEvent::AssemblyRemoving(aid));
        }
        let mut assembly = match self.assemblies.remove(&aid) {
            Some(assembly) => assembly,
            None => panic!("unknown assembly {aid}"),
        };

        while let Some((motor, child)) = assembly.pop_motor() {
            self.buffers.motors_insert(motor);
            if !self.buffers.motor_angles_contains(motor) {
                self.buffers.motor_angles_insert(motor);
            }
            self.release_clump(child);
        }
        while let Some(motor) = assembly.pop_inconsistent_motor() {
            // a weight-tie motor may also sit in the peer assembly's set
            let (a, b) = graph.endpoints(motor);
            for body in [a, b] {
                if let Some(peer) = self.assembly_of(body) {
                    if peer != aid {
                        self.assembly_mut(peer).clear_inconsistent_motor(motor);
                    }
                }
            }
            self.buffers.motors_insert(motor);
            if !self.buffers.motor_angles_contains(motor) {
                // it may regain a structural position and need its frame
                self.buffers.motor_angles_insert(motor);
            }
        }

        for cid in assembly.take_clumps() {
            self.release_clump(cid);
        }
    }

    /// Detach a clump from its torn-down assembly and return it to the
    /// placement work sets.
    fn release_clump(&mut self, cid: ClumpId) {
        let (root, anchored) = {
            let clump = self.clump_mut(cid);
            clump.set_assembly(None);
            (clump.root(), clump.is_anchored())
        };
        self.motor_frames.remove(&root);
        if anchored {
            self.anchored_clumps.insert(cid);
        } else {
            self.free_clumps.insert(cid);
        }
    }

    /// Return every classified edge of an assembly to the pending pool.
    fn remove_assembly_edges(&mut self, graph: &PartGraph, aid: AssemblyId) {
        while let Some(e) = self.assembly_ref(aid).first_external_edge() {
            self.remove_external_edge(graph, e);
        }
        while let Some(e) = self.assembly_ref(aid).first_internal_edge() {
            self.remove_internal_edge(graph, e);
        }
    }

    fn remove_external_edge(&mut self, graph: &PartGraph, e: EdgeId) {
        let (a, b) = graph.endpoints(e);
        let x = self.assembly_of_req(a);
        let y = self.assembly_of_req(b);
        assert_ne!(x, y, "{e} classified external within one assembly");
        self.assembly_mut(x).remove_external_edge(e);
        self.assembly_mut(y).remove_external_edge(e);
        if self.reported_edges.remove(&e) {
            self.events.push(ClusterEvent::ExternalEdgeRemoving(e));
        }
        self.buffers.edges_insert(e);
    }

    fn remove_internal_edge(&mut self, graph: &PartGraph, e: EdgeId) {
        let (a, _) = graph.endpoints(e);
        let x = self.assembly_of_req(a);
        self.assembly_mut(x).remove_internal_edge(e);
        self.buffers.edges_insert(e);
    }

    // --- removal entry-point bodies ---

    fn remove_anchor(&mut self, graph: &PartGraph, body: BodyId) {
        if !self.buffers.anchors_contains(body) {
            match self.body_clump.get(&body).copied() {
                // the teardown returns the attached anchor to its buffer
                Some(cid) => self.destroy_clump(graph, cid),
                None => panic!("anchor of {body} neither buffered nor attached"),
            }
        }
        self.buffers.anchors_erase(body);
    }

    fn remove_rigid(&mut self, graph: &PartGraph, r: EdgeId) {
        if self.buffers.remove_from_rigid_buffers(r) {
            return;
        }
        let (a, b) = graph.endpoints(r);
        let ca = self.body_clump.get(&a).copied();
        let cb = self.body_clump.get(&b).copied();
        match (ca, cb) {
            (Some(x), Some(y)) if x == y => self.remove_from_clump(graph, x, r),
            _ => {
                // a clustered joint outside any buffer joins two clumps
                // only as a weight-tie record; both sides re-derive
                if let Some(x) = ca {
                    self.destroy_clump(graph, x);
                }
                if let Some(y) = self.body_clump.get(&b).copied() {
                    self.destroy_clump(graph, y);
                }
            }
        }
        // every path above resurfaces the joint in a rigid buffer
        let removed = self.buffers.remove_from_rigid_buffers(r);
        assert!(removed, "{r} did not resurface during teardown");
    }

    /// Remove a rigid joint both of whose endpoints sit in `cid`.
    fn remove_from_clump(&mut self, graph: &PartGraph, cid: ClumpId, r: EdgeId) {
        if self.clump_ref(cid).contains_inconsistent(r) {
            self.clump_mut(cid).remove_inconsistent(r);
            self.buffers.rigid_twos_insert(r);
            return;
        }
        let child = match self.clump_ref(cid).tree_child(r) {
            Some(child) => child,
            None => panic!("{r} neither inconsistent nor a tree edge of {cid}"),
        };
        if self.clump_mut(cid).reroute(r, |e| graph.endpoints(e)) {
            // an inconsistent joint took over the tree position
            self.buffers.rigid_twos_insert(r);
            return;
        }
        // no bridge: detach the severed subtree body by body, leaves first
        let order = self.clump_ref(cid).subtree(child);
        for &body in order.iter().rev() {
            self.remove_from_clump_fast(graph, cid, body);
        }
    }

    /// Detach a single childless member, returning it and its joints to the
    /// pending buffers.
    fn remove_from_clump_fast(&mut self, graph: &PartGraph, cid: ClumpId, body: BodyId) {
        if let Some(aid) = self.clump_ref(cid).assembly() {
            self.destroy_assembly(graph, aid);
        }
        let rigids: Vec<EdgeId> = graph.rigid_edges(body).collect();
        for r in rigids {
            if !self.clear_inconsistent_everywhere(graph, r) {
                self.buffers.remove_from_rigid_buffers(r);
            }
            self.buffers.rigid_twos_insert(r);
        }
        self.body_clump.remove(&body);
        self.buffers.bodies_insert(body, graph.weight(body));
        self.clump_mut(cid).detach(body);
    }

    /// Drop `r` from both endpoint clumps' inconsistent sets, if present.
    fn clear_inconsistent_everywhere(&mut self, graph: &PartGraph, r: EdgeId) -> bool {
        let (a, b) = graph.endpoints(r);
        let mut cleared = false;
        for body in [a, b] {
            if let Some(cid) = self.body_clump.get(&body).copied() {
                cleared |= self.clump_mut(cid).clear_inconsistent(r);
            }
        }
        cleared
    }

    fn remove_motor(&mut self, graph: &PartGraph, m: EdgeId) {
        if !self.buffers.motors_contains(m) {
            let (a, _) = graph.endpoints(m);
            // the teardown returns the motor to its buffer
            let aid = self.assembly_of_req(a);
            self.destroy_assembly(graph, aid);
        }
        self.buffers.motors_erase(m);
        if self.buffers.motor_angles_contains(m) {
            self.buffers.motor_angles_erase(m);
        }
    }

    fn remove_edge(&mut self, graph: &PartGraph, e: EdgeId) {
        if self.buffers.edges_take(e) {
            return;
        }
        let (a, b) = graph.endpoints(e);
        let x = self.assembly_of_req(a);
        let y = self.assembly_of_req(b);
        if x == y {
            self.assembly_mut(x).remove_internal_edge(e);
        } else {
            self.assembly_mut(x).remove_external_edge(e);
            self.assembly_mut(y).remove_external_edge(e);
            if self.reported_edges.remove(&e) {
                self.events.push(ClusterEvent::ExternalEdgeRemoving(e));
            }
        }
    }

    // --- lookup helpers ---

    fn knows_body(&self, body: BodyId) -> bool {
        self.body_clump.contains_key(&body) || self.buffers.bodies_contains(body)
    }

    fn motor_power(&self, graph: &PartGraph, m: EdgeId) -> Weight {
        let (a, b) = graph.endpoints(m);
        let ca = self.clump_of_req(a);
        let cb = self.clump_of_req(b);
        if ca == cb {
            return Weight::ZERO;
        }
        let wa = graph.weight(self.clump_ref(ca).root());
        let wb = graph.weight(self.clump_ref(cb).root());
        wa.max(wb)
    }

    fn compute_can_sleep(&self, graph: &PartGraph, aid: AssemblyId) -> bool {
        self.assembly_ref(aid)
            .clumps()
            .all(|cid| self.clump_ref(cid).members().all(|b| graph.body(b).can_sleep()))
    }

    fn assembly_is_anchored(&self, aid: AssemblyId) -> bool {
        self.clump_ref(self.assembly_ref(aid).root()).is_anchored()
    }

    fn clump_of_req(&self, body: BodyId) -> ClumpId {
        match self.body_clump.get(&body) {
            Some(&cid) => cid,
            None => panic!("{body} is not clumped"),
        }
    }

    fn assembly_of_req(&self, body: BodyId) -> AssemblyId {
        match self.assembly_of(body) {
            Some(aid) => aid,
            None => panic!("{body} is not in an assembly"),
        }
    }

    fn clump_ref(&self, cid: ClumpId) -> &Clump {
        match self.clumps.get(&cid) {
            Some(clump) => clump,
            None => panic!("unknown clump {cid}"),
        }
    }

    fn clump_mut(&mut self, cid: ClumpId) -> &mut Clump {
        match self.clumps.get_mut(&cid) {
            Some(clump) => clump,
            None => panic!("unknown clump {cid}"),
        }
    }

    fn assembly_ref(&self, aid: AssemblyId) -> &Assembly {
        match self.assemblies.get(&aid) {
            Some(assembly) => assembly,
            None => panic!("unknown assembly {aid}"),
        }
    }

    fn assembly_mut(&mut self, aid: AssemblyId) -> &mut Assembly {
        match self.assemblies.get_mut(&aid) {
            Some(assembly) => assembly,
            None => panic!("unknown assembly {aid}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use cluster_graph::EdgeSpec;
    use nalgebra::{Unit, Vector3};

    fn add_body(
        graph: &mut PartGraph,
        engine: &mut ClusterEngine,
        footprint: f64,
        anchored: bool,
    ) -> BodyId {
        let body = graph.add_body(footprint, anchored);
        engine.on_body_added(graph, body).unwrap();
        body
    }

    fn add_rigid(
        graph: &mut PartGraph,
        engine: &mut ClusterEngine,
        a: BodyId,
        b: BodyId,
    ) -> EdgeId {
        let edge = graph.add_edge(a, b, EdgeSpec::rigid()).unwrap();
        engine.on_edge_added(graph, edge).unwrap();
        edge
    }

    fn add_motor(
        graph: &mut PartGraph,
        engine: &mut ClusterEngine,
        a: BodyId,
        b: BodyId,
    ) -> EdgeId {
        let spec = EdgeSpec::motor(Unit::new_normalize(Vector3::z()));
        let edge = graph.add_edge(a, b, spec).unwrap();
        engine.on_edge_added(graph, edge).unwrap();
        edge
    }

    #[test]
    fn test_lone_body_becomes_singleton_clump_and_assembly() {
        let mut graph = PartGraph::new();
        let mut engine = ClusterEngine::new();
        let a = add_body(&mut graph, &mut engine, 1.0, false);

        assert!(!engine.is_up_to_date());
        engine.process(&graph);

        assert!(engine.is_up_to_date());
        assert_eq!(engine.clump_count(), 1);
        assert_eq!(engine.assembly_count(), 1);
        let cid = engine.clump_of(a).unwrap();
        assert_eq!(engine.clump(cid).unwrap().root(), a);
        assert!(engine.assembly_of(a).is_some());
        engine.check_invariants(&graph);
    }

    #[test]
    fn test_process_is_idempotent() {
        let mut graph = PartGraph::new();
        let mut engine = ClusterEngine::new();
        let a = add_body(&mut graph, &mut engine, 2.0, true);
        let b = add_body(&mut graph, &mut engine, 1.0, false);
        add_rigid(&mut graph, &mut engine, a, b);

        engine.process(&graph);
        let clump = engine.clump_of(a);
        let assemblies = engine.assembly_count();
        let _ = engine.take_events();

        engine.process(&graph);
        assert_eq!(engine.clump_of(a), clump);
        assert_eq!(engine.assembly_count(), assemblies);
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_rigid_chain_clumps_with_anchor_at_root() {
        let mut graph = PartGraph::new();
        let mut engine = ClusterEngine::new();
        let a = add_body(&mut graph, &mut engine, 10.0, true);
        let b = add_body(&mut graph, &mut engine, 5.0, false);
        let c = add_body(&mut graph, &mut engine, 1.0, false);
        add_rigid(&mut graph, &mut engine, a, b);
        add_rigid(&mut graph, &mut engine, b, c);

        engine.process(&graph);
        engine.check_invariants(&graph);

        let cid = engine.clump_of(a).unwrap();
        assert_eq!(engine.clump_of(b), Some(cid));
        assert_eq!(engine.clump_of(c), Some(cid));
        let clump = engine.clump(cid).unwrap();
        assert_eq!(clump.root(), a);
        assert_eq!(clump.anchor(), Some(a));
    }

    #[test]
    fn test_motor_groups_clumps_rooted_at_heavier() {
        let mut graph = PartGraph::new();
        let mut engine = ClusterEngine::new();
        let a = add_body(&mut graph, &mut engine, 8.0, false);
        let b = add_body(&mut graph, &mut engine, 3.0, false);
        let motor = add_motor(&mut graph, &mut engine, a, b);

        engine.process(&graph);
        engine.check_invariants(&graph);

        let aid = engine.assembly_of(a).unwrap();
        assert_eq!(engine.assembly_of(b), Some(aid));
        let assembly = engine.assembly(aid).unwrap();
        assert_eq!(assembly.root(), engine.clump_of(a).unwrap());
        assert_eq!(assembly.motor_child(motor), engine.clump_of(b));
    }

    #[test]
    fn test_events_record_publication_order() {
        let mut graph = PartGraph::new();
        let mut engine = ClusterEngine::new();
        let a = add_body(&mut graph, &mut engine, 1.0, false);
        engine.process(&graph);

        let events = engine.take_events();
        let aid = engine.assembly_of(a).unwrap();
        assert_eq!(events, vec![ClusterEvent::AssemblyCreated(aid)]);
        assert!(engine.events().is_empty());
    }

    #[test]
    fn test_metrics_track_pending_and_live() {
        let mut graph = PartGraph::new();
        let mut engine = ClusterEngine::new();
        let a = add_body(&mut graph, &mut engine, 1.0, false);
        let b = add_body(&mut graph, &mut engine, 1.0, false);
        add_rigid(&mut graph, &mut engine, a, b);

        let before = engine.metrics();
        assert_eq!(before.pending_bodies, 2);
        assert_eq!(before.pending_rigid, 1);
        assert_eq!(before.clumps, 0);

        engine.process(&graph);
        let after = engine.metrics();
        assert_eq!(after.pending_bodies, 0);
        assert_eq!(after.clumps, 1);
        assert_eq!(after.assemblies, 1);
    }

    #[test]
    fn test_duplicate_body_rejected() {
        let mut graph = PartGraph::new();
        let mut engine = ClusterEngine::new();
        let a = add_body(&mut graph, &mut engine, 1.0, false);
        assert_eq!(
            engine.on_body_added(&graph, a),
            Err(ClusterError::DuplicateBody(a))
        );
    }

    #[test]
    fn test_motor_angle_rejects_rigid_joint() {
        let mut graph = PartGraph::new();
        let mut engine = ClusterEngine::new();
        let a = add_body(&mut graph, &mut engine, 1.0, false);
        let b = add_body(&mut graph, &mut engine, 1.0, false);
        let rigid = add_rigid(&mut graph, &mut engine, a, b);
        assert!(matches!(
            engine.on_motor_angle_changed(&graph, rigid),
            Err(ClusterError::WrongEdgeKind { .. })
        ));
    }
}
