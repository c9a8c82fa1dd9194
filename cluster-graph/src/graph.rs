//! The connectivity graph container.

use cluster_types::{BodyId, ClusterError, EdgeId, EdgeKind, Result, Weight};
use hashbrown::HashMap;
use nalgebra::Isometry3;

use crate::body::Body;
use crate::edge::{Edge, EdgeSpec};

/// Graph of bodies and the edges joining them.
///
/// The host world mutates the graph through the `add_*`/`remove_*`/`set_*`
/// methods and mirrors every mutation to the clustering engine. The engine
/// itself only reads, through the accessor half of this API.
///
/// Mutation follows the joint-layer protocol: an edge may only be added once
/// both endpoints exist, and a body may only be removed after all its
/// incident edges are gone.
#[derive(Debug, Default, Clone)]
pub struct PartGraph {
    bodies: HashMap<BodyId, Body>,
    edges: HashMap<EdgeId, Edge>,
    next_body: u64,
    next_edge: u64,
}

impl PartGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Add a body with the given planar footprint and anchored flag.
    /// Returns the freshly allocated id.
    pub fn add_body(&mut self, footprint: f64, anchored: bool) -> BodyId {
        let id = BodyId::new(self.next_body);
        self.next_body += 1;
        let previous = self.bodies.insert(id, Body::new(id, footprint, anchored));
        debug_assert!(previous.is_none());
        id
    }

    /// Remove a body. Fails while edges are still incident to it.
    pub fn remove_body(&mut self, body: BodyId) -> Result<()> {
        let record = self
            .bodies
            .get(&body)
            .ok_or(ClusterError::UnknownBody(body))?;
        if !record.edges().is_empty() {
            return Err(ClusterError::BodyHasEdges {
                body,
                edges: record.edges().len(),
            });
        }
        self.bodies.remove(&body);
        Ok(())
    }

    /// Add an edge between two existing, distinct bodies.
    pub fn add_edge(&mut self, a: BodyId, b: BodyId, spec: EdgeSpec) -> Result<EdgeId> {
        if !self.bodies.contains_key(&a) {
            return Err(ClusterError::UnknownBody(a));
        }
        if !self.bodies.contains_key(&b) {
            return Err(ClusterError::UnknownBody(b));
        }
        let id = EdgeId::new(self.next_edge);
        if a == b {
            return Err(ClusterError::SelfLoop { edge: id, body: a });
        }
        self.next_edge += 1;

        let is_joint = spec.kind().is_joint();
        self.edges.insert(id, Edge::new(id, a, b, spec));
        self.body_mut(a).attach_edge(id, is_joint);
        self.body_mut(b).attach_edge(id, is_joint);
        Ok(id)
    }

    /// Remove an edge, detaching it from both endpoints.
    pub fn remove_edge(&mut self, edge: EdgeId) -> Result<()> {
        let record = self
            .edges
            .remove(&edge)
            .ok_or(ClusterError::UnknownEdge(edge))?;
        let (a, b) = record.endpoints();
        let is_joint = record.kind().is_joint();
        self.body_mut(a).detach_edge(edge, is_joint);
        self.body_mut(b).detach_edge(edge, is_joint);
        Ok(())
    }

    /// Flip a body's anchored flag. Fails if the flag already has the
    /// requested value, which indicates a host bookkeeping bug.
    pub fn set_anchored(&mut self, body: BodyId, anchored: bool) -> Result<()> {
        let record = self
            .bodies
            .get_mut(&body)
            .ok_or(ClusterError::UnknownBody(body))?;
        if record.anchored() == anchored {
            return Err(ClusterError::AnchorUnchanged(body, anchored));
        }
        record.set_anchored(anchored);
        Ok(())
    }

    /// Resize a body's planar footprint, refreshing its cached weight.
    pub fn set_footprint(&mut self, body: BodyId, footprint: f64) -> Result<()> {
        self.bodies
            .get_mut(&body)
            .ok_or(ClusterError::UnknownBody(body))?
            .set_footprint(footprint);
        Ok(())
    }

    /// Update a body's sleep permission.
    pub fn set_can_sleep(&mut self, body: BodyId, can_sleep: bool) -> Result<()> {
        self.bodies
            .get_mut(&body)
            .ok_or(ClusterError::UnknownBody(body))?
            .set_can_sleep(can_sleep);
        Ok(())
    }

    /// Set a motor joint's drive angle.
    pub fn set_motor_angle(&mut self, edge: EdgeId, angle: f64) -> Result<()> {
        let record = self
            .edges
            .get_mut(&edge)
            .ok_or(ClusterError::UnknownEdge(edge))?;
        if record.kind() != EdgeKind::Motor {
            return Err(ClusterError::WrongEdgeKind {
                edge,
                expected: EdgeKind::Motor,
                actual: record.kind(),
            });
        }
        record.set_motor_angle(angle);
        Ok(())
    }

    // --- read-only capability surface consumed by the engine ---

    /// Whether the body exists.
    #[must_use]
    pub fn contains_body(&self, body: BodyId) -> bool {
        self.bodies.contains_key(&body)
    }

    /// Whether the edge exists.
    #[must_use]
    pub fn contains_edge(&self, edge: EdgeId) -> bool {
        self.edges.contains_key(&edge)
    }

    /// The body record. Panics on an unknown id: the engine only holds ids
    /// the host has mirrored to it, so a miss is a modeling bug.
    #[must_use]
    pub fn body(&self, body: BodyId) -> &Body {
        match self.bodies.get(&body) {
            Some(record) => record,
            None => panic!("unknown body {body}"),
        }
    }

    /// The edge record. Panics on an unknown id, as [`Self::body`] does.
    #[must_use]
    pub fn edge(&self, edge: EdgeId) -> &Edge {
        match self.edges.get(&edge) {
            Some(record) => record,
            None => panic!("unknown edge {edge}"),
        }
    }

    /// A body's cached connectivity weight.
    #[must_use]
    pub fn weight(&self, body: BodyId) -> Weight {
        self.body(body).weight()
    }

    /// A body's floored planar footprint, the anchor ordering key.
    #[must_use]
    pub fn footprint_floor(&self, body: BodyId) -> i64 {
        #[allow(clippy::cast_possible_truncation)]
        let floored = self.body(body).footprint().floor() as i64;
        floored
    }

    /// Whether a body is anchored.
    #[must_use]
    pub fn anchored(&self, body: BodyId) -> bool {
        self.body(body).anchored()
    }

    /// Edge kind lookup.
    #[must_use]
    pub fn kind(&self, edge: EdgeId) -> EdgeKind {
        self.edge(edge).kind()
    }

    /// Both endpoints of an edge.
    #[must_use]
    pub fn endpoints(&self, edge: EdgeId) -> (BodyId, BodyId) {
        self.edge(edge).endpoints()
    }

    /// The endpoint opposite `body`.
    #[must_use]
    pub fn other_body(&self, edge: EdgeId, body: BodyId) -> BodyId {
        self.edge(edge).other(body)
    }

    /// Iterate all edges incident to a body.
    pub fn incident_edges(&self, body: BodyId) -> impl Iterator<Item = EdgeId> + '_ {
        self.body(body).edges().iter().copied()
    }

    /// Iterate the rigid joints incident to a body.
    pub fn rigid_edges(&self, body: BodyId) -> impl Iterator<Item = EdgeId> + '_ {
        self.body(body)
            .edges()
            .iter()
            .copied()
            .filter(move |&e| self.kind(e).is_rigid())
    }

    /// Current frame of the endpoint opposite `parent` in `parent`'s frame.
    #[must_use]
    pub fn frame_in(&self, edge: EdgeId, parent: BodyId) -> Isometry3<f64> {
        self.edge(edge).frame_in(parent)
    }

    fn body_mut(&mut self, body: BodyId) -> &mut Body {
        match self.bodies.get_mut(&body) {
            Some(record) => record,
            None => panic!("unknown body {body}"),
        }
    }
}
