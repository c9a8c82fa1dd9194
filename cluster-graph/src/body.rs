//! Body records stored in the connectivity graph.

use cluster_types::{BodyId, EdgeId, Weight};

/// A rigid body as the clustering engine sees it: an anchored flag, a planar
/// footprint, its incident edges, and a cached connectivity weight.
#[derive(Debug, Clone)]
pub struct Body {
    id: BodyId,
    anchored: bool,
    footprint: f64,
    can_sleep: bool,
    edges: Vec<EdgeId>,
    joint_count: usize,
    weight: Weight,
}

impl Body {
    pub(crate) fn new(id: BodyId, footprint: f64, anchored: bool) -> Self {
        Self {
            id,
            anchored,
            footprint,
            can_sleep: true,
            edges: Vec::new(),
            joint_count: 0,
            weight: Weight::of_body(anchored, footprint, 0),
        }
    }

    /// This body's id.
    #[must_use]
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Whether the body is fixed in world space.
    #[must_use]
    pub fn anchored(&self) -> bool {
        self.anchored
    }

    /// Planar footprint size, the geometry input to the weight.
    #[must_use]
    pub fn footprint(&self) -> f64 {
        self.footprint
    }

    /// Whether the body is currently allowed to sleep.
    #[must_use]
    pub fn can_sleep(&self) -> bool {
        self.can_sleep
    }

    /// The cached connectivity weight.
    #[must_use]
    pub fn weight(&self) -> Weight {
        self.weight
    }

    /// Incident edges, in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    /// Number of incident joints (contacts excluded).
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    pub(crate) fn set_anchored(&mut self, anchored: bool) {
        self.anchored = anchored;
        self.refresh_weight();
    }

    pub(crate) fn set_footprint(&mut self, footprint: f64) {
        self.footprint = footprint;
        self.refresh_weight();
    }

    pub(crate) fn set_can_sleep(&mut self, can_sleep: bool) {
        self.can_sleep = can_sleep;
    }

    pub(crate) fn attach_edge(&mut self, edge: EdgeId, is_joint: bool) {
        debug_assert!(!self.edges.contains(&edge), "edge attached twice");
        self.edges.push(edge);
        if is_joint {
            self.joint_count += 1;
            self.refresh_weight();
        }
    }

    pub(crate) fn detach_edge(&mut self, edge: EdgeId, is_joint: bool) {
        let pos = self
            .edges
            .iter()
            .position(|&e| e == edge)
            .unwrap_or_else(|| panic!("edge {edge} not incident to {}", self.id));
        self.edges.swap_remove(pos);
        if is_joint {
            self.joint_count -= 1;
            self.refresh_weight();
        }
    }

    // The only recomputation point: anchor flip, resize, joint-count change.
    fn refresh_weight(&mut self) {
        self.weight = Weight::of_body(self.anchored, self.footprint, self.joint_count);
    }
}
