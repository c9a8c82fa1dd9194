//! Edge records stored in the connectivity graph.

use cluster_types::{BodyId, EdgeId, EdgeKind};
use nalgebra::{Isometry3, Unit, Vector3};

/// Kind-specific payload supplied when an edge is created.
///
/// Rigid joints carry the fixed relative frame of endpoint `b` in endpoint
/// `a`; motor joints carry a base frame plus a drive axis and a mutable
/// angle. Breakable joints and contacts carry no clustering-relevant data.
#[derive(Debug, Clone)]
pub enum EdgeSpec {
    /// Permanent structural joint.
    Rigid {
        /// Frame of endpoint `b` expressed in endpoint `a`.
        b_in_a: Isometry3<f64>,
    },
    /// Driven/kinematic joint.
    Motor {
        /// Frame of endpoint `b` in endpoint `a` at angle zero.
        base_b_in_a: Isometry3<f64>,
        /// Drive axis in endpoint `a`'s frame.
        axis: Unit<Vector3<f64>>,
        /// Current drive angle in radians.
        angle: f64,
    },
    /// Joint that can break under load.
    Breakable,
    /// Transient contact.
    Contact,
}

impl EdgeSpec {
    /// A rigid joint with an identity relative frame.
    #[must_use]
    pub fn rigid() -> Self {
        Self::Rigid {
            b_in_a: Isometry3::identity(),
        }
    }

    /// A motor joint about the given axis with an identity base frame.
    #[must_use]
    pub fn motor(axis: Unit<Vector3<f64>>) -> Self {
        Self::Motor {
            base_b_in_a: Isometry3::identity(),
            axis,
            angle: 0.0,
        }
    }

    /// The edge kind this payload implies.
    #[must_use]
    pub fn kind(&self) -> EdgeKind {
        match self {
            Self::Rigid { .. } => EdgeKind::Rigid,
            Self::Motor { .. } => EdgeKind::Motor,
            Self::Breakable => EdgeKind::Breakable,
            Self::Contact => EdgeKind::Contact,
        }
    }
}

/// An edge between two bodies.
#[derive(Debug, Clone)]
pub struct Edge {
    id: EdgeId,
    a: BodyId,
    b: BodyId,
    spec: EdgeSpec,
}

impl Edge {
    pub(crate) fn new(id: EdgeId, a: BodyId, b: BodyId, spec: EdgeSpec) -> Self {
        Self { id, a, b, spec }
    }

    /// This edge's id.
    #[must_use]
    pub fn id(&self) -> EdgeId {
        self.id
    }

    /// Both endpoints, in creation order.
    #[must_use]
    pub fn endpoints(&self) -> (BodyId, BodyId) {
        (self.a, self.b)
    }

    /// The edge kind.
    #[must_use]
    pub fn kind(&self) -> EdgeKind {
        self.spec.kind()
    }

    /// The kind-specific payload.
    #[must_use]
    pub fn spec(&self) -> &EdgeSpec {
        &self.spec
    }

    /// The endpoint opposite `body`.
    ///
    /// # Panics
    ///
    /// Panics if `body` is not an endpoint of this edge.
    #[must_use]
    pub fn other(&self, body: BodyId) -> BodyId {
        if body == self.a {
            self.b
        } else if body == self.b {
            self.a
        } else {
            panic!("{body} is not an endpoint of {}", self.id)
        }
    }

    /// Whether `body` is an endpoint of this edge.
    #[must_use]
    pub fn touches(&self, body: BodyId) -> bool {
        body == self.a || body == self.b
    }

    pub(crate) fn set_motor_angle(&mut self, new_angle: f64) {
        match &mut self.spec {
            EdgeSpec::Motor { angle, .. } => *angle = new_angle,
            _ => panic!("{} is not a motor", self.id),
        }
    }

    /// Current frame of the endpoint opposite `parent` expressed in
    /// `parent`'s frame.
    ///
    /// For rigid joints this is the fixed relative frame; for motors it is
    /// the base frame composed with the rotation about the drive axis by the
    /// current angle.
    ///
    /// # Panics
    ///
    /// Panics for breakable joints and contacts, which carry no frame, and
    /// if `parent` is not an endpoint.
    #[must_use]
    pub fn frame_in(&self, parent: BodyId) -> Isometry3<f64> {
        assert!(self.touches(parent), "{parent} not on {}", self.id);
        let b_in_a = match &self.spec {
            EdgeSpec::Rigid { b_in_a } => *b_in_a,
            EdgeSpec::Motor {
                base_b_in_a,
                axis,
                angle,
            } => {
                let drive = Isometry3::rotation(axis.into_inner() * *angle);
                base_b_in_a * drive
            }
            EdgeSpec::Breakable | EdgeSpec::Contact => {
                panic!("{} carries no relative frame", self.id)
            }
        };
        if parent == self.a {
            b_in_a
        } else {
            b_in_a.inverse()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_other_endpoint() {
        let e = Edge::new(EdgeId::new(0), BodyId::new(1), BodyId::new(2), EdgeSpec::rigid());
        assert_eq!(e.other(BodyId::new(1)), BodyId::new(2));
        assert_eq!(e.other(BodyId::new(2)), BodyId::new(1));
    }

    #[test]
    #[should_panic(expected = "not an endpoint")]
    fn test_other_rejects_non_endpoint() {
        let e = Edge::new(EdgeId::new(0), BodyId::new(1), BodyId::new(2), EdgeSpec::rigid());
        let _ = e.other(BodyId::new(3));
    }

    #[test]
    fn test_motor_frame_tracks_angle() {
        let axis = Unit::new_normalize(Vector3::z());
        let mut e = Edge::new(
            EdgeId::new(0),
            BodyId::new(1),
            BodyId::new(2),
            EdgeSpec::motor(axis),
        );
        e.set_motor_angle(std::f64::consts::FRAC_PI_2);

        let frame = e.frame_in(BodyId::new(1));
        let rotated = frame.transform_vector(&Vector3::x());
        assert_relative_eq!(rotated, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_frame_inverts_for_other_side() {
        let mut iso = Isometry3::identity();
        iso.translation.vector = Vector3::new(1.0, 0.0, 0.0);
        let e = Edge::new(
            EdgeId::new(0),
            BodyId::new(1),
            BodyId::new(2),
            EdgeSpec::Rigid { b_in_a: iso },
        );

        let forward = e.frame_in(BodyId::new(1));
        let backward = e.frame_in(BodyId::new(2));
        assert_relative_eq!(
            (forward * backward).translation.vector,
            Vector3::zeros(),
            epsilon = 1e-12
        );
    }
}
