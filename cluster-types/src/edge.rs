//! Edge taxonomy for the connectivity graph.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kind of a link between two bodies.
///
/// Only rigid and motor joints participate in clustering. Breakable joints
/// and contacts are classified as internal or external to an assembly and
/// forwarded downstream, but never shape clumps or assemblies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EdgeKind {
    /// Permanent structural joint. Builds clumps.
    Rigid,
    /// Driven/kinematic joint. Builds assemblies from clumps.
    Motor,
    /// Joint that can break under load. Propagated, never clustered.
    Breakable,
    /// Transient contact from the narrow phase. Propagated, never clustered.
    Contact,
}

impl EdgeKind {
    /// Whether this kind builds clumps.
    #[must_use]
    pub const fn is_rigid(self) -> bool {
        matches!(self, Self::Rigid)
    }

    /// Whether this kind builds assemblies.
    #[must_use]
    pub const fn is_motor(self) -> bool {
        matches!(self, Self::Motor)
    }

    /// Whether this kind participates in clustering at all.
    #[must_use]
    pub const fn clusters(self) -> bool {
        matches!(self, Self::Rigid | Self::Motor)
    }

    /// Whether this kind counts as a joint (contacts do not) for the
    /// purposes of the connectivity weight.
    #[must_use]
    pub const fn is_joint(self) -> bool {
        !matches!(self, Self::Contact)
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rigid => write!(f, "rigid"),
            Self::Motor => write!(f, "motor"),
            Self::Breakable => write!(f, "breakable"),
            Self::Contact => write!(f, "contact"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clustering_kinds() {
        assert!(EdgeKind::Rigid.clusters());
        assert!(EdgeKind::Motor.clusters());
        assert!(!EdgeKind::Breakable.clusters());
        assert!(!EdgeKind::Contact.clusters());
    }

    #[test]
    fn test_joint_kinds() {
        assert!(EdgeKind::Rigid.is_joint());
        assert!(EdgeKind::Motor.is_joint());
        assert!(EdgeKind::Breakable.is_joint());
        assert!(!EdgeKind::Contact.is_joint());
    }

    #[test]
    fn test_predicates_are_exclusive() {
        assert!(EdgeKind::Rigid.is_rigid() && !EdgeKind::Rigid.is_motor());
        assert!(EdgeKind::Motor.is_motor() && !EdgeKind::Motor.is_rigid());
    }
}
