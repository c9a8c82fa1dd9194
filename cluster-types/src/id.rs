//! Typed identifiers for the clustering graph and its aggregates.
//!
//! Identifiers are `u64` newtypes. Clump and assembly ids are allocated by
//! the engine in increasing order and never reused within an engine's
//! lifetime, so a stale id can always be detected by a failed table lookup.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident, $display:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new id.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw id value.
            #[must_use]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($display, "({})"), self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a rigid body in the connectivity graph.
    BodyId,
    "Body"
);

define_id!(
    /// Unique identifier for an edge (joint or contact) between two bodies.
    EdgeId,
    "Edge"
);

define_id!(
    /// Unique identifier for a clump (rigid-joint spanning tree of bodies).
    ClumpId,
    "Clump"
);

define_id!(
    /// Unique identifier for an assembly (motor-joint group of clumps).
    AssemblyId,
    "Assembly"
);
