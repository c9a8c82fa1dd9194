//! Notifications delivered to downstream stages.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{AssemblyId, EdgeId};

/// A notification produced while the clustering engine converges.
///
/// Events are recorded in the order the corresponding structural change
/// happened and drained by the caller after `process()` returns. Downstream
/// consumers (sleep stage, collision stage, solver) must treat every
/// reference they hold into an assembly as invalidated the moment they see
/// [`AssemblyRemoving`](ClusterEvent::AssemblyRemoving) for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClusterEvent {
    /// A new assembly was published. It is now the unit of integration,
    /// sleep, and wake for its member bodies.
    AssemblyCreated(AssemblyId),

    /// An assembly is being destroyed. Emitted before its clumps and edges
    /// return to the pending pools; consumers must drop all references.
    AssemblyRemoving(AssemblyId),

    /// A non-clustering edge now crosses two assemblies, at least one of
    /// which is unanchored, and needs dynamic tracking downstream.
    ExternalEdgeAdded(EdgeId),

    /// A previously reported external edge no longer needs tracking.
    ExternalEdgeRemoving(EdgeId),

    /// A sleep-affecting property changed on a body whose assembly may be
    /// sleeping; the sleep stage should wake it.
    WakeRequest(AssemblyId),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_equality() {
        let a = ClusterEvent::AssemblyCreated(AssemblyId::new(1));
        let b = ClusterEvent::AssemblyCreated(AssemblyId::new(1));
        assert_eq!(a, b);
        assert_ne!(a, ClusterEvent::AssemblyRemoving(AssemblyId::new(1)));
    }
}
