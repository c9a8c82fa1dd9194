//! Error types for clustering operations.
//!
//! Errors cover caller-protocol violations detectable at the public API
//! boundary. Structural conflicts (two clumps claiming a joint, weight ties,
//! cyclic rigid joints) are *expected* and resolved internally - they are
//! never surfaced as errors. Internal invariant violations (duplicate buffer
//! insertion, missing expected membership) indicate a defect and abort via
//! assertion rather than returning.

use thiserror::Error;

use crate::{BodyId, EdgeId};

/// Errors that can occur at the clustering API boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// A body id not present in the graph was referenced.
    #[error("unknown body: {0}")]
    UnknownBody(BodyId),

    /// An edge id not present in the graph was referenced.
    #[error("unknown edge: {0}")]
    UnknownEdge(EdgeId),

    /// A body was added twice.
    #[error("duplicate body: {0}")]
    DuplicateBody(BodyId),

    /// An edge was added twice.
    #[error("duplicate edge: {0}")]
    DuplicateEdge(EdgeId),

    /// A body was removed while edges were still incident to it. The joint
    /// layer must remove edges before removing their endpoints.
    #[error("body {body} still has {edges} incident edge(s)")]
    BodyHasEdges {
        /// The body being removed.
        body: BodyId,
        /// How many edges are still incident.
        edges: usize,
    },

    /// A self-loop edge was added. Both endpoints of an edge must differ.
    #[error("edge {edge} connects body {body} to itself")]
    SelfLoop {
        /// The offending edge.
        edge: EdgeId,
        /// The repeated endpoint.
        body: BodyId,
    },

    /// An operation that only applies to one edge kind was invoked on
    /// another (e.g. setting a motor angle on a rigid joint).
    #[error("edge {edge} is {actual}, expected {expected}")]
    WrongEdgeKind {
        /// The offending edge.
        edge: EdgeId,
        /// Kind the operation requires.
        expected: crate::EdgeKind,
        /// Kind the edge actually has.
        actual: crate::EdgeKind,
    },

    /// The anchored flag was toggled to the value it already has.
    #[error("anchor state of body {0} is already {1}")]
    AnchorUnchanged(BodyId, bool),
}
