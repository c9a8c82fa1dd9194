//! Incremental connectivity clustering for rigid-body simulation.
//!
//! This crate maintains a live partition of simulated rigid bodies into
//! connectivity-based aggregates:
//!
//! - **Clumps**: maximal sets of bodies connected only by rigid joints,
//!   structured as rooted spanning trees.
//! - **Assemblies**: maximal sets of clumps connected by motor joints - the
//!   unit the simulation integrates, sleeps, and wakes as one.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       ClusterEngine                          │
//! │  entry points: on_body_added, on_edge_added, on_anchor_…     │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ stage into
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      PendingBuffers                          │
//! │  anchors │ rigid 2/1/0 │ bodies │ motors │ edges │ angles    │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ process() fixed point
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │   anchors → rigid twos → rigid ones → bodies  (clump loop)   │
//! │   motors → assemblies → edges → motor angles  (tail passes)  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! External edits (body add/remove, joint add/remove, anchor toggles,
//! motor-angle changes) are pushed into the pending buffers. The driver then
//! drains them pass by pass; a destructive step (clump or assembly teardown)
//! only ever moves work back into an *earlier* buffer, so the outer loop is
//! a terminating fixed point. All conflicts are resolved by weight: anchored
//! structures outrank free ones, bigger outranks smaller, and exact ties are
//! either recorded as inconsistent joints or broken by stable id order.
//!
//! # Example
//!
//! ```
//! use cluster_core::ClusterEngine;
//! use cluster_graph::{EdgeSpec, PartGraph};
//!
//! let mut graph = PartGraph::new();
//! let mut engine = ClusterEngine::new();
//!
//! let a = graph.add_body(10.0, true);
//! let b = graph.add_body(5.0, false);
//! engine.on_body_added(&graph, a).unwrap();
//! engine.on_body_added(&graph, b).unwrap();
//!
//! let joint = graph.add_edge(a, b, EdgeSpec::rigid()).unwrap();
//! engine.on_edge_added(&graph, joint).unwrap();
//!
//! engine.process(&graph);
//! assert!(engine.is_up_to_date());
//! // One anchored clump rooted at the anchored body, inside one assembly.
//! assert_eq!(engine.clump_of(a), engine.clump_of(b));
//! ```

#![doc(html_root_url = "https://docs.rs/cluster-core/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod assembly;
mod buffers;
mod clump;
mod engine;

pub use assembly::Assembly;
pub use clump::{Clump, SpanLink};
pub use engine::{ClusterEngine, EngineMetrics};
