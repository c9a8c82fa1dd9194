//! Connectivity graph of simulated rigid bodies.
//!
//! This crate provides [`PartGraph`], the body/edge graph that the
//! clustering engine queries. The graph is owned by the host world; the
//! engine receives it as a shared reference and never mutates it. All
//! cluster membership state (which clump owns which body, which assembly
//! owns which clump) lives inside the engine, so the graph stays a pure
//! record of *what is connected to what*.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     Host world                            │
//! │  add_body / add_edge / set_anchored / set_motor_angle     │
//! └───────────────────────────┬───────────────────────────────┘
//!                             │ &PartGraph (read-only)
//!                             ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                  Clustering engine                        │
//! │  weight(body), incident edges, endpoints, kind, frames    │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Cached weights
//!
//! Each body caches its connectivity [`Weight`](cluster_types::Weight). The
//! cache is invalidated on exactly three events: footprint resize, incident
//! joint-count change, and anchor flip. It is never recomputed implicitly,
//! so iterating bodies during clustering sees a stable ordering.
//!
//! # Example
//!
//! ```
//! use cluster_graph::{EdgeSpec, PartGraph};
//! use cluster_types::EdgeKind;
//!
//! let mut graph = PartGraph::new();
//! let a = graph.add_body(4.0, false);
//! let b = graph.add_body(1.0, false);
//! let joint = graph.add_edge(a, b, EdgeSpec::rigid()).unwrap();
//!
//! assert_eq!(graph.kind(joint), EdgeKind::Rigid);
//! assert_eq!(graph.other_body(joint, a), b);
//! assert_eq!(graph.weight(a).weighted_size, 4);
//! ```

#![doc(html_root_url = "https://docs.rs/cluster-graph/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod body;
mod edge;
mod graph;

pub use body::Body;
pub use edge::{Edge, EdgeSpec};
pub use graph::PartGraph;
