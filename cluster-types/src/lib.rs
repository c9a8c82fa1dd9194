//! Core types for connectivity clustering of simulated rigid bodies.
//!
//! This crate provides the foundational types for the clustering pipeline:
//!
//! - [`BodyId`], [`EdgeId`], [`ClumpId`], [`AssemblyId`] - typed identifiers
//! - [`EdgeKind`] - the taxonomy of links between bodies
//! - [`Weight`] - the deterministic tie-break key for merge/destroy decisions
//! - [`ClusterEvent`] - notifications delivered to downstream stages
//! - [`ClusterError`] - caller-protocol errors
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no clustering behavior. They're
//! the common language between:
//!
//! - The connectivity graph (`cluster-graph`)
//! - The clustering engine (`cluster-core`)
//! - Downstream consumers (sleep management, collision filtering, solvers)
//!
//! # Clustering Vocabulary
//!
//! Bodies joined by *rigid* joints aggregate into **clumps** (rooted spanning
//! trees). Clumps joined by *motor* joints aggregate into **assemblies**, the
//! unit a simulation integrates, sleeps, and wakes as one. Every merge or
//! destroy decision is tie-broken by [`Weight`]: anchored structures always
//! outrank free ones, and larger structures outrank smaller ones, so churn is
//! biased toward keeping large anchored aggregates stable.
//!
//! # Example
//!
//! ```
//! use cluster_types::{BodyId, Weight};
//!
//! let heavy = Weight::of_body(false, 12.0, 3);
//! let light = Weight::of_body(false, 2.0, 1);
//! let anchored = Weight::of_body(true, 1.0, 1);
//!
//! assert!(heavy > light);
//! // Anchored always dominates, regardless of size.
//! assert!(anchored > heavy);
//! ```

#![doc(html_root_url = "https://docs.rs/cluster-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]

mod edge;
mod error;
mod event;
mod id;
mod weight;

pub use edge::EdgeKind;
pub use error::ClusterError;
pub use event::ClusterEvent;
pub use id::{AssemblyId, BodyId, ClumpId, EdgeId};
pub use weight::Weight;

/// Result type for clustering operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
