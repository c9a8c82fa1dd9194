//! Random edit sequences must keep the partition invariants and converge.

use cluster_core::ClusterEngine;
use cluster_graph::{EdgeSpec, PartGraph};
use cluster_types::{BodyId, EdgeId};
use nalgebra::{Unit, Vector3};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Edit {
    AddBody { footprint: u8, anchored: bool },
    AddRigid(usize, usize),
    AddMotor(usize, usize),
    AddContact(usize, usize),
    RemoveEdge(usize),
    RemoveBody(usize),
    ToggleAnchor(usize),
    Settle,
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (0u8..20, any::<bool>())
            .prop_map(|(footprint, anchored)| Edit::AddBody { footprint, anchored }),
        3 => (0usize..64, 0usize..64).prop_map(|(a, b)| Edit::AddRigid(a, b)),
        2 => (0usize..64, 0usize..64).prop_map(|(a, b)| Edit::AddMotor(a, b)),
        1 => (0usize..64, 0usize..64).prop_map(|(a, b)| Edit::AddContact(a, b)),
        2 => (0usize..64).prop_map(Edit::RemoveEdge),
        1 => (0usize..64).prop_map(Edit::RemoveBody),
        1 => (0usize..64).prop_map(Edit::ToggleAnchor),
        1 => Just(Edit::Settle),
    ]
}

struct World {
    graph: PartGraph,
    engine: ClusterEngine,
    bodies: Vec<BodyId>,
    edges: Vec<EdgeId>,
}

impl World {
    fn new() -> Self {
        Self {
            graph: PartGraph::new(),
            engine: ClusterEngine::new(),
            bodies: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn add_edge(&mut self, i: usize, j: usize, spec: EdgeSpec) {
        if self.bodies.len() < 2 {
            return;
        }
        let a = self.bodies[i % self.bodies.len()];
        let b = self.bodies[j % self.bodies.len()];
        if a == b {
            return;
        }
        let edge = self.graph.add_edge(a, b, spec).unwrap();
        self.engine.on_edge_added(&self.graph, edge).unwrap();
        self.edges.push(edge);
    }

    fn apply(&mut self, edit: &Edit) {
        match *edit {
            Edit::AddBody { footprint, anchored } => {
                let body = self.graph.add_body(f64::from(footprint), anchored);
                self.engine.on_body_added(&self.graph, body).unwrap();
                self.bodies.push(body);
            }
            Edit::AddRigid(i, j) => self.add_edge(i, j, EdgeSpec::rigid()),
            Edit::AddMotor(i, j) => {
                self.add_edge(i, j, EdgeSpec::motor(Unit::new_normalize(Vector3::z())));
            }
            Edit::AddContact(i, j) => self.add_edge(i, j, EdgeSpec::Contact),
            Edit::RemoveEdge(i) => {
                if self.edges.is_empty() {
                    return;
                }
                let edge = self.edges.swap_remove(i % self.edges.len());
                self.engine.on_edge_removing(&self.graph, edge).unwrap();
                self.graph.remove_edge(edge).unwrap();
            }
            Edit::RemoveBody(i) => {
                if self.bodies.is_empty() {
                    return;
                }
                let pos = i % self.bodies.len();
                let body = self.bodies[pos];
                // the joint layer removes edges before their endpoints
                if self.graph.incident_edges(body).count() != 0 {
                    return;
                }
                self.engine.on_body_removing(&self.graph, body).unwrap();
                self.graph.remove_body(body).unwrap();
                self.bodies.swap_remove(pos);
            }
            Edit::ToggleAnchor(i) => {
                if self.bodies.is_empty() {
                    return;
                }
                let body = self.bodies[i % self.bodies.len()];
                let anchored = !self.graph.anchored(body);
                self.graph.set_anchored(body, anchored).unwrap();
                if anchored {
                    self.engine.on_anchor_added(&self.graph, body).unwrap();
                } else {
                    self.engine.on_anchor_removing(&self.graph, body).unwrap();
                }
            }
            Edit::Settle => {
                self.engine.process(&self.graph);
                self.engine.check_invariants(&self.graph);
                assert!(self.engine.is_up_to_date());
            }
        }
    }

    /// Final clustering, as raw ids comparable across worlds.
    fn snapshot(&self) -> Vec<(u64, u64)> {
        self.bodies
            .iter()
            .map(|&body| {
                (
                    self.engine.clump_of(body).unwrap().raw(),
                    self.engine.assembly_of(body).unwrap().raw(),
                )
            })
            .collect()
    }
}

proptest! {
    #[test]
    fn test_random_edit_sequences_converge(
        edits in proptest::collection::vec(edit_strategy(), 0..60)
    ) {
        let mut world = World::new();
        for edit in &edits {
            world.apply(edit);
        }
        world.engine.process(&world.graph);
        world.engine.check_invariants(&world.graph);

        prop_assert!(world.engine.is_up_to_date());
        for &body in &world.bodies {
            let cid = world.engine.clump_of(body);
            prop_assert!(cid.is_some());
            prop_assert!(world.engine.assembly_of(body).is_some());

            // once settled, every anchored body roots its own clump and
            // owns the clump's anchor
            let clump = world.engine.clump(cid.unwrap()).unwrap();
            if world.graph.anchored(body) {
                prop_assert_eq!(clump.root(), body);
                prop_assert_eq!(clump.anchor(), Some(body));
            }
        }
        prop_assert_eq!(world.engine.metrics().pending_bodies, 0);
    }

    #[test]
    fn test_identical_edit_sequences_cluster_identically(
        edits in proptest::collection::vec(edit_strategy(), 0..40)
    ) {
        let mut first = World::new();
        let mut second = World::new();
        for edit in &edits {
            first.apply(edit);
            second.apply(edit);
        }
        first.engine.process(&first.graph);
        second.engine.process(&second.graph);
        prop_assert_eq!(first.snapshot(), second.snapshot());
    }
}
