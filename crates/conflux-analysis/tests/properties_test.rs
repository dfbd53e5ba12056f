//! Property-based tests over randomly wired pipelines

use conflux_analysis::{Error, analyze_topology, propagate_metadata};
use conflux_core::{
    Component, Edge, EdgeRef, Endpoint, GraphId, Metadata, MetadataSource, Phase, Pipeline,
    Priority, RecordSchema, StaticMetadata, TransportMode,
};
use proptest::prelude::*;

/// One component of a random pipeline
#[derive(Debug, Clone)]
struct Node {
    phase: Phase,
    pass_through: bool,
    suggests: Option<i32>,
}

fn node() -> impl Strategy<Value = Node> {
    (0..3i32, any::<bool>(), prop::option::of(0..5i32)).prop_map(|(phase, pass_through, suggests)| {
        Node {
            phase,
            pass_through,
            suggests,
        }
    })
}

fn wiring() -> impl Strategy<Value = (Vec<Node>, Vec<(usize, usize)>)> {
    (2usize..8).prop_flat_map(|n| {
        (
            prop::collection::vec(node(), n),
            prop::collection::vec((0..n, 0..n), 0..16),
        )
    })
}

fn schema(name: &str) -> RecordSchema {
    RecordSchema::new(name).with_field("id", "integer")
}

/// Every arc gets the next free output port of its writer and the next free
/// input port of its reader, so no port is ever shared.
fn build(nodes: &[Node], arcs: &[(usize, usize)]) -> Pipeline {
    let mut outs = vec![0; nodes.len()];
    let mut ins = vec![0; nodes.len()];
    let mut edges = Vec::with_capacity(arcs.len());
    for (i, &(from, to)) in arcs.iter().enumerate() {
        edges.push(Edge::new(
            format!("e{i}"),
            Endpoint::new(format!("c{from}"), outs[from]),
            Endpoint::new(format!("c{to}"), ins[to]),
        ));
        outs[from] += 1;
        ins[to] += 1;
    }

    let mut pipeline = Pipeline::new("random");
    for (c, node) in nodes.iter().enumerate() {
        let id = format!("c{c}");
        let mut component = if node.pass_through {
            Component::pass_through(id.as_str())
        } else {
            let mut defaults = StaticMetadata::default();
            if let Some(priority) = node.suggests {
                for port in 0..outs[c] {
                    let metadata = Metadata::new(schema(&id)).with_priority(Priority(priority));
                    defaults = defaults.with_output(port, metadata);
                }
            }
            Component::standard(id.as_str()).with_metadata(MetadataSource::Static(defaults))
        };
        component = component.with_phase(node.phase).with_ports(ins[c], outs[c]);
        pipeline.add_component(GraphId::ROOT, component).unwrap();
    }
    for edge in edges {
        pipeline.add_edge(GraphId::ROOT, edge).unwrap();
    }
    pipeline
}

fn snapshot(pipeline: &mut Pipeline) -> Vec<(EdgeRef, Option<Metadata>)> {
    propagate_metadata(pipeline)
        .iter()
        .map(|(edge, metadata)| (edge, metadata.cloned()))
        .collect()
}

proptest! {
    #[test]
    fn test_strictly_higher_reader_wins(writer in 0..10i32, reader in 0..10i32) {
        let mut pipeline = Pipeline::new("pair");
        let source = StaticMetadata::default()
            .with_output(0, Metadata::new(schema("written")).with_priority(Priority(writer)));
        let sink = StaticMetadata::default()
            .with_input(0, Metadata::new(schema("read")).with_priority(Priority(reader)));
        pipeline
            .add_component(
                GraphId::ROOT,
                Component::standard("w").with_ports(0, 1).with_metadata(MetadataSource::Static(source)),
            )
            .unwrap();
        pipeline
            .add_component(
                GraphId::ROOT,
                Component::standard("r").with_ports(1, 0).with_metadata(MetadataSource::Static(sink)),
            )
            .unwrap();
        pipeline
            .add_edge(GraphId::ROOT, Edge::new("e", Endpoint::new("w", 0), Endpoint::new("r", 0)))
            .unwrap();

        let result = propagate_metadata(&mut pipeline);
        let winner = &result.metadata("e").unwrap().schema().name;
        let expected = if reader > writer { "read" } else { "written" };
        prop_assert_eq!(winner.as_str(), expected);
    }

    #[test]
    fn test_propagation_terminates_and_is_idempotent((nodes, arcs) in wiring()) {
        let mut pipeline = build(&nodes, &arcs);
        let first = snapshot(&mut pipeline);
        let second = snapshot(&mut pipeline);
        prop_assert_eq!(first.len(), arcs.len());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_writer_suggestion_always_resolves((nodes, arcs) in wiring()) {
        let mut pipeline = build(&nodes, &arcs);
        let result = propagate_metadata(&mut pipeline);

        for (i, &(from, _)) in arcs.iter().enumerate() {
            if nodes[from].suggests.is_some() && !nodes[from].pass_through {
                prop_assert!(result.metadata(&format!("e{i}")).is_some(), "edge e{}", i);
            }
        }
    }

    #[test]
    fn test_single_phase_graphs_always_classify((nodes, arcs) in wiring()) {
        let nodes: Vec<Node> = nodes.into_iter().map(|n| Node { phase: 0, ..n }).collect();
        let mut pipeline = build(&nodes, &arcs);
        let report = analyze_topology(&mut pipeline).unwrap();

        prop_assert_eq!(report.count(TransportMode::PhaseBoundary), 0);
        for (i, &(from, to)) in arcs.iter().enumerate() {
            if from == to {
                prop_assert_eq!(report.mode(&format!("e{i}")), Some(TransportMode::Buffered));
            }
        }
    }

    #[test]
    fn test_classification_is_stable((nodes, arcs) in wiring()) {
        let mut pipeline = build(&nodes, &arcs);
        match analyze_topology(&mut pipeline) {
            Ok(first) => {
                for (i, &(from, to)) in arcs.iter().enumerate() {
                    if nodes[from].phase != nodes[to].phase {
                        prop_assert_eq!(
                            first.mode(&format!("e{i}")),
                            Some(TransportMode::PhaseBoundary)
                        );
                    }
                }
                let second = analyze_topology(&mut pipeline).unwrap();
                let first: Vec<_> = first.iter().collect();
                let second: Vec<_> = second.iter().collect();
                prop_assert_eq!(first, second);
            }
            Err(err) => {
                let is_cycle = matches!(err, Error::CrossPhaseCycle { .. });
                prop_assert!(is_cycle, "unexpected error: {}", err);
            }
        }
    }
}
