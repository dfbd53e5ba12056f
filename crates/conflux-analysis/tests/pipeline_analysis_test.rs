//! Integration tests running both analyses over pipelines built from YAML
//!
//! Covers:
//! - Transport classification across phases, cycles and nested graphs
//! - Metadata flowing through pass-throughs, providers and subgraph hosts
//! - Fatal structural errors and the untouched caches they leave behind
//! - Report serialization

use conflux_analysis::{
    Error, MetadataPropagationResolver, PropagationOptions, analyze_topology, propagate_metadata,
};
use conflux_core::{
    Component, ComponentRef, Edge, EdgeRef, Endpoint, GraphId, Metadata, MetadataSource,
    OriginStep, Pipeline, PipelineDefinition, RecordSchema, StaticMetadata, TransportMode,
};
use rstest::rstest;

const ORDERS: &str = r#"
name: orders
metadata:
  order:
    fields:
      - { name: id, type: integer }
  customer:
    fields:
      - { name: name, type: string }
components:
  - id: reader
    outputs: 1
    defaults:
      outputs: { 0: order }
  - id: copy
    kind: pass_through
    inputs: 1
    outputs: 1
  - id: lookup
    outputs: 1
    defaults:
      outputs: { 0: customer }
  - id: host
    inputs: 1
    outputs: 1
    subgraph:
      name: enrich
      input: in
      output: out
      components:
        - { id: in, kind: subgraph_input, outputs: 1 }
        - { id: out, kind: subgraph_output, inputs: 1 }
      edges:
        - { id: inner, from: "in:0", to: "out:0" }
  - id: join
    provider: concatenate
    inputs: 2
    outputs: 1
  - id: sink
    phase: 1
    inputs: 1
  - id: loop_a
    inputs: 1
    outputs: 1
  - id: loop_b
    inputs: 1
    outputs: 1
edges:
  - { id: e1, from: "reader:0", to: "copy:0" }
  - { id: e2, from: "copy:0", to: "join:0" }
  - { id: e3, from: "lookup:0", to: "host:0" }
  - { id: e4, from: "host:0", to: "join:1" }
  - { id: e5, from: "join:0", to: "sink:0" }
  - { id: l1, from: "loop_a:0", to: "loop_b:0" }
  - { id: l2, from: "loop_b:0", to: "loop_a:0" }
"#;

fn build(yaml: &str) -> Pipeline {
    PipelineDefinition::from_yaml(yaml).unwrap().build().unwrap()
}

// =============================================================================
// Topology Tests
// =============================================================================

#[test]
fn test_topology_over_built_pipeline() {
    let mut pipeline = build(ORDERS);
    let report = analyze_topology(&mut pipeline).unwrap();

    for edge in ["e1", "e2", "e3", "e4"] {
        assert_eq!(report.mode(edge), Some(TransportMode::Direct), "edge {edge}");
    }
    assert_eq!(report.mode("e5"), Some(TransportMode::PhaseBoundary));
    assert_eq!(report.mode("l1"), Some(TransportMode::Buffered));
    assert_eq!(report.mode("l2"), Some(TransportMode::Buffered));
    assert_eq!(report.mode_recursive("inner"), Some(TransportMode::Direct));

    assert_eq!(report.len(), 8);
    assert_eq!(report.count(TransportMode::Buffered), 2);
    assert_eq!(
        pipeline.root().edge("e5").unwrap().transport(),
        Some(TransportMode::PhaseBoundary)
    );
}

#[test]
fn test_cross_phase_cycle_from_definition() {
    let yaml = r#"
name: tangled
components:
  - { id: a, phase: 0, inputs: 1, outputs: 1 }
  - { id: b, phase: 1, inputs: 1, outputs: 1 }
edges:
  - { id: ab, from: "a:0", to: "b:0" }
  - { id: ba, from: "b:0", to: "a:0" }
"#;
    let mut pipeline = build(yaml);
    let err = analyze_topology(&mut pipeline).unwrap_err();

    match &err {
        Error::CrossPhaseCycle {
            graph,
            phases,
            components,
        } => {
            assert_eq!(graph, "tangled");
            assert_eq!(phases, &vec![0, 1]);
            assert_eq!(components, &vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("expected CrossPhaseCycle, got {other:?}"),
    }
    assert_eq!(err.offending_components(), vec!["a", "b"]);
    assert!(pipeline.root().edge("ab").unwrap().transport().is_none());
}

#[test]
fn test_half_connected_edge_from_definition() {
    let yaml = r#"
name: loose
components:
  - { id: a, outputs: 1 }
edges:
  - { id: dangling, from: "a:0" }
"#;
    let mut pipeline = build(yaml);
    let err = analyze_topology(&mut pipeline).unwrap_err();
    assert!(matches!(err, Error::MissingEndpoint { side: "sink", .. }));
}

// =============================================================================
// Propagation Tests
// =============================================================================

#[test]
fn test_metadata_flows_through_the_whole_tree() {
    let mut pipeline = build(ORDERS);
    let nested = pipeline.children(GraphId::ROOT)[0];
    let result = propagate_metadata(&mut pipeline);

    assert_eq!(result.metadata("e1").unwrap().schema().name, "order");
    assert_eq!(result.metadata("e2").unwrap().schema().name, "order");
    assert_eq!(result.metadata("e3").unwrap().schema().name, "customer");
    assert_eq!(result.metadata("e4").unwrap().schema().name, "customer");
    assert_eq!(
        result.metadata_in(nested, "inner").unwrap().schema().name,
        "customer"
    );
    assert_eq!(
        result.find_recursive("inner"),
        Some(EdgeRef::new(nested, "inner"))
    );

    let joined = result.metadata("e5").unwrap();
    assert_eq!(joined.schema().name, "join_concatenated");
    let fields: Vec<&str> = joined
        .schema()
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(fields, vec!["id", "name"]);
    assert_eq!(
        joined.origin().last(),
        Some(&OriginStep::Component {
            component: ComponentRef::new(GraphId::ROOT, "join"),
        })
    );

    let unresolved: Vec<EdgeRef> = result.unresolved().collect();
    assert_eq!(
        unresolved,
        vec![
            EdgeRef::new(GraphId::ROOT, "l1"),
            EdgeRef::new(GraphId::ROOT, "l2")
        ]
    );
    assert_eq!(result.resolved_count(), 6);
    assert_eq!(
        pipeline
            .root()
            .edge("e5")
            .unwrap()
            .resolved_metadata()
            .flatten()
            .map(|m| m.schema().name.as_str()),
        Some("join_concatenated")
    );
}

#[test]
fn test_both_analyses_share_one_pipeline() {
    let mut pipeline = build(ORDERS);
    analyze_topology(&mut pipeline).unwrap();
    propagate_metadata(&mut pipeline);

    let e2 = pipeline.root().edge("e2").unwrap();
    assert_eq!(e2.transport(), Some(TransportMode::Direct));
    assert!(e2.resolved_metadata().flatten().is_some());
}

#[test]
fn test_assignments_override_inferred_metadata() {
    let yaml = r#"
name: referenced
metadata:
  order:
    fields:
      - { name: id, type: integer }
  audit:
    fields:
      - { name: at, type: timestamp }
components:
  - id: reader
    outputs: 3
    defaults:
      outputs: { 0: order, 1: audit, 2: audit }
  - { id: left, inputs: 1 }
  - { id: right, inputs: 1 }
  - { id: archive, inputs: 1 }
edges:
  - { id: orders, from: "reader:0", to: "left:0" }
  - { id: audits, from: "reader:1", to: "right:0", metadata_ref: orders }
  - { id: forced, from: "reader:2", to: "archive:0", metadata: order }
"#;
    let mut pipeline = build(yaml);
    let result = propagate_metadata(&mut pipeline);

    let audits = result.metadata("audits").unwrap();
    assert_eq!(audits.schema().name, "order");
    assert!(audits.origin().contains(&OriginStep::Reference {
        edge: EdgeRef::new(GraphId::ROOT, "orders"),
    }));

    let forced = result.metadata("forced").unwrap();
    assert_eq!(forced.schema().name, "order");
    assert!(forced.has_max_priority());

    // Without the assignment the edge would carry the writer's default
    let hint = result.no_metadata("forced").unwrap().unwrap();
    assert_eq!(hint.schema().name, "audit");
}

#[test]
fn test_hints_skipped_when_disabled() {
    let mut pipeline = build(ORDERS);
    let resolver = MetadataPropagationResolver::with_options(PropagationOptions {
        calculate_no_metadata: false,
    });
    let result = resolver.resolve(&mut pipeline);

    assert!(result.no_metadata("e1").is_none());
    assert!(pipeline.root().edge("e1").unwrap().no_metadata().is_none());
}

// =============================================================================
// Large Graph Tests
// =============================================================================

const LANES: usize = 2;

fn order_source(id: &str, outputs: usize) -> Component {
    let mut defaults = StaticMetadata::default();
    for port in 0..outputs {
        defaults = defaults.with_output(
            port,
            Metadata::new(RecordSchema::new("order").with_field("id", "integer")),
        );
    }
    Component::standard(id)
        .with_ports(0, outputs)
        .with_metadata(MetadataSource::Static(defaults))
}

fn wire(pipeline: &mut Pipeline, id: String, from: (String, usize), to: (String, usize)) {
    pipeline
        .add_edge(
            GraphId::ROOT,
            Edge::new(id, Endpoint::new(from.0, from.1), Endpoint::new(to.0, to.1)),
        )
        .unwrap();
}

/// src => p0 => p1 => ... => dst, every hop over two parallel edges
fn two_lane_chain(length: usize) -> Pipeline {
    let mut pipeline = Pipeline::new("chain");
    pipeline
        .add_component(GraphId::ROOT, order_source("src", LANES))
        .unwrap();
    for i in 0..length {
        let copy = Component::pass_through(format!("p{i}")).with_ports(LANES, LANES);
        pipeline.add_component(GraphId::ROOT, copy).unwrap();
    }
    pipeline
        .add_component(GraphId::ROOT, Component::standard("dst").with_ports(LANES, 0))
        .unwrap();

    let hops: Vec<String> = std::iter::once("src".to_string())
        .chain((0..length).map(|i| format!("p{i}")))
        .chain(std::iter::once("dst".to_string()))
        .collect();
    for (hop, pair) in hops.windows(2).enumerate() {
        for lane in 0..LANES {
            wire(
                &mut pipeline,
                format!("h{hop}_{lane}"),
                (pair[0].clone(), lane),
                (pair[1].clone(), lane),
            );
        }
    }
    pipeline
}

/// r0 => r1 => ... => r0 over two lanes. With a source, `src` feeds a third
/// input of r0 and r(length/2) has a third output into `dst`.
fn two_lane_ring(length: usize, with_source: bool) -> Pipeline {
    let mut pipeline = Pipeline::new("ring");
    let tap = length / 2;
    for i in 0..length {
        let inputs = if with_source && i == 0 { LANES + 1 } else { LANES };
        let outputs = if with_source && i == tap { LANES + 1 } else { LANES };
        let copy = Component::pass_through(format!("r{i}")).with_ports(inputs, outputs);
        pipeline.add_component(GraphId::ROOT, copy).unwrap();
    }
    for i in 0..length {
        for lane in 0..LANES {
            wire(
                &mut pipeline,
                format!("r{i}_{lane}"),
                (format!("r{i}"), lane),
                (format!("r{}", (i + 1) % length), lane),
            );
        }
    }
    if with_source {
        pipeline
            .add_component(GraphId::ROOT, order_source("src", 1))
            .unwrap();
        pipeline
            .add_component(GraphId::ROOT, Component::standard("dst").with_ports(1, 0))
            .unwrap();
        wire(&mut pipeline, "feed".to_string(), ("src".into(), 0), ("r0".into(), LANES));
        wire(
            &mut pipeline,
            "drain".to_string(),
            (format!("r{tap}"), LANES),
            ("dst".into(), 0),
        );
    }
    pipeline
}

#[test]
fn test_long_pass_through_chain_resolves_everywhere() {
    let mut pipeline = two_lane_chain(100);
    let result = propagate_metadata(&mut pipeline);

    assert_eq!(result.len(), LANES * 101);
    assert_eq!(result.unresolved().count(), 0);
    for (edge, metadata) in result.iter() {
        assert_eq!(metadata.unwrap().schema().name, "order", "edge {edge}");
        let hint = result.no_metadata_at(&edge).flatten();
        assert_eq!(hint.map(|m| m.schema().name.as_str()), Some("order"));
    }

    let last = result.metadata("h100_1").unwrap();
    assert_eq!(last.origin().len(), 101);
    assert_eq!(
        last.origin().last(),
        Some(&OriginStep::Component {
            component: ComponentRef::new(GraphId::ROOT, "p99"),
        })
    );
}

#[rstest]
#[case::fed(true)]
#[case::closed(false)]
fn test_pass_through_ring_settles(#[case] with_source: bool) {
    let mut pipeline = two_lane_ring(30, with_source);
    let result = propagate_metadata(&mut pipeline);

    let expected = if with_source { LANES * 30 + 2 } else { LANES * 30 };
    assert_eq!(result.len(), expected);
    for (edge, metadata) in result.iter() {
        let name = metadata.map(|m| m.schema().name.as_str());
        if with_source {
            assert_eq!(name, Some("order"), "edge {edge}");
        } else {
            assert_eq!(name, None, "edge {edge}");
        }
    }

    let again = propagate_metadata(&mut pipeline);
    assert_eq!(
        result.iter().map(|(e, m)| (e, m.cloned())).collect::<Vec<_>>(),
        again.iter().map(|(e, m)| (e, m.cloned())).collect::<Vec<_>>()
    );
}

// =============================================================================
// Serialization Tests
// =============================================================================

#[test]
fn test_reports_serialize_to_json() {
    let mut pipeline = build(ORDERS);
    let topology = analyze_topology(&mut pipeline).unwrap();
    let metadata = propagate_metadata(&mut pipeline);

    let json = serde_json::to_value(&topology).unwrap();
    let graphs = json["graphs"].as_array().unwrap();
    assert_eq!(graphs.len(), 2);
    assert_eq!(graphs[0]["name"], "orders");
    assert_eq!(graphs[0]["edges"][4]["edge"], "e5");
    assert_eq!(graphs[0]["edges"][4]["mode"], "phase_boundary");

    let json = serde_json::to_value(&metadata).unwrap();
    assert_eq!(json["graphs"][0]["edges"][0]["metadata"]["schema"]["name"], "order");
    assert_eq!(json["graphs"][1]["name"], "enrich");
    assert_eq!(json["graphs"][1]["parent"]["component"], "host");
    assert!(json["graphs"][0].get("parent").is_none());
}
