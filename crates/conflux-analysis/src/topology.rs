//! Transport-mode classification
//!
//! Every edge of every graph gets one of three modes:
//!
//! | Mode | When |
//! |---|---|
//! | `PHASE_BOUNDARY` | writer and reader run in different phases |
//! | `BUFFERED` | writer and reader sit on a same-phase cycle |
//! | `DIRECT` | any other same-phase edge |
//!
//! Cycles are found on a flow graph where ordinary components are single
//! nodes and subgraph hosts are split into one node per port, with an arc
//! from input `p` to output `q` only when the nested graph actually connects
//! them. A host wrapping two independent paths therefore does not make a
//! feedback loop around it look cyclic.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use conflux_core::{
    Component, Direction, Edge, EdgeId, EdgeRef, Graph, GraphId, Phase, Pipeline, TransportMode,
};

use crate::error::{Error, Result};
use crate::subgraph::{PortReach, SubgraphResolver};

/// Transport mode of one edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeTransport {
    /// Edge id
    pub edge: EdgeId,
    /// Classified mode
    pub mode: TransportMode,
    /// Mode requested by the definition, when there was one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<TransportMode>,
}

/// Transport modes of one graph
#[derive(Debug, Clone, Serialize)]
pub struct GraphTopology {
    /// Graph id
    pub graph: GraphId,
    /// Graph name
    pub name: String,
    /// Edges in insertion order
    pub edges: Vec<EdgeTransport>,
    #[serde(skip)]
    index: HashMap<EdgeId, usize>,
}

impl GraphTopology {
    /// Mode of an edge of this graph
    pub fn mode(&self, edge: &str) -> Option<TransportMode> {
        self.index.get(edge).map(|&i| self.edges[i].mode)
    }
}

/// Transport modes of every edge in a pipeline's graph tree
#[derive(Debug, Clone, Serialize)]
pub struct TopologyReport {
    graphs: Vec<GraphTopology>,
    #[serde(skip)]
    slots: HashMap<GraphId, usize>,
}

impl TopologyReport {
    fn new(graphs: Vec<GraphTopology>) -> Self {
        let slots = graphs
            .iter()
            .enumerate()
            .map(|(slot, g)| (g.graph, slot))
            .collect();
        Self { graphs, slots }
    }

    /// Per-graph results in tree walk order, root first
    pub fn graphs(&self) -> &[GraphTopology] {
        &self.graphs
    }

    /// Mode of a root-graph edge
    pub fn mode(&self, edge: &str) -> Option<TransportMode> {
        self.mode_in(GraphId::ROOT, edge)
    }

    /// Mode of an edge in a given graph
    pub fn mode_in(&self, graph: GraphId, edge: &str) -> Option<TransportMode> {
        self.graph(graph)?.mode(edge)
    }

    /// Mode of an edge anywhere in the tree
    pub fn mode_at(&self, edge: &EdgeRef) -> Option<TransportMode> {
        self.mode_in(edge.graph, edge.edge.as_str())
    }

    /// Mode of the first edge named `edge` in tree walk order
    pub fn mode_recursive(&self, edge: &str) -> Option<TransportMode> {
        self.graphs.iter().find_map(|g| g.mode(edge))
    }

    /// Results for one graph
    pub fn graph(&self, graph: GraphId) -> Option<&GraphTopology> {
        self.slots.get(&graph).map(|&slot| &self.graphs[slot])
    }

    /// Every classified edge
    pub fn iter(&self) -> impl Iterator<Item = (EdgeRef, TransportMode)> + '_ {
        self.graphs.iter().flat_map(|g| {
            g.edges
                .iter()
                .map(move |e| (EdgeRef::new(g.graph, e.edge.clone()), e.mode))
        })
    }

    /// Number of edges classified as `mode`
    pub fn count(&self, mode: TransportMode) -> usize {
        self.graphs
            .iter()
            .flat_map(|g| &g.edges)
            .filter(|e| e.mode == mode)
            .count()
    }

    /// Number of classified edges
    pub fn len(&self) -> usize {
        self.graphs.iter().map(|g| g.edges.len()).sum()
    }

    /// Whether the tree has no edges
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_back(&self, pipeline: &mut Pipeline) {
        for topology in &self.graphs {
            let Some(graph) = pipeline.graph_mut(topology.graph) else {
                continue;
            };
            for edge in &topology.edges {
                if let Some(cache) = graph.edge_cache_mut(edge.edge.as_str()) {
                    cache.transport = Some(edge.mode);
                }
            }
        }
    }
}

/// Classify every edge and store the modes in the edge caches.
///
/// Nothing is written unless the whole tree classifies cleanly.
pub fn analyze_topology(pipeline: &mut Pipeline) -> Result<TopologyReport> {
    let report = TopologyAnalyzer::new(pipeline).analyze()?;
    report.write_back(pipeline);
    Ok(report)
}

/// Classifies transport modes without touching the pipeline
#[derive(Debug, Clone, Copy)]
pub struct TopologyAnalyzer<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> TopologyAnalyzer<'a> {
    /// Analyse `pipeline`
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    /// Classify every edge of the tree
    pub fn analyze(&self) -> Result<TopologyReport> {
        let subgraphs = SubgraphResolver::new(self.pipeline);
        let order = subgraphs.walk(GraphId::ROOT);

        let mut graphs = Vec::with_capacity(order.len());
        for &id in &order {
            let graph = self
                .pipeline
                .graph(id)
                .ok_or(conflux_core::Error::UnknownGraph(id.index()))?;
            check_endpoints(graph)?;
            graphs.push(graph);
        }

        let reach = subgraphs.host_reachability();
        let mut results = Vec::with_capacity(graphs.len());
        for graph in graphs {
            tracing::debug!(
                "Classifying {} edge(s) of graph '{}'",
                graph.edges().len(),
                graph.name()
            );
            results.push(classify(graph, &reach)?);
        }
        Ok(TopologyReport::new(results))
    }
}

/// Every edge must be fully connected to ports that know about it
fn check_endpoints(graph: &Graph) -> Result<()> {
    for edge in graph.edges() {
        let ends = [
            ("source", edge.source(), Direction::Output),
            ("sink", edge.sink(), Direction::Input),
        ];
        for (side, endpoint, direction) in ends {
            let Some(endpoint) = endpoint else {
                return Err(Error::MissingEndpoint {
                    graph: graph.name().to_string(),
                    edge: edge.id().to_string(),
                    side,
                });
            };
            let connected = graph
                .component(endpoint.component.as_str())
                .and_then(|c| c.edge_at(direction, endpoint.port));
            if connected != Some(edge.id()) {
                return Err(Error::DanglingPort {
                    graph: graph.name().to_string(),
                    edge: edge.id().to_string(),
                    component: endpoint.component.to_string(),
                    side,
                    port: endpoint.port,
                });
            }
        }
    }
    Ok(())
}

/// Flow-graph nodes of one graph. Ordinary components own one node; a
/// subgraph host owns one node per input port followed by one per output port.
struct FlowNodes<'g> {
    graph: &'g Graph,
    base: HashMap<&'g str, usize>,
    phases: Vec<Phase>,
}

impl<'g> FlowNodes<'g> {
    fn new(graph: &'g Graph) -> Self {
        let mut base = HashMap::new();
        let mut phases = Vec::new();
        for component in graph.components() {
            base.insert(component.id().as_str(), phases.len());
            let width = if component.subgraph_link().is_some() {
                component.input_count() + component.output_count()
            } else {
                1
            };
            phases.extend(std::iter::repeat_n(component.phase(), width));
        }
        Self {
            graph,
            base,
            phases,
        }
    }

    fn len(&self) -> usize {
        self.phases.len()
    }

    fn component(&self, id: &str) -> Option<(&'g Component, usize)> {
        Some((self.graph.component(id)?, *self.base.get(id)?))
    }

    /// Node data leaves through when written to output `port`
    fn writer(&self, component: &str, port: usize) -> Option<usize> {
        let (c, base) = self.component(component)?;
        Some(match c.subgraph_link() {
            Some(_) => base + c.input_count() + port,
            None => base,
        })
    }

    /// Node data enters when read from input `port`
    fn reader(&self, component: &str, port: usize) -> Option<usize> {
        let (c, base) = self.component(component)?;
        Some(match c.subgraph_link() {
            Some(_) => base + port,
            None => base,
        })
    }
}

/// An edge placed on the flow graph
struct FlowArc<'g> {
    edge: &'g Edge,
    writer: usize,
    reader: usize,
}

fn classify(graph: &Graph, reach: &HashMap<GraphId, PortReach>) -> Result<GraphTopology> {
    let nodes = FlowNodes::new(graph);

    let mut arcs = Vec::with_capacity(graph.edges().len());
    for edge in graph.edges() {
        // Endpoints were checked, so both lookups succeed.
        let writer = edge.source().and_then(|s| nodes.writer(s.component.as_str(), s.port));
        let reader = edge.sink().and_then(|s| nodes.reader(s.component.as_str(), s.port));
        if let (Some(writer), Some(reader)) = (writer, reader) {
            arcs.push(FlowArc {
                edge,
                writer,
                reader,
            });
        }
    }

    check_phase_order(graph, &nodes, &arcs)?;

    let mut flow: DiGraph<(), ()> = DiGraph::with_capacity(nodes.len(), arcs.len());
    for _ in 0..nodes.len() {
        flow.add_node(());
    }
    for arc in &arcs {
        if nodes.phases[arc.writer] == nodes.phases[arc.reader] {
            flow.add_edge(NodeIndex::new(arc.writer), NodeIndex::new(arc.reader), ());
        }
    }
    for component in graph.components() {
        let Some(link) = component.subgraph_link() else {
            continue;
        };
        let Some(&base) = nodes.base.get(component.id().as_str()) else {
            continue;
        };
        let ports = reach.get(&link.graph).map(Vec::as_slice).unwrap_or_default();
        for (input, outputs) in ports.iter().enumerate() {
            for &output in outputs {
                flow.add_edge(
                    NodeIndex::new(base + input),
                    NodeIndex::new(base + component.input_count() + output),
                    (),
                );
            }
        }
    }

    let scc = component_numbers(&flow);

    let mut edges = Vec::with_capacity(arcs.len());
    let mut index = HashMap::with_capacity(arcs.len());
    for arc in &arcs {
        let detected = if nodes.phases[arc.writer] != nodes.phases[arc.reader] {
            TransportMode::PhaseBoundary
        } else if arc.writer == arc.reader || scc[arc.writer] == scc[arc.reader] {
            TransportMode::Buffered
        } else {
            TransportMode::Direct
        };
        let pinned = arc.edge.pinned_transport();
        let mode = apply_pin(graph, arc.edge.id(), detected, pinned);

        index.insert(arc.edge.id().clone(), edges.len());
        edges.push(EdgeTransport {
            edge: arc.edge.id().clone(),
            mode,
            pinned,
        });
    }

    Ok(GraphTopology {
        graph: graph.id(),
        name: graph.name().to_string(),
        edges,
        index,
    })
}

/// Phases connected by cross-phase edges must not form a cycle
fn check_phase_order(graph: &Graph, nodes: &FlowNodes<'_>, arcs: &[FlowArc<'_>]) -> Result<()> {
    let phases: Vec<Phase> = nodes
        .phases
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let position: HashMap<Phase, usize> = phases.iter().enumerate().map(|(i, &p)| (p, i)).collect();

    let mut order: DiGraph<Phase, ()> = DiGraph::with_capacity(phases.len(), arcs.len());
    for &phase in &phases {
        order.add_node(phase);
    }
    let mut crossing = Vec::new();
    for arc in arcs {
        let (from, to) = (nodes.phases[arc.writer], nodes.phases[arc.reader]);
        if from != to {
            order.add_edge(
                NodeIndex::new(position[&from]),
                NodeIndex::new(position[&to]),
                (),
            );
            crossing.push((from, to, arc.edge));
        }
    }

    let Some(cycle) = kosaraju_scc(&order)
        .into_iter()
        .filter(|members| members.len() > 1)
        .min_by_key(|members| members.iter().map(|&node| order[node]).min())
    else {
        return Ok(());
    };
    let on_cycle: BTreeSet<Phase> = cycle.iter().map(|&node| order[node]).collect();

    let mut components = BTreeSet::new();
    for (from, to, edge) in crossing {
        if on_cycle.contains(&from) && on_cycle.contains(&to) {
            components.extend(edge.source().map(|s| s.component.to_string()));
            components.extend(edge.sink().map(|s| s.component.to_string()));
        }
    }

    Err(Error::CrossPhaseCycle {
        graph: graph.name().to_string(),
        phases: on_cycle.into_iter().collect(),
        components: components.into_iter().collect(),
    })
}

/// Strongly connected component number of every node, indexed like the nodes
fn component_numbers(flow: &DiGraph<(), ()>) -> Vec<usize> {
    let mut numbers = vec![0; flow.node_count()];
    for (number, members) in kosaraju_scc(flow).into_iter().enumerate() {
        for node in members {
            numbers[node.index()] = number;
        }
    }
    numbers
}

/// The detected mode is a floor: a pin may only add buffering to a DIRECT edge
fn apply_pin(
    graph: &Graph,
    edge: &EdgeId,
    detected: TransportMode,
    pinned: Option<TransportMode>,
) -> TransportMode {
    match (detected, pinned) {
        (_, None) => detected,
        (detected, Some(pin)) if detected == pin => detected,
        (TransportMode::Direct, Some(TransportMode::Buffered)) => TransportMode::Buffered,
        (detected, Some(pin)) => {
            tracing::warn!(
                "Ignoring {} pin on edge '{}' in '{}': the edge needs {}",
                pin,
                edge,
                graph.name(),
                detected
            );
            detected
        }
    }
}
