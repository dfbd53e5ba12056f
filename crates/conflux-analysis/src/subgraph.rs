//! Crossing nested-graph boundaries
//!
//! A subgraph host and its nested graph meet at two boundary components:
//!
//! ```text
//!          outer graph                       nested graph
//!  ──e──▶ host input p     ≙    boundary-input output p ──inner──▶
//!  ◀──e── host output q    ≙    boundary-output input q ◀──inner──
//! ```
//!
//! [`SubgraphResolver`] maps edges across that seam in both directions and
//! walks the graph tree with an explicit stack, so nesting depth is bounded
//! only by memory.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use conflux_core::{
    ComponentKind, ComponentRef, Edge, EdgeId, EdgeRef, Graph, GraphId, Pipeline, SubgraphLink,
};

/// For each host input port, the host output ports it reaches through the
/// nested graph
pub type PortReach = Vec<BTreeSet<usize>>;

/// Read-only navigation of a pipeline's graph tree
#[derive(Debug, Clone, Copy)]
pub struct SubgraphResolver<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> SubgraphResolver<'a> {
    /// Navigate `pipeline`
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    /// Graphs below (and including) `start` in depth-first pre-order,
    /// children in host order
    pub fn walk(&self, start: GraphId) -> Vec<GraphId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if self.pipeline.graph(id).is_none() {
                continue;
            }
            order.push(id);
            let mut children = self.pipeline.children(id);
            children.reverse();
            stack.extend(children);
        }
        order
    }

    /// Find an edge by id anywhere in the tree, searching in [`walk`](Self::walk) order
    pub fn find_edge(&self, edge: &str) -> Option<EdgeRef> {
        self.walk(GraphId::ROOT)
            .into_iter()
            .find(|&id| {
                self.pipeline
                    .graph(id)
                    .is_some_and(|graph| graph.contains_edge(edge))
            })
            .map(|id| EdgeRef::new(id, edge))
    }

    /// Every edge of the tree, graphs in walk order, edges in insertion order
    pub fn edges(&self) -> Vec<EdgeRef> {
        self.walk(GraphId::ROOT)
            .into_iter()
            .filter_map(|id| self.pipeline.graph(id))
            .flat_map(|graph| {
                graph
                    .edges()
                    .iter()
                    .map(move |edge| EdgeRef::new(graph.id(), edge.id().clone()))
            })
            .collect()
    }

    /// Inner edge continuing host input port `port`
    pub fn inner_input_edge(&self, host: &ComponentRef, port: usize) -> Option<EdgeRef> {
        let link = self.pipeline.component(host)?.subgraph_link()?;
        let edge = self
            .pipeline
            .graph(link.graph)?
            .component(link.input.as_str())?
            .output_edge(port)?;
        Some(EdgeRef::new(link.graph, edge.clone()))
    }

    /// Inner edge feeding host output port `port`
    pub fn inner_output_edge(&self, host: &ComponentRef, port: usize) -> Option<EdgeRef> {
        let link = self.pipeline.component(host)?.subgraph_link()?;
        let edge = self
            .pipeline
            .graph(link.graph)?
            .component(link.output.as_str())?
            .input_edge(port)?;
        Some(EdgeRef::new(link.graph, edge.clone()))
    }

    /// Outer edge mirrored by port `port` of a boundary component: the host's
    /// input edge for a subgraph input, its output edge for a subgraph output
    pub fn outer_edge(&self, boundary: &ComponentRef, port: usize) -> Option<EdgeRef> {
        let component = self.pipeline.component(boundary)?;
        let host_ref = self.pipeline.graph(boundary.graph)?.parent()?;
        let host = self.pipeline.component(host_ref)?;
        let link = host.subgraph_link()?;

        let edge = match component.kind() {
            ComponentKind::SubgraphInput if link.input == boundary.component => {
                host.input_edge(port)?
            }
            ComponentKind::SubgraphOutput if link.output == boundary.component => {
                host.output_edge(port)?
            }
            _ => return None,
        };
        Some(EdgeRef::new(host_ref.graph, edge.clone()))
    }

    /// Which host output ports each host input port reaches, for every hosted
    /// graph. Computed bottom-up, so a nested host's own reach is known
    /// before the graph containing it is walked.
    ///
    /// Phases are ignored: data entering port `p` reaches port `q` if any
    /// chain of edges connects them.
    pub fn host_reachability(&self) -> HashMap<GraphId, PortReach> {
        let mut reach = HashMap::new();
        for id in self.walk(GraphId::ROOT).into_iter().rev() {
            let Some(graph) = self.pipeline.graph(id) else {
                continue;
            };
            let Some(link) = self.link_of(graph) else {
                continue;
            };
            let ports = boundary_reach(graph, link, &reach);
            reach.insert(id, ports);
        }
        reach
    }

    fn link_of(&self, graph: &Graph) -> Option<&'a SubgraphLink> {
        self.pipeline.component(graph.parent()?)?.subgraph_link()
    }
}

fn boundary_reach(graph: &Graph, link: &SubgraphLink, known: &HashMap<GraphId, PortReach>) -> PortReach {
    let Some(input) = graph.component(link.input.as_str()) else {
        return vec![];
    };

    (0..input.output_count())
        .map(|port| {
            let mut reached = BTreeSet::new();
            let mut visited: HashSet<&EdgeId> = HashSet::new();
            let mut queue: VecDeque<&EdgeId> = input.output_edge(port).into_iter().collect();

            while let Some(edge) = queue.pop_front() {
                if !visited.insert(edge) {
                    continue;
                }
                let Some(sink) = graph.edge(edge.as_str()).and_then(Edge::sink) else {
                    continue;
                };
                let Some(component) = graph.component(sink.component.as_str()) else {
                    continue;
                };
                if component.id() == &link.output {
                    reached.insert(sink.port);
                    continue;
                }

                let outputs: Vec<usize> = match component.subgraph_link() {
                    Some(nested) => known
                        .get(&nested.graph)
                        .and_then(|ports| ports.get(sink.port))
                        .map(|ports| ports.iter().copied().collect())
                        .unwrap_or_default(),
                    None => (0..component.output_count()).collect(),
                };
                queue.extend(outputs.into_iter().filter_map(|q| component.output_edge(q)));
            }
            reached
        })
        .collect()
}
