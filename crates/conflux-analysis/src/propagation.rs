//! Metadata propagation
//!
//! Infers the record schema flowing over every edge of a pipeline. An edge
//! takes, in order of preference:
//!
//! 1. metadata assigned directly to it;
//! 2. the metadata of the edge it references (re-prioritised to `HIGH`);
//! 3. the better of what its writer and its reader suggest.
//!
//! Writers and readers answer according to their kind. Pass-through
//! components forward the edges on their other side, subgraph hosts and
//! boundaries hand the question across the nesting seam, and standard
//! components offer their declared defaults (possibly computed from their
//! other edges by a dynamic provider).
//!
//! Resolution is a worklist iteration. Every edge starts out unresolved and
//! is computed from the current values of the edges it reads; whenever an
//! edge's schema or priority changes, the edges that read it are queued
//! again. Cycles therefore settle on the values their members can actually
//! reach instead of recursing, and each edge is recomputed only when
//! something it depends on moved.
//!
//! # Example
//!
//! ```rust,ignore
//! use conflux_analysis::propagate_metadata;
//!
//! let result = propagate_metadata(&mut pipeline);
//! for edge in result.unresolved() {
//!     println!("no metadata for {edge}");
//! }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use conflux_core::{
    AnalysisConfig, Component, ComponentKind, ComponentRef, ConnectedMetadata, Direction, Edge,
    EdgeRef, Endpoint, GraphId, Metadata, MetadataReference, OriginStep, Pipeline, Priority,
};

use crate::result::PropagationResult;
use crate::subgraph::SubgraphResolver;

/// Knobs for a propagation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationOptions {
    /// Also compute, per edge, what it would carry without its direct metadata
    pub calculate_no_metadata: bool,
}

impl Default for PropagationOptions {
    fn default() -> Self {
        Self {
            calculate_no_metadata: true,
        }
    }
}

impl From<AnalysisConfig> for PropagationOptions {
    fn from(config: AnalysisConfig) -> Self {
        Self {
            calculate_no_metadata: config.calculate_no_metadata,
        }
    }
}

/// Resolve metadata for every edge with default options
pub fn propagate_metadata(pipeline: &mut Pipeline) -> PropagationResult {
    MetadataPropagationResolver::new().resolve(pipeline)
}

/// Runs metadata propagation over a pipeline's graph tree
#[derive(Debug, Clone, Default)]
pub struct MetadataPropagationResolver {
    options: PropagationOptions,
}

impl MetadataPropagationResolver {
    /// Resolver with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver with explicit options
    pub fn with_options(options: PropagationOptions) -> Self {
        Self { options }
    }

    /// Active options
    pub fn options(&self) -> PropagationOptions {
        self.options
    }

    /// Resolve every edge, write the results into the edge caches and return
    /// a snapshot of them
    pub fn resolve(&self, pipeline: &mut Pipeline) -> PropagationResult {
        let subgraphs = SubgraphResolver::new(pipeline);
        let order = subgraphs.walk(GraphId::ROOT);
        let edges = subgraphs.edges();

        let no_metadata = self.options.calculate_no_metadata.then(|| {
            edges
                .iter()
                .enumerate()
                .map(|(i, edge)| {
                    // Fresh state per edge: every hint is computed in isolation.
                    let values = Resolution::new(pipeline, &edges, Some(edge.clone())).run();
                    (edge.clone(), values.into_iter().nth(i).flatten())
                })
                .collect::<HashMap<_, _>>()
        });

        let values = Resolution::new(pipeline, &edges, None).run();
        let resolved: HashMap<EdgeRef, Option<Metadata>> =
            edges.iter().cloned().zip(values).collect();

        tracing::debug!(
            "Resolved metadata for {} of {} edge(s) in '{}'",
            resolved.values().filter(|m| m.is_some()).count(),
            edges.len(),
            pipeline.name()
        );

        for edge in &edges {
            let Some(cache) = pipeline
                .graph_mut(edge.graph)
                .and_then(|graph| graph.edge_cache_mut(edge.edge.as_str()))
            else {
                continue;
            };
            cache.metadata = Some(resolved.get(edge).cloned().flatten());
            if let Some(hints) = &no_metadata {
                cache.no_metadata = Some(hints.get(edge).cloned().flatten());
            }
        }

        PropagationResult::new(pipeline, &order, resolved, no_metadata)
    }
}

/// State of one propagation pass
struct Resolution<'a> {
    pipeline: &'a Pipeline,
    subgraphs: SubgraphResolver<'a>,
    /// Edge whose direct metadata is ignored (no-metadata discovery)
    suppressed: Option<EdgeRef>,
    edges: &'a [EdgeRef],
    slots: HashMap<&'a EdgeRef, usize>,
    values: Vec<Option<Metadata>>,
    /// `readers[i]` lists the edges whose computation read edge `i`
    readers: Vec<Vec<usize>>,
    /// Edge being computed
    current: usize,
}

impl<'a> Resolution<'a> {
    fn new(pipeline: &'a Pipeline, edges: &'a [EdgeRef], suppressed: Option<EdgeRef>) -> Self {
        Self {
            pipeline,
            subgraphs: SubgraphResolver::new(pipeline),
            suppressed,
            edges,
            slots: edges.iter().enumerate().map(|(i, edge)| (edge, i)).collect(),
            values: vec![None; edges.len()],
            readers: vec![Vec::new(); edges.len()],
            current: 0,
        }
    }

    /// Iterate until no edge changes, returning the values in edge order
    fn run(mut self) -> Vec<Option<Metadata>> {
        let edges = self.edges;
        // Bounds providers whose output feeds back into their own input and
        // grows on every round.
        let limit = edges.len() + 1;
        let mut changes = vec![0usize; edges.len()];
        let mut queue: VecDeque<usize> = (0..edges.len()).collect();
        let mut queued = vec![true; edges.len()];

        while let Some(i) = queue.pop_front() {
            queued[i] = false;
            self.current = i;
            let metadata = self.compute(&edges[i]);
            if settled(&self.values[i], &metadata) {
                continue;
            }
            self.values[i] = metadata;

            changes[i] += 1;
            if changes[i] > limit {
                if changes[i] == limit + 1 {
                    tracing::warn!(
                        "Metadata on edge {} keeps changing, keeping its latest value",
                        edges[i]
                    );
                }
                continue;
            }
            for &reader in &self.readers[i] {
                if !queued[reader] {
                    queued[reader] = true;
                    queue.push_back(reader);
                }
            }
        }
        self.values
    }

    /// Current value of `edge`, remembering that the edge being computed
    /// depends on it
    fn read(&mut self, edge: &EdgeRef) -> Option<Metadata> {
        let slot = *self.slots.get(edge)?;
        if !self.readers[slot].contains(&self.current) {
            self.readers[slot].push(self.current);
        }
        self.values[slot].clone()
    }

    fn compute(&mut self, at: &EdgeRef) -> Option<Metadata> {
        let pipeline = self.pipeline;
        let edge = pipeline.edge(at)?;

        if self.suppressed.as_ref() != Some(at)
            && let Some(direct) = edge.metadata()
        {
            let mut metadata = direct.clone();
            metadata.push_origin(OriginStep::Direct { edge: at.clone() });
            return Some(metadata);
        }

        match edge.metadata_ref() {
            Some(MetadataReference::Valid(target)) => {
                let target = EdgeRef::new(at.graph, target.clone());
                match self.read(&target) {
                    Some(mut metadata) => {
                        metadata.set_priority(Priority::HIGH);
                        metadata.push_origin(OriginStep::Reference { edge: target });
                        Some(metadata)
                    }
                    // A reference chain leading back here would otherwise
                    // never resolve; ask the neighbours instead.
                    None if self.is_self_referenced(at) => self.from_neighbours(at, edge),
                    None => None,
                }
            }
            Some(MetadataReference::Invalid(_)) => None,
            None => self.from_neighbours(at, edge),
        }
    }

    fn is_self_referenced(&self, at: &EdgeRef) -> bool {
        let Some(graph) = self.pipeline.graph(at.graph) else {
            return false;
        };
        let mut visited = HashSet::new();
        let mut current = at.edge.as_str();
        while visited.insert(current) {
            let Some(MetadataReference::Valid(next)) =
                graph.edge(current).and_then(Edge::metadata_ref)
            else {
                return false;
            };
            if next == &at.edge {
                return true;
            }
            current = next.as_str();
        }
        false
    }

    /// Writer candidate first, then the reader's if it ranks strictly higher
    fn from_neighbours(&mut self, at: &EdgeRef, edge: &'a Edge) -> Option<Metadata> {
        let mut result = None;
        let mut origin = None;

        if let Some(source) = edge.source() {
            result = self.writer_metadata(at.graph, source);
            if result.is_some() {
                origin = Some(&source.component);
            }
        }

        if !has_max_priority(&result)
            && let Some(sink) = edge.sink()
        {
            let candidate = self.reader_metadata(at.graph, sink);
            if outranks(&candidate, &result) {
                result = candidate;
                origin = Some(&sink.component);
            }
        }

        let mut metadata = result?;
        if let Some(component) = origin {
            metadata.push_origin(OriginStep::Component {
                component: ComponentRef::new(at.graph, component.clone()),
            });
        }
        Some(metadata)
    }

    /// What the component writing into output `source.port` suggests
    fn writer_metadata(&mut self, graph: GraphId, source: &Endpoint) -> Option<Metadata> {
        let pipeline = self.pipeline;
        let component = pipeline.graph(graph)?.component(source.component.as_str())?;
        let here = ComponentRef::new(graph, component.id().clone());

        match component.kind() {
            ComponentKind::PassThrough => self.combine_side(graph, component, Direction::Input),
            ComponentKind::Subgraph(_) => {
                let inner = self.subgraphs.inner_output_edge(&here, source.port)?;
                self.read(&inner)
            }
            ComponentKind::SubgraphInput => {
                let outer = self.subgraphs.outer_edge(&here, source.port)?;
                self.read(&outer)
            }
            ComponentKind::SubgraphOutput => None,
            ComponentKind::Standard(_) => {
                let mut edges = ComponentEdges {
                    run: self,
                    graph,
                    component,
                };
                component.default_output_metadata(source.port, &mut edges)
            }
        }
    }

    /// What the component reading from input `sink.port` suggests
    fn reader_metadata(&mut self, graph: GraphId, sink: &Endpoint) -> Option<Metadata> {
        let pipeline = self.pipeline;
        let component = pipeline.graph(graph)?.component(sink.component.as_str())?;
        let here = ComponentRef::new(graph, component.id().clone());

        match component.kind() {
            ComponentKind::PassThrough => self.combine_side(graph, component, Direction::Output),
            ComponentKind::Subgraph(_) => {
                let inner = self.subgraphs.inner_input_edge(&here, sink.port)?;
                self.read(&inner)
            }
            ComponentKind::SubgraphOutput => {
                let outer = self.subgraphs.outer_edge(&here, sink.port)?;
                self.read(&outer)
            }
            ComponentKind::SubgraphInput => None,
            ComponentKind::Standard(_) => {
                let mut edges = ComponentEdges {
                    run: self,
                    graph,
                    component,
                };
                component.default_input_metadata(sink.port, &mut edges)
            }
        }
    }

    /// Best metadata among one side's connected edges, in port order
    fn combine_side(
        &mut self,
        graph: GraphId,
        component: &'a Component,
        direction: Direction,
    ) -> Option<Metadata> {
        let mut result = None;
        for (_, edge) in component.connected_edges(direction) {
            let candidate = self.read(&EdgeRef::new(graph, edge.clone()));
            if outranks(&candidate, &result) {
                result = candidate;
            }
            if has_max_priority(&result) {
                break;
            }
        }
        result
    }
}

/// Same schema and priority; a longer origin trace alone is not a change
fn settled(current: &Option<Metadata>, next: &Option<Metadata>) -> bool {
    match (current, next) {
        (None, None) => true,
        (Some(current), Some(next)) => {
            current.priority() == next.priority() && current.same_structure(next)
        }
        _ => false,
    }
}

/// Strictly higher priority wins; ties keep what was found first
fn outranks(candidate: &Option<Metadata>, current: &Option<Metadata>) -> bool {
    match (candidate, current) {
        (Some(_), None) => true,
        (Some(candidate), Some(current)) => candidate.priority() > current.priority(),
        (None, _) => false,
    }
}

fn has_max_priority(metadata: &Option<Metadata>) -> bool {
    metadata.as_ref().is_some_and(Metadata::has_max_priority)
}

/// A component's edges as seen by its dynamic metadata provider
struct ComponentEdges<'r, 'a> {
    run: &'r mut Resolution<'a>,
    graph: GraphId,
    component: &'a Component,
}

impl ConnectedMetadata for ComponentEdges<'_, '_> {
    fn input_count(&self) -> usize {
        self.component.input_count()
    }

    fn output_count(&self) -> usize {
        self.component.output_count()
    }

    fn input(&mut self, port: usize) -> Option<Metadata> {
        let edge = self.component.input_edge(port)?;
        self.run.read(&EdgeRef::new(self.graph, edge.clone()))
    }

    fn output(&mut self, port: usize) -> Option<Metadata> {
        let edge = self.component.output_edge(port)?;
        self.run.read(&EdgeRef::new(self.graph, edge.clone()))
    }
}
