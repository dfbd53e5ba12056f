//! Pipeline components and their capabilities
//!
//! Each component has ordered input and output ports. A port is a slot that
//! holds the id of the single edge connected to it, if any.
//!
//! What a component contributes to analysis is decided by its
//! [`ComponentKind`]: standard components may declare default metadata per
//! port, pass-through components forward whatever arrives on their other
//! side, and subgraph hosts delegate to a nested graph.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::ids::{ComponentId, EdgeId, GraphId};
use crate::metadata::Metadata;

/// Execution phase number. Phases run in ascending order.
pub type Phase = i32;

/// Access to the metadata of a component's connected edges, handed to
/// dynamic providers so they can derive one port's schema from the others.
pub trait ConnectedMetadata {
    /// Number of input ports on the component
    fn input_count(&self) -> usize;

    /// Number of output ports on the component
    fn output_count(&self) -> usize;

    /// Metadata arriving on input port `port`
    fn input(&mut self, port: usize) -> Option<Metadata>;

    /// Metadata leaving through output port `port`
    fn output(&mut self, port: usize) -> Option<Metadata>;
}

/// Dynamically computed default metadata
pub trait MetadataProvider: fmt::Debug + Send + Sync {
    /// Default metadata for input port `port`
    fn input_metadata(&self, _port: usize, _edges: &mut dyn ConnectedMetadata) -> Option<Metadata> {
        None
    }

    /// Default metadata for output port `port`
    fn output_metadata(
        &self,
        _port: usize,
        _edges: &mut dyn ConnectedMetadata,
    ) -> Option<Metadata> {
        None
    }
}

/// Per-port default metadata declared up front
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticMetadata {
    /// Defaults by input port index
    pub inputs: BTreeMap<usize, Metadata>,
    /// Defaults by output port index
    pub outputs: BTreeMap<usize, Metadata>,
}

impl StaticMetadata {
    /// Declare the default for an input port
    pub fn with_input(mut self, port: usize, metadata: Metadata) -> Self {
        self.inputs.insert(port, metadata);
        self
    }

    /// Declare the default for an output port
    pub fn with_output(mut self, port: usize, metadata: Metadata) -> Self {
        self.outputs.insert(port, metadata);
        self
    }
}

/// Where a standard component's default metadata comes from
#[derive(Debug, Clone, Default)]
pub enum MetadataSource {
    /// The component suggests nothing
    #[default]
    None,
    /// Fixed table
    Static(StaticMetadata),
    /// Computed on demand
    Dynamic(Arc<dyn MetadataProvider>),
}

impl MetadataSource {
    /// Default metadata for an input port
    pub fn input_metadata(
        &self,
        port: usize,
        edges: &mut dyn ConnectedMetadata,
    ) -> Option<Metadata> {
        match self {
            Self::None => None,
            Self::Static(table) => table.inputs.get(&port).cloned(),
            Self::Dynamic(provider) => provider.input_metadata(port, edges),
        }
    }

    /// Default metadata for an output port
    pub fn output_metadata(
        &self,
        port: usize,
        edges: &mut dyn ConnectedMetadata,
    ) -> Option<Metadata> {
        match self {
            Self::None => None,
            Self::Static(table) => table.outputs.get(&port).cloned(),
            Self::Dynamic(provider) => provider.output_metadata(port, edges),
        }
    }
}

/// Link from a subgraph host to its nested graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgraphLink {
    /// The nested graph
    pub graph: GraphId,
    /// Boundary component whose output ports mirror the host's input ports
    pub input: ComponentId,
    /// Boundary component whose input ports mirror the host's output ports
    pub output: ComponentId,
}

/// Capability of a component
#[derive(Debug, Clone)]
pub enum ComponentKind {
    /// Ordinary component with optional default metadata
    Standard(MetadataSource),
    /// Forwards metadata between its input and output sides
    PassThrough,
    /// Hosts a nested graph
    Subgraph(SubgraphLink),
    /// Entry boundary inside a nested graph
    SubgraphInput,
    /// Exit boundary inside a nested graph
    SubgraphOutput,
}

impl ComponentKind {
    /// Short name used in definitions and reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::Standard(_) => "standard",
            Self::PassThrough => "pass_through",
            Self::Subgraph(_) => "subgraph",
            Self::SubgraphInput => "subgraph_input",
            Self::SubgraphOutput => "subgraph_output",
        }
    }
}

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Input side
    Input,
    /// Output side
    Output,
}

impl Direction {
    /// "input" or "output"
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// A node of the pipeline graph
#[derive(Debug, Clone)]
pub struct Component {
    id: ComponentId,
    type_name: Option<String>,
    kind: ComponentKind,
    phase: Phase,
    inputs: Vec<Option<EdgeId>>,
    outputs: Vec<Option<EdgeId>>,
}

impl Component {
    /// Create a component of the given kind with no ports, in phase 0
    pub fn new(id: impl Into<ComponentId>, kind: ComponentKind) -> Self {
        Self {
            id: id.into(),
            type_name: None,
            kind,
            phase: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Standard component without default metadata
    pub fn standard(id: impl Into<ComponentId>) -> Self {
        Self::new(id, ComponentKind::Standard(MetadataSource::None))
    }

    /// Pass-through component
    pub fn pass_through(id: impl Into<ComponentId>) -> Self {
        Self::new(id, ComponentKind::PassThrough)
    }

    /// Subgraph host
    pub fn subgraph(id: impl Into<ComponentId>, link: SubgraphLink) -> Self {
        Self::new(id, ComponentKind::Subgraph(link))
    }

    /// Entry boundary of a nested graph
    pub fn subgraph_input(id: impl Into<ComponentId>) -> Self {
        Self::new(id, ComponentKind::SubgraphInput)
    }

    /// Exit boundary of a nested graph
    pub fn subgraph_output(id: impl Into<ComponentId>) -> Self {
        Self::new(id, ComponentKind::SubgraphOutput)
    }

    /// Set the execution phase
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Set the number of input and output ports
    pub fn with_ports(mut self, inputs: usize, outputs: usize) -> Self {
        self.inputs = vec![None; inputs];
        self.outputs = vec![None; outputs];
        self
    }

    /// Set the component type name (diagnostics only)
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Attach a default metadata source. Only meaningful for standard components.
    pub fn with_metadata(mut self, source: MetadataSource) -> Self {
        if let ComponentKind::Standard(current) = &mut self.kind {
            *current = source;
        }
        self
    }

    /// Component id
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// Component type name, if declared
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Capability kind
    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    /// Execution phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the component forwards metadata between its sides
    pub fn is_pass_through(&self) -> bool {
        matches!(self.kind, ComponentKind::PassThrough)
    }

    /// Nested graph link for subgraph hosts
    pub fn subgraph_link(&self) -> Option<&SubgraphLink> {
        match &self.kind {
            ComponentKind::Subgraph(link) => Some(link),
            _ => None,
        }
    }

    /// Number of ports on one side
    pub fn port_count(&self, direction: Direction) -> usize {
        self.ports(direction).len()
    }

    /// Number of input ports
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output ports
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Edge connected to a port, if any
    pub fn edge_at(&self, direction: Direction, port: usize) -> Option<&EdgeId> {
        self.ports(direction).get(port).and_then(Option::as_ref)
    }

    /// Edge connected to an input port
    pub fn input_edge(&self, port: usize) -> Option<&EdgeId> {
        self.edge_at(Direction::Input, port)
    }

    /// Edge connected to an output port
    pub fn output_edge(&self, port: usize) -> Option<&EdgeId> {
        self.edge_at(Direction::Output, port)
    }

    /// Connected edges on one side, in port order
    pub fn connected_edges(&self, direction: Direction) -> impl Iterator<Item = (usize, &EdgeId)> {
        self.ports(direction)
            .iter()
            .enumerate()
            .filter_map(|(port, edge)| edge.as_ref().map(|edge| (port, edge)))
    }

    /// Default metadata for an input port (standard components only)
    pub fn default_input_metadata(
        &self,
        port: usize,
        edges: &mut dyn ConnectedMetadata,
    ) -> Option<Metadata> {
        match &self.kind {
            ComponentKind::Standard(source) => source.input_metadata(port, edges),
            _ => None,
        }
    }

    /// Default metadata for an output port (standard components only)
    pub fn default_output_metadata(
        &self,
        port: usize,
        edges: &mut dyn ConnectedMetadata,
    ) -> Option<Metadata> {
        match &self.kind {
            ComponentKind::Standard(source) => source.output_metadata(port, edges),
            _ => None,
        }
    }

    fn ports(&self, direction: Direction) -> &[Option<EdgeId>] {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    pub(crate) fn port_slot_mut(
        &mut self,
        direction: Direction,
        port: usize,
    ) -> Option<&mut Option<EdgeId>> {
        match direction {
            Direction::Input => self.inputs.get_mut(port),
            Direction::Output => self.outputs.get_mut(port),
        }
    }
}
