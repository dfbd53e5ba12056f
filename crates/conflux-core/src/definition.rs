//! Pipeline definitions
//!
//! A pipeline definition is the YAML document describing components, edges
//! and named record schemas. [`PipelineDefinition::build`] turns it into a
//! [`Pipeline`] ready for analysis.
//!
//! # Example
//!
//! ```yaml
//! name: orders
//! metadata:
//!   order:
//!     fields:
//!       - { name: id, type: integer }
//!       - { name: total, type: decimal }
//! components:
//!   - id: reader
//!     phase: 0
//!     outputs: 1
//!     defaults:
//!       outputs: { 0: order }
//!   - id: copy
//!     kind: pass_through
//!     inputs: 1
//!     outputs: 1
//!   - id: writer
//!     inputs: 1
//! edges:
//!   - { id: e1, from: "reader:0", to: "copy:0" }
//!   - { id: e2, from: "copy:0", to: "writer:0" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::component::{Component, ComponentKind, MetadataSource, StaticMetadata, SubgraphLink};
use crate::edge::{Edge, Endpoint, MetadataReference, TransportMode};
use crate::error::{Error, Result};
use crate::graph::Pipeline;
use crate::ids::GraphId;
use crate::metadata::{Field, Metadata, Priority, RecordSchema};
use crate::providers;

/// Root of a pipeline definition file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline name
    pub name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Named record schemas, visible to nested graphs as well
    #[serde(default)]
    pub metadata: BTreeMap<String, SchemaDefinition>,

    /// Components of the root graph
    #[serde(default)]
    pub components: Vec<ComponentDefinition>,

    /// Edges of the root graph
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

/// A named record schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Record name (defaults to the map key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Fields in record order
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// Reference to a named schema, optionally with a priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaUse {
    /// Just the schema name
    Named(String),
    /// Schema name with explicit priority
    Prioritized {
        /// Schema name
        schema: String,
        /// Priority of the suggestion
        priority: i32,
    },
}

impl SchemaUse {
    fn schema_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Prioritized { schema, .. } => schema,
        }
    }

    fn priority_or(&self, default: Priority) -> Priority {
        match self {
            Self::Named(_) => default,
            Self::Prioritized { priority, .. } => Priority(*priority),
        }
    }
}

/// Component capability as written in a definition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindDefinition {
    /// Ordinary component
    #[default]
    Standard,
    /// Forwards metadata across its sides
    PassThrough,
    /// Entry boundary of a subgraph
    SubgraphInput,
    /// Exit boundary of a subgraph
    SubgraphOutput,
}

/// Default metadata per port
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsDefinition {
    /// Input port defaults
    #[serde(default)]
    pub inputs: BTreeMap<usize, SchemaUse>,

    /// Output port defaults
    #[serde(default)]
    pub outputs: BTreeMap<usize, SchemaUse>,
}

/// A component entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDefinition {
    /// Component id (unique within its graph)
    pub id: String,

    /// Component type name, for diagnostics
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub component_type: Option<String>,

    /// Capability
    #[serde(default)]
    pub kind: KindDefinition,

    /// Execution phase
    #[serde(default)]
    pub phase: i32,

    /// Number of input ports
    #[serde(default)]
    pub inputs: usize,

    /// Number of output ports
    #[serde(default)]
    pub outputs: usize,

    /// Static default metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsDefinition>,

    /// Built-in dynamic metadata provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Nested graph, making this component a subgraph host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph: Option<Box<SubgraphDefinition>>,
}

/// Nested graph hosted by a component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphDefinition {
    /// Graph name (defaults to the host id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Id of the `subgraph_input` boundary component
    pub input: String,

    /// Id of the `subgraph_output` boundary component
    pub output: String,

    /// Components of the nested graph
    #[serde(default)]
    pub components: Vec<ComponentDefinition>,

    /// Edges of the nested graph
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

/// An edge entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    /// Edge id (unique within its graph)
    pub id: String,

    /// Writer port as `component:port` (port defaults to 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Reader port as `component:port` (port defaults to 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Directly assigned metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SchemaUse>,

    /// Inherit metadata from another edge of the same graph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_ref: Option<String>,

    /// Requested transport mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportMode>,
}

impl PipelineDefinition {
    /// Parse a definition from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a definition file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// SHA-256 over the canonical JSON form; stable across key order and
    /// formatting, so it can key a cache of built pipelines.
    pub fn content_hash(&self) -> Result<String> {
        use sha2::{Digest, Sha256};

        let canonical = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Build the in-memory graph model
    pub fn build(&self) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new(&self.name);
        let builder = Builder {
            schemas: &self.metadata,
        };
        builder.build_graph(
            &mut pipeline,
            GraphId::ROOT,
            &self.name,
            &self.components,
            &self.edges,
        )?;

        tracing::debug!(
            "Built pipeline '{}' with {} graph(s)",
            self.name,
            pipeline.graphs().len()
        );
        Ok(pipeline)
    }
}

struct Builder<'a> {
    schemas: &'a BTreeMap<String, SchemaDefinition>,
}

impl Builder<'_> {
    fn build_graph(
        &self,
        pipeline: &mut Pipeline,
        graph: GraphId,
        graph_name: &str,
        components: &[ComponentDefinition],
        edges: &[EdgeDefinition],
    ) -> Result<()> {
        for definition in components {
            let component = self.build_component(pipeline, graph_name, definition)?;
            pipeline.add_component(graph, component)?;
        }

        let edge_ids: HashSet<&str> = edges.iter().map(|e| e.id.as_str()).collect();
        for definition in edges {
            let edge = self.build_edge(graph_name, definition, &edge_ids)?;
            pipeline.add_edge(graph, edge)?;
        }
        Ok(())
    }

    fn build_component(
        &self,
        pipeline: &mut Pipeline,
        graph_name: &str,
        definition: &ComponentDefinition,
    ) -> Result<Component> {
        let invalid = |message: &str| Error::InvalidDefinition {
            pipeline: graph_name.to_string(),
            message: format!("component '{}': {}", definition.id, message),
        };

        let standard = definition.kind == KindDefinition::Standard;
        if !standard && (definition.defaults.is_some() || definition.provider.is_some()) {
            return Err(invalid("only standard components declare default metadata"));
        }
        if definition.defaults.is_some() && definition.provider.is_some() {
            return Err(invalid("use either 'defaults' or 'provider', not both"));
        }
        if definition.subgraph.is_some() && !standard {
            return Err(invalid("a subgraph host cannot also be a boundary or pass-through"));
        }
        if definition.subgraph.is_some()
            && (definition.defaults.is_some() || definition.provider.is_some())
        {
            return Err(invalid("a subgraph host takes its metadata from the nested graph"));
        }

        let kind = match (&definition.subgraph, definition.kind) {
            (Some(subgraph), _) => {
                let name = subgraph.name.as_deref().unwrap_or(&definition.id);
                let inner = pipeline.add_graph(name);
                self.build_graph(pipeline, inner, name, &subgraph.components, &subgraph.edges)?;
                ComponentKind::Subgraph(SubgraphLink {
                    graph: inner,
                    input: subgraph.input.as_str().into(),
                    output: subgraph.output.as_str().into(),
                })
            }
            (None, KindDefinition::Standard) => {
                ComponentKind::Standard(self.metadata_source(graph_name, definition)?)
            }
            (None, KindDefinition::PassThrough) => ComponentKind::PassThrough,
            (None, KindDefinition::SubgraphInput) => ComponentKind::SubgraphInput,
            (None, KindDefinition::SubgraphOutput) => ComponentKind::SubgraphOutput,
        };

        let mut component = Component::new(definition.id.as_str(), kind)
            .with_phase(definition.phase)
            .with_ports(definition.inputs, definition.outputs);
        if let Some(type_name) = &definition.component_type {
            component = component.with_type_name(type_name);
        }
        Ok(component)
    }

    fn metadata_source(
        &self,
        graph_name: &str,
        definition: &ComponentDefinition,
    ) -> Result<MetadataSource> {
        if let Some(name) = &definition.provider {
            let provider = providers::by_name(name, &definition.id).ok_or_else(|| {
                Error::InvalidDefinition {
                    pipeline: graph_name.to_string(),
                    message: format!(
                        "component '{}': unknown metadata provider '{name}'",
                        definition.id
                    ),
                }
            })?;
            return Ok(MetadataSource::Dynamic(provider));
        }

        let Some(defaults) = &definition.defaults else {
            return Ok(MetadataSource::None);
        };

        let mut table = StaticMetadata::default();
        for (&port, schema) in &defaults.inputs {
            let metadata = self.metadata(schema, Priority::DEFAULT, &definition.id)?;
            table = table.with_input(port, metadata);
        }
        for (&port, schema) in &defaults.outputs {
            let metadata = self.metadata(schema, Priority::DEFAULT, &definition.id)?;
            table = table.with_output(port, metadata);
        }
        Ok(MetadataSource::Static(table))
    }

    fn build_edge(
        &self,
        graph_name: &str,
        definition: &EdgeDefinition,
        edge_ids: &HashSet<&str>,
    ) -> Result<Edge> {
        let mut edge = Edge::unconnected(definition.id.as_str());

        if let Some(from) = &definition.from {
            edge = edge.with_source(parse_endpoint(graph_name, &definition.id, from)?);
        }
        if let Some(to) = &definition.to {
            edge = edge.with_sink(parse_endpoint(graph_name, &definition.id, to)?);
        }
        if let Some(schema) = &definition.metadata {
            edge = edge.with_metadata(self.metadata(schema, Priority::MAX, &definition.id)?);
        }
        if let Some(target) = &definition.metadata_ref {
            let reference = if edge_ids.contains(target.as_str()) {
                MetadataReference::Valid(target.as_str().into())
            } else {
                tracing::warn!(
                    "Edge '{}' in '{}' refers to unknown edge '{}'; its metadata will stay unresolved",
                    definition.id,
                    graph_name,
                    target
                );
                MetadataReference::Invalid(target.clone())
            };
            edge = edge.with_metadata_ref(reference);
        }
        if let Some(mode) = definition.transport {
            edge = edge.with_pinned_transport(mode);
        }
        Ok(edge)
    }

    fn metadata(&self, schema: &SchemaUse, default: Priority, referenced_by: &str) -> Result<Metadata> {
        let name = schema.schema_name();
        let definition = self
            .schemas
            .get(name)
            .ok_or_else(|| Error::UnknownMetadata {
                name: name.to_string(),
                referenced_by: referenced_by.to_string(),
            })?;

        let record = RecordSchema {
            name: definition.name.clone().unwrap_or_else(|| name.to_string()),
            fields: definition.fields.clone(),
        };
        Ok(Metadata::new(record).with_priority(schema.priority_or(default)))
    }
}

/// Parse `component:port`; a bare component name means port 0.
fn parse_endpoint(graph_name: &str, edge: &str, spec: &str) -> Result<Endpoint> {
    match spec.rsplit_once(':') {
        Some((component, port)) => {
            let port = port.trim().parse().map_err(|_| Error::InvalidDefinition {
                pipeline: graph_name.to_string(),
                message: format!("edge '{edge}': '{spec}' is not a valid 'component:port'"),
            })?;
            Ok(Endpoint::new(component.trim(), port))
        }
        None => Ok(Endpoint::new(spec.trim(), 0)),
    }
}
