//! Error types for conflux-core

use thiserror::Error;

/// Result type alias for conflux-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in conflux-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse a YAML document (project config or pipeline definition)
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Pipeline definition is well-formed YAML but describes an impossible graph
    #[error("invalid pipeline '{pipeline}': {message}")]
    InvalidDefinition {
        /// Name of the pipeline (or nested graph) with the error
        pipeline: String,
        /// Description of the error
        message: String,
    },

    /// Two components or two edges of one graph share an id
    #[error("duplicate {kind} id '{id}' in graph '{graph}'")]
    DuplicateId {
        /// Graph name
        graph: String,
        /// "component" or "edge"
        kind: &'static str,
        /// The repeated id
        id: String,
    },

    /// An edge endpoint names a component the graph does not contain
    #[error("edge '{edge}' in graph '{graph}' references unknown component '{component}'")]
    UnknownComponent {
        /// Graph name
        graph: String,
        /// Edge id
        edge: String,
        /// Missing component id
        component: String,
    },

    /// An edge endpoint names a port the component does not have
    #[error(
        "edge '{edge}' in graph '{graph}' references {direction} port {port} of '{component}', which does not exist"
    )]
    DanglingPort {
        /// Graph name
        graph: String,
        /// Edge id
        edge: String,
        /// Component id
        component: String,
        /// "input" or "output"
        direction: &'static str,
        /// Port index
        port: usize,
    },

    /// A port already carries another edge
    #[error("{direction} port {port} of '{component}' in graph '{graph}' is already connected to edge '{existing}'")]
    PortInUse {
        /// Graph name
        graph: String,
        /// Component id
        component: String,
        /// "input" or "output"
        direction: &'static str,
        /// Port index
        port: usize,
        /// Edge that already occupies the port
        existing: String,
    },

    /// A subgraph host does not match its nested graph
    #[error("subgraph component '{component}' in graph '{graph}': {message}")]
    InvalidSubgraph {
        /// Graph containing the host
        graph: String,
        /// Host component id
        component: String,
        /// Description of the mismatch
        message: String,
    },

    /// A graph id that does not belong to the pipeline
    #[error("unknown graph #{0}")]
    UnknownGraph(usize),

    /// A definition refers to a schema that is not declared
    #[error("unknown metadata '{name}' referenced by '{referenced_by}'")]
    UnknownMetadata {
        /// Schema name
        name: String,
        /// Component or edge that referenced it
        referenced_by: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error reports a broken graph structure rather than an
    /// unreadable or missing file.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::InvalidDefinition { .. }
                | Self::DuplicateId { .. }
                | Self::UnknownComponent { .. }
                | Self::DanglingPort { .. }
                | Self::PortInUse { .. }
                | Self::InvalidSubgraph { .. }
                | Self::UnknownGraph(_)
        )
    }
}
