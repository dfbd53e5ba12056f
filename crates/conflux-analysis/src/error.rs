//! Error types for conflux-analysis

use conflux_core::Phase;
use thiserror::Error;

/// Result type alias for conflux-analysis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal structural problems found while analysing a pipeline.
///
/// Unresolvable metadata is never an error; only a graph that cannot be
/// scheduled at all ends up here.
#[derive(Error, Debug)]
pub enum Error {
    /// An edge lacks a writer or a reader
    #[error("edge '{edge}' in graph '{graph}' has no {side}")]
    MissingEndpoint {
        /// Graph name
        graph: String,
        /// Edge id
        edge: String,
        /// "source" or "sink"
        side: &'static str,
    },

    /// An edge endpoint does not match a connected port
    #[error("edge '{edge}' in graph '{graph}' points at {side} port {port} of '{component}', which it is not connected to")]
    DanglingPort {
        /// Graph name
        graph: String,
        /// Edge id
        edge: String,
        /// Component named by the endpoint
        component: String,
        /// "source" or "sink"
        side: &'static str,
        /// Port index named by the endpoint
        port: usize,
    },

    /// Phases form a cycle through cross-phase edges
    #[error("phases {phases:?} of graph '{graph}' form a cycle through components {components:?}")]
    CrossPhaseCycle {
        /// Graph name
        graph: String,
        /// Phases on the cycle, ascending
        phases: Vec<Phase>,
        /// Components at either end of the offending edges, sorted
        components: Vec<String>,
    },

    /// The graph model itself is inconsistent
    #[error(transparent)]
    Model(#[from] conflux_core::Error),
}

impl Error {
    /// Components a user has to look at to fix the configuration
    pub fn offending_components(&self) -> Vec<String> {
        match self {
            Self::MissingEndpoint { .. } => vec![],
            Self::DanglingPort { component, .. } => vec![component.clone()],
            Self::CrossPhaseCycle { components, .. } => components.clone(),
            Self::Model(conflux_core::Error::UnknownComponent { component, .. })
            | Self::Model(conflux_core::Error::DanglingPort { component, .. })
            | Self::Model(conflux_core::Error::PortInUse { component, .. })
            | Self::Model(conflux_core::Error::InvalidSubgraph { component, .. }) => {
                vec![component.clone()]
            }
            Self::Model(_) => vec![],
        }
    }
}
