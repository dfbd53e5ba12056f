//! Stable identities for graphs, components and edges
//!
//! The graph model is an arena: components and edges refer to each other by
//! id, never by reference, so cyclic pipelines carry no ownership cycles.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Index of a graph inside a [`Pipeline`](crate::Pipeline) arena. The root graph is always `GraphId::ROOT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(pub usize);

impl GraphId {
    /// The top-level graph of every pipeline
    pub const ROOT: GraphId = GraphId(0);

    /// Arena index
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an id from any string
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The id as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Component identity, unique within one graph
    ComponentId
);

string_id!(
    /// Edge identity, unique within one graph
    EdgeId
);

/// An edge anywhere in the graph tree
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeRef {
    /// Graph owning the edge
    pub graph: GraphId,
    /// Edge id within that graph
    pub edge: EdgeId,
}

impl EdgeRef {
    /// Create a reference to `edge` in `graph`
    pub fn new(graph: GraphId, edge: impl Into<EdgeId>) -> Self {
        Self {
            graph,
            edge: edge.into(),
        }
    }
}

impl fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.graph, self.edge)
    }
}

/// A component anywhere in the graph tree
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    /// Graph owning the component
    pub graph: GraphId,
    /// Component id within that graph
    pub component: ComponentId,
}

impl ComponentRef {
    /// Create a reference to `component` in `graph`
    pub fn new(graph: GraphId, component: impl Into<ComponentId>) -> Self {
        Self {
            graph,
            component: component.into(),
        }
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.graph, self.component)
    }
}
