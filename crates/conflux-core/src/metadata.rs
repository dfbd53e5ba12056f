//! Record schemas ("metadata") carried by edges
//!
//! A [`Metadata`] value is a record schema plus the bookkeeping the
//! propagation resolver needs: a priority used to pick between competing
//! candidates, and an origin path tracing how the value reached an edge.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ComponentRef, EdgeRef};

/// A single field of a record schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name
    pub name: String,

    /// Field type name (`string`, `integer`, `decimal`, ...)
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
}

fn default_field_type() -> String {
    "string".to_string()
}

impl Field {
    /// Create a field
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
        }
    }
}

/// Ordered record schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    /// Schema name
    pub name: String,

    /// Fields in record order
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl RecordSchema {
    /// Create an empty schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field
    pub fn with_field(mut self, name: impl Into<String>, field_type: impl Into<String>) -> Self {
        self.fields.push(Field::new(name, field_type));
        self
    }

    /// Join several schemas into one record, fields in argument order.
    pub fn concatenate<'a>(
        name: impl Into<String>,
        parts: impl IntoIterator<Item = &'a RecordSchema>,
    ) -> Self {
        Self {
            name: name.into(),
            fields: parts
                .into_iter()
                .flat_map(|schema| schema.fields.iter().cloned())
                .collect(),
        }
    }
}

/// Priority of a metadata candidate. Higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    /// Weakest possible suggestion
    pub const ZERO: Priority = Priority(0);
    /// Fallback suggestion
    pub const LOW: Priority = Priority(1);
    /// Component defaults
    pub const DEFAULT: Priority = Priority(2);
    /// Metadata inherited through an edge reference
    pub const HIGH: Priority = Priority(3);
    /// Metadata assigned directly to an edge; never beaten
    pub const MAX: Priority = Priority(i32::MAX);
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One step of a metadata origin trace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OriginStep {
    /// Assigned directly on this edge
    Direct {
        /// The edge carrying the assignment
        edge: EdgeRef,
    },
    /// Inherited from another edge
    Reference {
        /// The referenced edge
        edge: EdgeRef,
    },
    /// Supplied or forwarded by a component
    Component {
        /// The contributing component
        component: ComponentRef,
    },
}

impl fmt::Display for OriginStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { edge } => write!(f, "direct({edge})"),
            Self::Reference { edge } => write!(f, "ref({edge})"),
            Self::Component { component } => write!(f, "{component}"),
        }
    }
}

/// Record schema flowing over an edge, with priority and origin trace.
///
/// `PartialEq` compares everything including the origin path; use
/// [`Metadata::same_structure`] to compare only the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    schema: RecordSchema,
    priority: Priority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    origin: Vec<OriginStep>,
}

impl Metadata {
    /// Wrap a schema at [`Priority::DEFAULT`]
    pub fn new(schema: RecordSchema) -> Self {
        Self {
            schema,
            priority: Priority::DEFAULT,
            origin: Vec::new(),
        }
    }

    /// Builder-style priority override
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// The record schema
    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Current priority
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Replace the priority
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Whether no other candidate can beat this one
    pub fn has_max_priority(&self) -> bool {
        self.priority == Priority::MAX
    }

    /// Origin trace, oldest contribution first
    pub fn origin(&self) -> &[OriginStep] {
        &self.origin
    }

    /// Append a contribution to the origin trace
    pub fn push_origin(&mut self, step: OriginStep) {
        self.origin.push(step);
    }

    /// Schema-only equality
    pub fn same_structure(&self, other: &Metadata) -> bool {
        self.schema == other.schema
    }
}
