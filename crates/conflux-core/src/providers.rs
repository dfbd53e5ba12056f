//! Built-in dynamic metadata providers
//!
//! Pipeline definitions select these by name (`provider: concatenate`).

use std::sync::Arc;

use crate::component::{ConnectedMetadata, MetadataProvider};
use crate::metadata::{Metadata, RecordSchema};

/// Output port 0 carries every input record joined side by side, in input
/// port order. Nothing is suggested until all inputs have metadata.
#[derive(Debug, Clone)]
pub struct Concatenate {
    name: String,
}

impl Concatenate {
    /// Name the produced schema
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl MetadataProvider for Concatenate {
    fn output_metadata(&self, port: usize, edges: &mut dyn ConnectedMetadata) -> Option<Metadata> {
        if port != 0 || edges.input_count() == 0 {
            return None;
        }

        let mut parts = Vec::with_capacity(edges.input_count());
        for input in 0..edges.input_count() {
            parts.push(edges.input(input)?);
        }

        let schema = RecordSchema::concatenate(&self.name, parts.iter().map(Metadata::schema));
        Some(Metadata::new(schema))
    }
}

/// Every output port mirrors the metadata of input port 0, and input port 0
/// mirrors output port 0. Suits components that enrich records in place but
/// are not declared pass-through.
#[derive(Debug, Clone, Default)]
pub struct MirrorFirstInput;

impl MetadataProvider for MirrorFirstInput {
    fn input_metadata(&self, port: usize, edges: &mut dyn ConnectedMetadata) -> Option<Metadata> {
        if port == 0 && edges.output_count() > 0 {
            edges.output(0)
        } else {
            None
        }
    }

    fn output_metadata(&self, port: usize, edges: &mut dyn ConnectedMetadata) -> Option<Metadata> {
        if port < edges.output_count() && edges.input_count() > 0 {
            edges.input(0)
        } else {
            None
        }
    }
}

/// Look up a built-in provider by the name used in pipeline definitions.
/// `component` names the schemas the provider produces.
pub fn by_name(name: &str, component: &str) -> Option<Arc<dyn MetadataProvider>> {
    match name {
        "concatenate" => Some(Arc::new(Concatenate::new(format!("{component}_concatenated")))),
        "mirror_first_input" => Some(Arc::new(MirrorFirstInput)),
        _ => None,
    }
}
