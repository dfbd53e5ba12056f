//! Edges between component ports

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ComponentId, EdgeId};
use crate::metadata::Metadata;

/// How records move across an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Bounded hand-off between concurrently running components
    Direct,
    /// Unbounded buffer; required around same-phase cycles
    Buffered,
    /// Writer's phase completes before the reader's phase starts
    PhaseBoundary,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Direct => "DIRECT",
            Self::Buffered => "BUFFERED",
            Self::PhaseBoundary => "PHASE_BOUNDARY",
        })
    }
}

/// One end of an edge: a component port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Component owning the port
    pub component: ComponentId,
    /// Port index
    pub port: usize,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(component: impl Into<ComponentId>, port: usize) -> Self {
        Self {
            component: component.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.component, self.port)
    }
}

/// "Inherit metadata from edge X"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataReference {
    /// Points at an edge of the same graph
    Valid(EdgeId),
    /// Points at something that could not be found; resolves to nothing
    Invalid(String),
}

/// Per-edge analysis caches. Cleared by a graph reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeCache {
    /// Classified transport mode
    pub transport: Option<TransportMode>,
    /// Resolved metadata; `Some(None)` means resolution ran and found nothing
    pub metadata: Option<Option<Metadata>>,
    /// What would be resolved without the edge's direct metadata
    pub no_metadata: Option<Option<Metadata>>,
}

/// A directed connection from an output port to an input port
#[derive(Debug, Clone)]
pub struct Edge {
    id: EdgeId,
    source: Option<Endpoint>,
    sink: Option<Endpoint>,
    metadata: Option<Metadata>,
    metadata_ref: Option<MetadataReference>,
    pinned_transport: Option<TransportMode>,
    cache: EdgeCache,
}

impl Edge {
    /// Create an edge between two ports
    pub fn new(id: impl Into<EdgeId>, source: Endpoint, sink: Endpoint) -> Self {
        Self::unconnected(id).with_source(source).with_sink(sink)
    }

    /// Create an edge with no endpoints
    pub fn unconnected(id: impl Into<EdgeId>) -> Self {
        Self {
            id: id.into(),
            source: None,
            sink: None,
            metadata: None,
            metadata_ref: None,
            pinned_transport: None,
            cache: EdgeCache::default(),
        }
    }

    /// Set the writer end
    pub fn with_source(mut self, source: Endpoint) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the reader end
    pub fn with_sink(mut self, sink: Endpoint) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Assign metadata directly
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Inherit metadata from another edge of the same graph
    pub fn with_metadata_ref(mut self, reference: MetadataReference) -> Self {
        self.metadata_ref = Some(reference);
        self
    }

    /// Request a transport mode
    pub fn with_pinned_transport(mut self, mode: TransportMode) -> Self {
        self.pinned_transport = Some(mode);
        self
    }

    /// Edge id
    pub fn id(&self) -> &EdgeId {
        &self.id
    }

    /// Writer end
    pub fn source(&self) -> Option<&Endpoint> {
        self.source.as_ref()
    }

    /// Reader end
    pub fn sink(&self) -> Option<&Endpoint> {
        self.sink.as_ref()
    }

    /// Directly assigned metadata
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Metadata reference
    pub fn metadata_ref(&self) -> Option<&MetadataReference> {
        self.metadata_ref.as_ref()
    }

    /// Requested transport mode
    pub fn pinned_transport(&self) -> Option<TransportMode> {
        self.pinned_transport
    }

    /// Analysis caches
    pub fn cache(&self) -> &EdgeCache {
        &self.cache
    }

    /// Cached transport mode
    pub fn transport(&self) -> Option<TransportMode> {
        self.cache.transport
    }

    /// Cached resolved metadata (outer `None` when resolution has not run)
    pub fn resolved_metadata(&self) -> Option<Option<&Metadata>> {
        self.cache.metadata.as_ref().map(Option::as_ref)
    }

    /// Cached no-metadata hint (outer `None` when it was not calculated)
    pub fn no_metadata(&self) -> Option<Option<&Metadata>> {
        self.cache.no_metadata.as_ref().map(Option::as_ref)
    }

    pub(crate) fn set_metadata(&mut self, metadata: Option<Metadata>) {
        self.metadata = metadata;
    }

    pub(crate) fn clear_source(&mut self) {
        self.source = None;
    }

    pub(crate) fn clear_sink(&mut self) {
        self.sink = None;
    }

    pub(crate) fn cache_mut(&mut self) -> &mut EdgeCache {
        &mut self.cache
    }

    pub(crate) fn reset(&mut self) {
        self.cache = EdgeCache::default();
    }
}
