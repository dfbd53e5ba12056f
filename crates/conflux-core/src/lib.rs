//! Conflux Core Library
//!
//! This crate provides the data side of Conflux:
//! - The pipeline graph model (components, ports, edges, metadata)
//! - Pipeline definitions and their YAML format
//! - Built-in metadata providers
//! - Project configuration
//!
//! The analyses that run over the model live in `conflux-analysis`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Definition  │────▶│  Pipeline   │────▶│  Analysis   │
//! │   (YAML)    │     │ (graph tree)│     │  (caches)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use conflux_core::{Config, PipelineDefinition};
//!
//! let config = Config::load("./conflux.yaml")?;
//! for (path, definition) in config.load_pipelines()? {
//!     let pipeline = definition.build()?;
//!     println!("{}: {} graph(s)", path.display(), pipeline.graphs().len());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod component;
pub mod config;
pub mod definition;
pub mod edge;
pub mod error;
pub mod graph;
pub mod ids;
pub mod metadata;
pub mod providers;

pub use component::{
    Component, ComponentKind, ConnectedMetadata, Direction, MetadataProvider, MetadataSource,
    Phase, StaticMetadata, SubgraphLink,
};
pub use config::{AnalysisConfig, Config, ProjectConfig};
pub use definition::PipelineDefinition;
pub use edge::{Edge, EdgeCache, Endpoint, MetadataReference, TransportMode};
pub use error::{Error, Result};
pub use graph::{Graph, Pipeline};
pub use ids::{ComponentId, ComponentRef, EdgeId, EdgeRef, GraphId};
pub use metadata::{Field, Metadata, OriginStep, Priority, RecordSchema};
