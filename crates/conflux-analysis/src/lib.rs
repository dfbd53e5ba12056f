//! Conflux Analysis Library
//!
//! This crate runs the pre-execution analyses over a [`Pipeline`]:
//! - Transport-mode classification (DIRECT / BUFFERED / PHASE_BOUNDARY)
//! - Metadata propagation through pass-throughs and nested graphs
//!
//! Both analyses are synchronous and perform no I/O. They borrow the
//! pipeline mutably only to write their results into the edge caches.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────┐
//!             ┌───▶│ TopologyAnalyzer │───▶ TopologyReport
//! ┌──────────┐│    └──────────────────┘
//! │ Pipeline │┤            │
//! └──────────┘│    ┌──────────────────┐
//!             └───▶│ MetadataPropag.. │───▶ PropagationResult
//!                  └──────────────────┘
//!                          │
//!                  ┌──────────────────┐
//!                  │ SubgraphResolver │  (tree walks, boundary mapping)
//!                  └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use conflux_analysis::{analyze_topology, propagate_metadata};
//!
//! let mut pipeline = definition.build()?;
//! let topology = analyze_topology(&mut pipeline)?;
//! let metadata = propagate_metadata(&mut pipeline);
//! ```
//!
//! [`Pipeline`]: conflux_core::Pipeline

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod propagation;
pub mod result;
pub mod subgraph;
pub mod topology;

pub use error::{Error, Result};
pub use propagation::{MetadataPropagationResolver, PropagationOptions, propagate_metadata};
pub use result::{EdgeResolution, GraphResolution, PropagationResult};
pub use subgraph::{PortReach, SubgraphResolver};
pub use topology::{EdgeTransport, GraphTopology, TopologyAnalyzer, TopologyReport, analyze_topology};
