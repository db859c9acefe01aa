//! # weftgraph-core
//!
//! Core types, traits, and schema registry for the weftgraph knowledge graph
//! ingestion and query server. This crate provides the fundamental
//! abstractions that every adapter, extractor, and the dispatcher build on.

pub mod errors;
pub mod schema_registry;
pub mod traits;
pub mod types;

pub use errors::{CoreError, ExtractError, GraphError, ToolError};
pub use schema_registry::{SchemaRegistry, SchemaSource};
pub use traits::{
    Extractor, GraphStore, PipelinePlugin, PluginConfig, PluginOutcome, RequestContext,
};
pub use types::{EntityEdge, EntityNode, Episode, EpisodeFormat, EpisodicNode, Namespace};

/// Convenient imports for downstream crates.
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::schema_registry::*;
    pub use crate::traits::*;
    pub use crate::types::*;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;
}
