//! Trait contracts shared between the ingestion engine, the graph/extractor
//! adapters, and the tool dispatcher.

use crate::errors::{ExtractError, GraphError};
use crate::types::{Episode, EntityEdge, EntityNode, EpisodicNode, ExtractionSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Storage backend for episodes, entities, and facts, scoped per namespace.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Persist an episode and return the resulting episodic node.
    async fn add_episode(&self, episode: &Episode) -> Result<EpisodicNode, GraphError>;

    /// Insert or update an entity node, returning its system id.
    async fn upsert_entity_node(&self, node: EntityNode) -> Result<Uuid, GraphError>;

    /// Insert or update a fact edge, returning its system id.
    async fn upsert_entity_edge(&self, edge: EntityEdge) -> Result<Uuid, GraphError>;

    /// Hybrid (lexical + vector, or graph-distance-aware when `center_uuid`
    /// is given) search over entity nodes across one or more namespaces.
    /// Never errors on a no-match query; returns an empty list instead.
    async fn search_nodes(
        &self,
        namespaces: &[String],
        query: &str,
        limit: usize,
        center_uuid: Option<Uuid>,
        label_filter: Option<&str>,
    ) -> Result<Vec<EntityNode>, GraphError>;

    /// Hybrid search over fact edges across one or more namespaces.
    async fn search_facts(
        &self,
        namespaces: &[String],
        query: &str,
        limit: usize,
        center_uuid: Option<Uuid>,
    ) -> Result<Vec<EntityEdge>, GraphError>;

    /// Fetch a single fact edge by id.
    async fn get_entity_edge(&self, uuid: Uuid) -> Result<Option<EntityEdge>, GraphError>;

    /// Fetch the most recent episodes ingested for a namespace, most-recent-first.
    async fn get_episodes(
        &self,
        namespace: &str,
        last_n: usize,
    ) -> Result<Vec<EpisodicNode>, GraphError>;

    /// Logically invalidate a fact edge.
    async fn delete_entity_edge(&self, uuid: Uuid) -> Result<bool, GraphError>;

    /// Remove an episode and any entities/facts that only it supports.
    async fn delete_episode(&self, uuid: Uuid) -> Result<bool, GraphError>;

    /// Destroy all nodes and edges in a namespace. Callers are responsible
    /// for the destructive-operation guard; this method performs no
    /// authorization.
    async fn clear(&self, namespace: &str) -> Result<(), GraphError>;

    /// (Re)build indices/constraints. Safe to call repeatedly; used as a
    /// best-effort post-mutation step by the ingestion engine.
    async fn build_indices_and_constraints(&self) -> Result<(), GraphError>;

    /// Verify the backend is reachable and ready to serve requests.
    async fn verify_connectivity(&self) -> Result<(), GraphError>;
}

/// An LLM-backed extraction provider.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract candidate entities and facts from an episode, guided by the
    /// resolved schema set for that episode's namespace.
    async fn extract(
        &self,
        episode: &Episode,
        schemas: &HashMap<String, ExtractionSchema>,
    ) -> Result<ExtractionResult, ExtractError>;
}

/// The structured result of a single extraction call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub facts: Vec<ExtractedFact>,
}

/// An entity candidate surfaced by an extractor, prior to graph-store
/// upsert (no system uuid yet — it is identified within the extraction by
/// `id_alias` only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub id_alias: String,
    pub name: String,
    pub summary: String,
    pub labels: Vec<String>,
    pub attributes: serde_json::Value,
}

/// A fact candidate surfaced by an extractor, referencing entities by their
/// `id_alias` within the same extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub source_id_alias: String,
    pub target_id_alias: String,
    pub relation: String,
    pub fact_text: String,
}

/// Outcome of a single pipeline plugin's execution against a tool call.
#[derive(Debug)]
pub enum PluginOutcome {
    /// Continue to the next plugin or stage.
    Continue,
    /// Halt processing immediately and return the context's `final_response`.
    Halt,
    /// Halt processing and surface this error to the caller.
    HaltWithError(Box<dyn std::error::Error + Send + Sync>),
}

/// Configuration handed to a plugin at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub enabled: bool,
    pub config: serde_json::Value,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            config: serde_json::Value::Object(Default::default()),
        }
    }
}

/// Shared context flowing through the tool-dispatch pipeline: one instance
/// per incoming JSON-RPC call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub namespace: Option<String>,
    pub tool: String,
    pub arguments: serde_json::Value,
    pub final_response: Option<serde_json::Value>,
    pub attributes: HashMap<String, serde_json::Value>,
    pub start_time: std::time::Instant,
    pub error: Option<String>,
}

impl RequestContext {
    pub fn new(tool: String, arguments: serde_json::Value) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            namespace: None,
            tool,
            arguments,
            final_response: None,
            attributes: HashMap::new(),
            start_time: std::time::Instant::now(),
            error: None,
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn get_attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }
}

/// A single stage of the tool-dispatch pipeline.
#[async_trait]
pub trait PipelinePlugin: Send + Sync {
    /// A unique identifier for the plugin.
    fn name(&self) -> &'static str;

    /// Called once when the plugin is registered.
    async fn init(&mut self, _config: PluginConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    /// Executes the plugin's logic against the in-flight request.
    async fn call(&self, ctx: &mut RequestContext) -> PluginOutcome;

    /// Called during graceful shutdown.
    async fn teardown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}
