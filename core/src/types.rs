//! Core data types shared by every component of the ingestion/query server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A string label partitioning all graph data. Aliased in the wire protocol as
/// `group_id`. Namespaces are created implicitly on first use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace(pub String);

impl Namespace {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Namespace {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Namespace {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How the body of an episode should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeFormat {
    /// Body is prose, passed verbatim as context.
    Text,
    /// Body is a conversation transcript.
    Message,
    /// Body is a string the extractor will attempt to parse as structured data.
    Json,
}

impl Default for EpisodeFormat {
    fn default() -> Self {
        EpisodeFormat::Text
    }
}

impl std::fmt::Display for EpisodeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EpisodeFormat::Text => write!(f, "text"),
            EpisodeFormat::Message => write!(f, "message"),
            EpisodeFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for EpisodeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(EpisodeFormat::Text),
            "message" => Ok(EpisodeFormat::Message),
            "json" => Ok(EpisodeFormat::Json),
            other => Err(format!("unknown episode format: {other}")),
        }
    }
}

/// The unit of ingestion submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub uuid: Uuid,
    pub name: String,
    pub body: String,
    pub format: EpisodeFormat,
    pub namespace: Namespace,
    pub source_description: String,
    pub reference_time: DateTime<Utc>,
}

impl Episode {
    /// Build an episode from a tool call, minting a uuid and reference_time
    /// when the caller omitted them.
    pub fn from_request(
        name: String,
        body: String,
        format: EpisodeFormat,
        namespace: Namespace,
        source_description: String,
        uuid: Option<Uuid>,
    ) -> Self {
        Self {
            uuid: uuid.unwrap_or_else(Uuid::new_v4),
            name,
            body,
            format,
            namespace,
            source_description,
            reference_time: Utc::now(),
        }
    }
}

/// The persisted form of an episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicNode {
    pub uuid: Uuid,
    pub name: String,
    pub body: String,
    pub namespace: Namespace,
    pub created_at: DateTime<Utc>,
    pub source_description: String,
}

/// A persisted entity extracted from one or more episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityNode {
    pub uuid: Uuid,
    pub name: String,
    pub summary: String,
    pub labels: Vec<String>,
    pub namespace: Namespace,
    pub created_at: DateTime<Utc>,
    pub attributes: serde_json::Value,
}

/// A persisted fact (relationship) between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEdge {
    pub uuid: Uuid,
    pub source_uuid: Uuid,
    pub target_uuid: Uuid,
    pub relation: String,
    pub fact_text: String,
    pub valid_from: DateTime<Utc>,
    pub invalid_at: Option<DateTime<Utc>>,
    pub namespace: Namespace,
    pub created_at: DateTime<Utc>,
    /// Opaque vector embedding of `fact_text`. Never serialized into a client
    /// response; adapters that embed facts populate it, search results strip
    /// it via [`FactRecord::from`].
    #[serde(skip_serializing, default)]
    pub fact_embedding: Option<Vec<f32>>,
}

impl EntityEdge {
    /// True when this edge has not been superseded.
    pub fn is_current(&self) -> bool {
        self.invalid_at.is_none()
    }
}

/// Node/entity search result shape returned over the wire (no embedding, no
/// internal-only fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub uuid: Uuid,
    pub name: String,
    pub summary: String,
    pub labels: Vec<String>,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
    pub attributes: serde_json::Value,
}

impl From<EntityNode> for NodeRecord {
    fn from(n: EntityNode) -> Self {
        Self {
            uuid: n.uuid,
            name: n.name,
            summary: n.summary,
            labels: n.labels,
            namespace: n.namespace.0,
            created_at: n.created_at,
            attributes: n.attributes,
        }
    }
}

/// Fact/edge search result shape returned over the wire (embedding stripped).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactRecord {
    pub uuid: Uuid,
    pub source_uuid: Uuid,
    pub target_uuid: Uuid,
    pub relation: String,
    pub fact_text: String,
    pub valid_from: DateTime<Utc>,
    pub invalid_at: Option<DateTime<Utc>>,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
}

impl From<EntityEdge> for FactRecord {
    fn from(e: EntityEdge) -> Self {
        Self {
            uuid: e.uuid,
            source_uuid: e.source_uuid,
            target_uuid: e.target_uuid,
            relation: e.relation,
            fact_text: e.fact_text,
            valid_from: e.valid_from,
            invalid_at: e.invalid_at,
            namespace: e.namespace.0,
            created_at: e.created_at,
        }
    }
}

/// A single field in an extraction schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    /// Semantic type hint for the extractor's prompt (e.g. "string", "date").
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

fn default_field_type() -> String {
    "string".to_string()
}

/// A named extraction template the extractor uses to shape LLM output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSchema {
    pub name: String,
    pub description: String,
    pub fields: Vec<SchemaField>,
}

impl ExtractionSchema {
    /// Schema-shaped iff it declares a description and at least one field —
    /// mirrors the "has a docstring and typed attributes" test used to decide
    /// whether a loaded type is registrable.
    pub fn is_schema_shaped(&self) -> bool {
        !self.description.trim().is_empty() && !self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// A snapshot of the registered schema set, e.g. as resolved at enqueue time.
pub type SchemaSet = HashMap<String, ExtractionSchema>;
