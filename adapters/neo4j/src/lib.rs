//! Neo4j-backed implementation of [`GraphStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4j::{Graph, Query};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;
use weftgraph_core::errors::GraphError;
use weftgraph_core::traits::GraphStore;
use weftgraph_core::types::{EntityEdge, EntityNode, Episode, EpisodicNode, Namespace};

mod config;
mod queries;

pub use config::Neo4jConfig;

/// A [`GraphStore`] backed by a real Neo4j instance over the `neo4j` driver.
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connect, verify connectivity, and build indices.
    pub async fn new(config: Neo4jConfig) -> Result<Self, GraphError> {
        config.validate()?;
        info!(uri = %config.uri, "connecting to Neo4j");

        let graph = Graph::new(
            &config.uri,
            config.user.as_deref().unwrap_or("neo4j"),
            config.password.as_deref().unwrap_or(""),
        )
        .await
        .map_err(|e| GraphError::ConnectionFailed(format!("Neo4j connection failed: {e}")))?;

        let store = Self { graph };
        store.verify_connectivity().await?;
        store.build_indices_and_constraints().await?;
        Ok(store)
    }

    fn row_to_entity_node(row_value: &neo4j::Node) -> Result<EntityNode, GraphError> {
        let props = row_value.properties();
        let uuid = parse_required_uuid(props, "uuid")?;
        let namespace = parse_required_string(props, "namespace")?;
        let attributes = props
            .get("attributes")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));
        let labels = props
            .get("labels")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(EntityNode {
            uuid,
            name: parse_required_string(props, "name")?,
            summary: parse_required_string(props, "summary").unwrap_or_default(),
            labels,
            namespace: Namespace::new(namespace),
            created_at: parse_required_datetime(props, "created_at")?,
            attributes,
        })
    }

    fn row_to_fact_edge(
        rel: &neo4j::Relationship,
        source_uuid: Uuid,
        target_uuid: Uuid,
    ) -> Result<EntityEdge, GraphError> {
        let props = rel.properties();
        Ok(EntityEdge {
            uuid: parse_required_uuid(props, "uuid")?,
            source_uuid,
            target_uuid,
            relation: parse_required_string(props, "relation")?,
            fact_text: parse_required_string(props, "fact_text")?,
            valid_from: parse_required_datetime(props, "valid_from")?,
            invalid_at: props
                .get("invalid_at")
                .filter(|v| !v.is_null())
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            namespace: Namespace::new(parse_required_string(props, "namespace")?),
            created_at: parse_required_datetime(props, "created_at")?,
            fact_embedding: None,
        })
    }

    fn row_to_episodic_node(node: &neo4j::Node) -> Result<EpisodicNode, GraphError> {
        let props = node.properties();
        Ok(EpisodicNode {
            uuid: parse_required_uuid(props, "uuid")?,
            name: parse_required_string(props, "name")?,
            body: parse_required_string(props, "body")?,
            namespace: Namespace::new(parse_required_string(props, "namespace")?),
            created_at: parse_required_datetime(props, "created_at")?,
            source_description: parse_required_string(props, "source_description").unwrap_or_default(),
        })
    }
}

fn parse_required_string(props: &HashMap<String, Value>, key: &str) -> Result<String, GraphError> {
    props
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| GraphError::DatabaseError(format!("missing or non-string property: {key}")))
}

fn parse_required_uuid(props: &HashMap<String, Value>, key: &str) -> Result<Uuid, GraphError> {
    let raw = parse_required_string(props, key)?;
    Uuid::parse_str(&raw).map_err(|e| GraphError::DatabaseError(format!("invalid uuid in {key}: {e}")))
}

fn parse_required_datetime(
    props: &HashMap<String, Value>,
    key: &str,
) -> Result<DateTime<Utc>, GraphError> {
    let raw = parse_required_string(props, key)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GraphError::DatabaseError(format!("invalid datetime in {key}: {e}")))
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn add_episode(&self, episode: &Episode) -> Result<EpisodicNode, GraphError> {
        let mut params = HashMap::new();
        params.insert("uuid".to_string(), Value::String(episode.uuid.to_string()));
        params.insert("name".to_string(), Value::String(episode.name.clone()));
        params.insert("body".to_string(), Value::String(episode.body.clone()));
        params.insert(
            "namespace".to_string(),
            Value::String(episode.namespace.as_str().to_string()),
        );
        params.insert(
            "created_at".to_string(),
            Value::String(episode.reference_time.to_rfc3339()),
        );
        params.insert(
            "source_description".to_string(),
            Value::String(episode.source_description.clone()),
        );

        let query = Query::new(queries::CREATE_EPISODE.to_string()).params(params);
        debug!(namespace = %episode.namespace, episode = %episode.name, "creating episode node");
        self.graph
            .execute(query)
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to create episode: {e}")))?;

        Ok(EpisodicNode {
            uuid: episode.uuid,
            name: episode.name.clone(),
            body: episode.body.clone(),
            namespace: episode.namespace.clone(),
            created_at: episode.reference_time,
            source_description: episode.source_description.clone(),
        })
    }

    async fn upsert_entity_node(&self, node: EntityNode) -> Result<Uuid, GraphError> {
        let mut params = HashMap::new();
        params.insert("uuid".to_string(), Value::String(node.uuid.to_string()));
        params.insert("name".to_string(), Value::String(node.name.clone()));
        params.insert("summary".to_string(), Value::String(node.summary.clone()));
        params.insert(
            "labels".to_string(),
            Value::Array(node.labels.iter().map(|l| Value::String(l.clone())).collect()),
        );
        params.insert(
            "namespace".to_string(),
            Value::String(node.namespace.as_str().to_string()),
        );
        params.insert("attributes".to_string(), node.attributes.clone());
        params.insert(
            "created_at".to_string(),
            Value::String(node.created_at.to_rfc3339()),
        );

        let query = Query::new(queries::UPSERT_ENTITY_NODE.to_string()).params(params);
        self.graph
            .execute(query)
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to upsert entity node: {e}")))?;
        Ok(node.uuid)
    }

    async fn upsert_entity_edge(&self, edge: EntityEdge) -> Result<Uuid, GraphError> {
        let mut params = HashMap::new();
        params.insert("uuid".to_string(), Value::String(edge.uuid.to_string()));
        params.insert(
            "source_uuid".to_string(),
            Value::String(edge.source_uuid.to_string()),
        );
        params.insert(
            "target_uuid".to_string(),
            Value::String(edge.target_uuid.to_string()),
        );
        params.insert("relation".to_string(), Value::String(edge.relation.clone()));
        params.insert("fact_text".to_string(), Value::String(edge.fact_text.clone()));
        params.insert(
            "valid_from".to_string(),
            Value::String(edge.valid_from.to_rfc3339()),
        );
        params.insert(
            "invalid_at".to_string(),
            edge.invalid_at
                .map(|dt| Value::String(dt.to_rfc3339()))
                .unwrap_or(Value::Null),
        );
        params.insert(
            "namespace".to_string(),
            Value::String(edge.namespace.as_str().to_string()),
        );
        params.insert(
            "created_at".to_string(),
            Value::String(edge.created_at.to_rfc3339()),
        );
        params.insert(
            "fact_embedding".to_string(),
            edge.fact_embedding
                .map(|v| Value::Array(v.into_iter().map(|f| Value::from(f as f64)).collect()))
                .unwrap_or(Value::Null),
        );

        let query = Query::new(queries::UPSERT_FACT_EDGE.to_string()).params(params);
        self.graph
            .execute(query)
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to upsert fact edge: {e}")))?;
        Ok(edge.uuid)
    }

    async fn search_nodes(
        &self,
        namespaces: &[String],
        query: &str,
        limit: usize,
        _center_uuid: Option<Uuid>,
        label_filter: Option<&str>,
    ) -> Result<Vec<EntityNode>, GraphError> {
        let mut params = HashMap::new();
        params.insert(
            "namespaces".to_string(),
            Value::Array(namespaces.iter().map(|n| Value::String(n.clone())).collect()),
        );
        params.insert("query".to_string(), Value::String(query.to_string()));
        params.insert("limit".to_string(), Value::from(limit as i64));
        params.insert(
            "label_filter".to_string(),
            label_filter.map(|l| Value::String(l.to_string())).unwrap_or(Value::Null),
        );

        let neo4j_query = Query::new(queries::SEARCH_ENTITY_NODES.to_string()).params(params);
        let mut result = self
            .graph
            .execute(neo4j_query)
            .await
            .map_err(|e| GraphError::QueryFailed(format!("node search failed: {e}")))?;

        let mut nodes = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to fetch row: {e}")))?
        {
            if let Ok(node) = row.get::<neo4j::Node>("n") {
                nodes.push(Self::row_to_entity_node(&node)?);
            }
        }
        Ok(nodes)
    }

    async fn search_facts(
        &self,
        namespaces: &[String],
        query: &str,
        limit: usize,
        _center_uuid: Option<Uuid>,
    ) -> Result<Vec<EntityEdge>, GraphError> {
        let mut params = HashMap::new();
        params.insert(
            "namespaces".to_string(),
            Value::Array(namespaces.iter().map(|n| Value::String(n.clone())).collect()),
        );
        params.insert("query".to_string(), Value::String(query.to_string()));
        params.insert("limit".to_string(), Value::from(limit as i64));

        let neo4j_query = Query::new(queries::SEARCH_FACT_EDGES.to_string()).params(params);
        let mut result = self
            .graph
            .execute(neo4j_query)
            .await
            .map_err(|e| GraphError::QueryFailed(format!("fact search failed: {e}")))?;

        let mut edges = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to fetch row: {e}")))?
        {
            if let (Ok(rel), Ok(source), Ok(target)) = (
                row.get::<neo4j::Relationship>("r"),
                row.get::<String>("source_uuid"),
                row.get::<String>("target_uuid"),
            ) {
                let source_uuid = Uuid::parse_str(&source)
                    .map_err(|e| GraphError::DatabaseError(format!("invalid uuid: {e}")))?;
                let target_uuid = Uuid::parse_str(&target)
                    .map_err(|e| GraphError::DatabaseError(format!("invalid uuid: {e}")))?;
                edges.push(Self::row_to_fact_edge(&rel, source_uuid, target_uuid)?);
            }
        }
        Ok(edges)
    }

    async fn get_entity_edge(&self, uuid: Uuid) -> Result<Option<EntityEdge>, GraphError> {
        let mut params = HashMap::new();
        params.insert("uuid".to_string(), Value::String(uuid.to_string()));
        let query = Query::new(queries::GET_FACT_EDGE.to_string()).params(params);

        let mut result = self
            .graph
            .execute(query)
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to get fact edge: {e}")))?;

        if let Some(row) = result
            .next()
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to fetch row: {e}")))?
        {
            if let (Ok(rel), Ok(source), Ok(target)) = (
                row.get::<neo4j::Relationship>("r"),
                row.get::<String>("source_uuid"),
                row.get::<String>("target_uuid"),
            ) {
                let source_uuid = Uuid::parse_str(&source)
                    .map_err(|e| GraphError::DatabaseError(format!("invalid uuid: {e}")))?;
                let target_uuid = Uuid::parse_str(&target)
                    .map_err(|e| GraphError::DatabaseError(format!("invalid uuid: {e}")))?;
                return Ok(Some(Self::row_to_fact_edge(&rel, source_uuid, target_uuid)?));
            }
        }
        Ok(None)
    }

    async fn get_episodes(
        &self,
        namespace: &str,
        last_n: usize,
    ) -> Result<Vec<EpisodicNode>, GraphError> {
        let mut params = HashMap::new();
        params.insert("namespace".to_string(), Value::String(namespace.to_string()));
        params.insert("last_n".to_string(), Value::from(last_n as i64));

        let query = Query::new(queries::GET_EPISODES.to_string()).params(params);
        let mut result = self
            .graph
            .execute(query)
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to get episodes: {e}")))?;

        let mut episodes = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to fetch row: {e}")))?
        {
            if let Ok(node) = row.get::<neo4j::Node>("n") {
                episodes.push(Self::row_to_episodic_node(&node)?);
            }
        }
        Ok(episodes)
    }

    async fn delete_entity_edge(&self, uuid: Uuid) -> Result<bool, GraphError> {
        let mut params = HashMap::new();
        params.insert("uuid".to_string(), Value::String(uuid.to_string()));
        let query = Query::new(queries::DELETE_FACT_EDGE.to_string()).params(params);

        let mut result = self
            .graph
            .execute(query)
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to delete fact edge: {e}")))?;

        if let Some(row) = result
            .next()
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to fetch result: {e}")))?
        {
            let deleted: i64 = row
                .get("deleted_count")
                .map_err(|e| GraphError::QueryFailed(format!("missing deleted_count: {e}")))?;
            Ok(deleted > 0)
        } else {
            Ok(false)
        }
    }

    async fn delete_episode(&self, uuid: Uuid) -> Result<bool, GraphError> {
        let mut params = HashMap::new();
        params.insert("uuid".to_string(), Value::String(uuid.to_string()));
        let query = Query::new(queries::DELETE_EPISODE.to_string()).params(params);

        let mut result = self
            .graph
            .execute(query)
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to delete episode: {e}")))?;

        if let Some(row) = result
            .next()
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to fetch result: {e}")))?
        {
            let deleted: i64 = row
                .get("deleted_count")
                .map_err(|e| GraphError::QueryFailed(format!("missing deleted_count: {e}")))?;
            Ok(deleted > 0)
        } else {
            Ok(false)
        }
    }

    async fn clear(&self, namespace: &str) -> Result<(), GraphError> {
        let mut params = HashMap::new();
        params.insert("namespace".to_string(), Value::String(namespace.to_string()));
        let query = Query::new(queries::CLEAR_NAMESPACE.to_string()).params(params);
        self.graph
            .execute(query)
            .await
            .map_err(|e| GraphError::QueryFailed(format!("failed to clear namespace: {e}")))?;
        Ok(())
    }

    async fn build_indices_and_constraints(&self) -> Result<(), GraphError> {
        for index_query in queries::CREATE_INDICES {
            debug!(query = %index_query, "ensuring index");
            let query = Query::new(index_query.to_string());
            self.graph
                .execute(query)
                .await
                .map_err(|e| GraphError::DatabaseError(format!("failed to create index: {e}")))?;
        }
        Ok(())
    }

    async fn verify_connectivity(&self) -> Result<(), GraphError> {
        let query = Query::new("RETURN 1 as ok".to_string());
        let mut result = self
            .graph
            .execute(query)
            .await
            .map_err(|e| GraphError::ConnectionFailed(format!("connectivity check failed: {e}")))?;

        match result
            .next()
            .await
            .map_err(|e| GraphError::ConnectionFailed(format!("connectivity check failed: {e}")))?
        {
            Some(_) => Ok(()),
            None => {
                warn!("connectivity check returned no rows");
                Err(GraphError::ConnectionFailed(
                    "connectivity check returned no rows".to_string(),
                ))
            }
        }
    }
}
