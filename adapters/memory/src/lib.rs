//! In-memory [`GraphStore`] implementation, used for tests and local
//! development without a real graph backend.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;
use weftgraph_core::errors::GraphError;
use weftgraph_core::traits::GraphStore;
use weftgraph_core::types::{EntityEdge, EntityNode, Episode, EpisodicNode};

/// Tuning knobs for the in-memory store. Limits are soft: exceeding them
/// only logs a warning, they do not reject writes.
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    pub max_nodes: Option<usize>,
    pub max_edges: Option<usize>,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_nodes: Some(100_000),
            max_edges: Some(500_000),
        }
    }
}

#[derive(Debug, Default)]
struct Store {
    episodes: HashMap<Uuid, EpisodicNode>,
    episodes_by_namespace: HashMap<String, Vec<Uuid>>,
    nodes: HashMap<Uuid, EntityNode>,
    nodes_by_namespace: HashMap<String, Vec<Uuid>>,
    edges: HashMap<Uuid, EntityEdge>,
    edges_by_namespace: HashMap<String, Vec<Uuid>>,
}

/// An in-process [`GraphStore`] backed by `RwLock`-guarded hash maps.
pub struct InMemoryStore {
    config: InMemoryConfig,
    inner: RwLock<Store>,
}

impl InMemoryStore {
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Store::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

fn matches_query(haystack: &str, query: &str) -> bool {
    query.is_empty() || haystack.to_lowercase().contains(&query.to_lowercase())
}

#[async_trait]
impl GraphStore for InMemoryStore {
    async fn add_episode(&self, episode: &Episode) -> Result<EpisodicNode, GraphError> {
        let node = EpisodicNode {
            uuid: episode.uuid,
            name: episode.name.clone(),
            body: episode.body.clone(),
            namespace: episode.namespace.clone(),
            created_at: episode.reference_time,
            source_description: episode.source_description.clone(),
        };

        let mut store = self.inner.write().await;
        store.episodes.insert(node.uuid, node.clone());
        store
            .episodes_by_namespace
            .entry(episode.namespace.as_str().to_string())
            .or_default()
            .push(node.uuid);

        debug!(namespace = %episode.namespace, episode = %episode.name, "episode stored");
        Ok(node)
    }

    async fn upsert_entity_node(&self, node: EntityNode) -> Result<Uuid, GraphError> {
        let mut store = self.inner.write().await;
        if let Some(max) = self.config.max_nodes {
            if store.nodes.len() >= max && !store.nodes.contains_key(&node.uuid) {
                tracing::warn!(max_nodes = max, "in-memory node limit reached");
            }
        }
        let id = node.uuid;
        store
            .nodes_by_namespace
            .entry(node.namespace.as_str().to_string())
            .or_default()
            .push(id);
        store.nodes.insert(id, node);
        Ok(id)
    }

    async fn upsert_entity_edge(&self, edge: EntityEdge) -> Result<Uuid, GraphError> {
        let mut store = self.inner.write().await;
        if let Some(max) = self.config.max_edges {
            if store.edges.len() >= max && !store.edges.contains_key(&edge.uuid) {
                tracing::warn!(max_edges = max, "in-memory edge limit reached");
            }
        }
        let id = edge.uuid;
        store
            .edges_by_namespace
            .entry(edge.namespace.as_str().to_string())
            .or_default()
            .push(id);
        store.edges.insert(id, edge);
        Ok(id)
    }

    async fn search_nodes(
        &self,
        namespaces: &[String],
        query: &str,
        limit: usize,
        _center_uuid: Option<Uuid>,
        label_filter: Option<&str>,
    ) -> Result<Vec<EntityNode>, GraphError> {
        let store = self.inner.read().await;
        let candidate_ids: Vec<Uuid> = if namespaces.is_empty() {
            store.nodes.keys().copied().collect()
        } else {
            namespaces
                .iter()
                .flat_map(|ns| store.nodes_by_namespace.get(ns).cloned().unwrap_or_default())
                .collect()
        };

        let mut results: Vec<EntityNode> = candidate_ids
            .into_iter()
            .filter_map(|id| store.nodes.get(&id).cloned())
            .filter(|node| matches_query(&node.name, query) || matches_query(&node.summary, query))
            .filter(|node| match label_filter {
                Some(label) if !label.is_empty() => {
                    node.labels.iter().any(|l| l == label)
                }
                _ => true,
            })
            .collect();

        results.truncate(limit);
        Ok(results)
    }

    async fn search_facts(
        &self,
        namespaces: &[String],
        query: &str,
        limit: usize,
        _center_uuid: Option<Uuid>,
    ) -> Result<Vec<EntityEdge>, GraphError> {
        let store = self.inner.read().await;
        let candidate_ids: Vec<Uuid> = if namespaces.is_empty() {
            store.edges.keys().copied().collect()
        } else {
            namespaces
                .iter()
                .flat_map(|ns| store.edges_by_namespace.get(ns).cloned().unwrap_or_default())
                .collect()
        };

        let mut results: Vec<EntityEdge> = candidate_ids
            .into_iter()
            .filter_map(|id| store.edges.get(&id).cloned())
            .filter(|edge| matches_query(&edge.fact_text, query) || matches_query(&edge.relation, query))
            .collect();

        results.truncate(limit);
        // Embeddings are opaque and never leave the store via search.
        for edge in results.iter_mut() {
            edge.fact_embedding = None;
        }
        Ok(results)
    }

    async fn get_entity_edge(&self, uuid: Uuid) -> Result<Option<EntityEdge>, GraphError> {
        let store = self.inner.read().await;
        Ok(store.edges.get(&uuid).map(|e| {
            let mut e = e.clone();
            e.fact_embedding = None;
            e
        }))
    }

    async fn get_episodes(
        &self,
        namespace: &str,
        last_n: usize,
    ) -> Result<Vec<EpisodicNode>, GraphError> {
        let store = self.inner.read().await;
        let ids = store
            .episodes_by_namespace
            .get(namespace)
            .cloned()
            .unwrap_or_default();

        let mut episodes: Vec<EpisodicNode> = ids
            .into_iter()
            .rev()
            .filter_map(|id| store.episodes.get(&id).cloned())
            .collect();
        episodes.truncate(last_n);
        Ok(episodes)
    }

    async fn delete_entity_edge(&self, uuid: Uuid) -> Result<bool, GraphError> {
        let mut store = self.inner.write().await;
        if let Some(edge) = store.edges.remove(&uuid) {
            if let Some(ids) = store.edges_by_namespace.get_mut(edge.namespace.as_str()) {
                ids.retain(|id| *id != uuid);
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete_episode(&self, uuid: Uuid) -> Result<bool, GraphError> {
        let mut store = self.inner.write().await;
        if let Some(episode) = store.episodes.remove(&uuid) {
            if let Some(ids) = store.episodes_by_namespace.get_mut(episode.namespace.as_str()) {
                ids.retain(|id| *id != uuid);
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn clear(&self, namespace: &str) -> Result<(), GraphError> {
        let mut store = self.inner.write().await;
        for id in store.episodes_by_namespace.remove(namespace).unwrap_or_default() {
            store.episodes.remove(&id);
        }
        for id in store.nodes_by_namespace.remove(namespace).unwrap_or_default() {
            store.nodes.remove(&id);
        }
        for id in store.edges_by_namespace.remove(namespace).unwrap_or_default() {
            store.edges.remove(&id);
        }
        Ok(())
    }

    async fn build_indices_and_constraints(&self) -> Result<(), GraphError> {
        debug!("in-memory store has no indices to build, no-op");
        Ok(())
    }

    async fn verify_connectivity(&self) -> Result<(), GraphError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weftgraph_core::types::{EpisodeFormat, Namespace};

    fn episode(name: &str, namespace: &str) -> Episode {
        Episode::from_request(
            name.to_string(),
            "body text".to_string(),
            EpisodeFormat::Text,
            Namespace::new(namespace),
            "test".to_string(),
            None,
        )
    }

    fn entity_node(name: &str, namespace: &str, labels: Vec<&str>) -> EntityNode {
        EntityNode {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            summary: format!("summary of {name}"),
            labels: labels.into_iter().map(str::to_string).collect(),
            namespace: Namespace::new(namespace),
            created_at: chrono::Utc::now(),
            attributes: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn add_episode_is_retrievable_in_recency_order() {
        let store = InMemoryStore::default();
        store.add_episode(&episode("A", "demo")).await.unwrap();
        store.add_episode(&episode("B", "demo")).await.unwrap();
        store.add_episode(&episode("C", "demo")).await.unwrap();

        let episodes = store.get_episodes("demo", 10).await.unwrap();
        let names: Vec<&str> = episodes.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn search_nodes_is_scoped_by_namespace() {
        let store = InMemoryStore::default();
        store
            .upsert_entity_node(entity_node("Alice", "demo", vec!["Person"]))
            .await
            .unwrap();
        store
            .upsert_entity_node(entity_node("Bob", "other", vec!["Person"]))
            .await
            .unwrap();

        let results = store
            .search_nodes(&["demo".to_string()], "", 10, None, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Alice");
    }

    #[tokio::test]
    async fn search_nodes_empty_namespace_list_searches_everything() {
        let store = InMemoryStore::default();
        store
            .upsert_entity_node(entity_node("Alice", "demo", vec!["Person"]))
            .await
            .unwrap();
        store
            .upsert_entity_node(entity_node("Acme", "other", vec!["Organization"]))
            .await
            .unwrap();

        let results = store.search_nodes(&[], "a", 10, None, None).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn search_nodes_label_filter_narrows_results() {
        let store = InMemoryStore::default();
        store
            .upsert_entity_node(entity_node("Alice", "demo", vec!["Person"]))
            .await
            .unwrap();
        store
            .upsert_entity_node(entity_node("Acme", "demo", vec!["Organization"]))
            .await
            .unwrap();

        let results = store
            .search_nodes(&["demo".to_string()], "", 10, None, Some("Organization"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Acme");
    }

    #[tokio::test]
    async fn search_with_no_matches_returns_empty_not_error() {
        let store = InMemoryStore::default();
        let results = store
            .search_nodes(&["demo".to_string()], "nonexistent", 10, None, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_facts_strips_embedding() {
        let store = InMemoryStore::default();
        let mut edge = EntityEdge {
            uuid: Uuid::new_v4(),
            source_uuid: Uuid::new_v4(),
            target_uuid: Uuid::new_v4(),
            relation: "WORKS_FOR".to_string(),
            fact_text: "Alice works for Acme".to_string(),
            valid_from: chrono::Utc::now(),
            invalid_at: None,
            namespace: Namespace::new("demo"),
            created_at: chrono::Utc::now(),
            fact_embedding: Some(vec![0.1, 0.2]),
        };
        store.upsert_entity_edge(edge.clone()).await.unwrap();
        edge.fact_embedding = None;

        let results = store
            .search_facts(&["demo".to_string()], "works", 10, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].fact_embedding.is_none());
    }

    #[tokio::test]
    async fn delete_episode_removes_it_from_namespace_index() {
        let store = InMemoryStore::default();
        let ep = episode("A", "demo");
        store.add_episode(&ep).await.unwrap();

        assert!(store.delete_episode(ep.uuid).await.unwrap());
        assert!(store.get_episodes("demo", 10).await.unwrap().is_empty());
        assert!(!store.delete_episode(ep.uuid).await.unwrap());
    }

    #[tokio::test]
    async fn clear_removes_only_the_named_namespace() {
        let store = InMemoryStore::default();
        store.add_episode(&episode("A", "demo")).await.unwrap();
        store.add_episode(&episode("B", "other")).await.unwrap();

        store.clear("demo").await.unwrap();

        assert!(store.get_episodes("demo", 10).await.unwrap().is_empty());
        assert_eq!(store.get_episodes("other", 10).await.unwrap().len(), 1);
    }
}
