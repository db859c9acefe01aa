//! Per-namespace FIFO ingestion queues and workers.
//!
//! One queue is created per namespace, lazily, on first use; one worker is
//! spawned per queue and runs for the process lifetime. Workers across
//! namespaces run in parallel; within a namespace at most one task is ever
//! in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use weftgraph_core::errors::GraphError;
use weftgraph_core::traits::{Extractor, GraphStore};
use weftgraph_core::types::{
    EntityEdge as CoreEntityEdge, EntityNode as CoreEntityNode, Episode as CoreEpisode,
    EpisodeFormat, ExtractionSchema,
};

type SchemaSet = Arc<HashMap<String, ExtractionSchema>>;

/// A single unit of work handed to a namespace's worker. Immutable after
/// enqueue.
struct Task {
    episode: CoreEpisode,
    schemas: SchemaSet,
    correlation_id: Uuid,
}

struct QueueHandle {
    sender: mpsc::UnboundedSender<Task>,
    pending: Arc<AtomicUsize>,
}

/// Acknowledgement returned synchronously to the caller on enqueue.
#[derive(Debug, Clone, Copy)]
pub struct EnqueueAck {
    pub position: usize,
}

/// Owns the namespace→queue map and drives episodes through the extractor
/// and graph store.
pub struct IngestionEngine {
    graph_store: Arc<dyn GraphStore>,
    extractor: Arc<dyn Extractor>,
    queues: Mutex<HashMap<String, QueueHandle>>,
}

impl IngestionEngine {
    pub fn new(graph_store: Arc<dyn GraphStore>, extractor: Arc<dyn Extractor>) -> Arc<Self> {
        Arc::new(Self {
            graph_store,
            extractor,
            queues: Mutex::new(HashMap::new()),
        })
    }

    /// Enqueue an episode for processing, spawning the namespace's worker if
    /// this is the first episode observed for it. Returns immediately; the
    /// episode is processed asynchronously.
    pub async fn enqueue(self: &Arc<Self>, episode: CoreEpisode, schemas: SchemaSet) -> EnqueueAck {
        let namespace = episode.namespace.as_str().to_string();
        let correlation_id = Uuid::new_v4();

        // Narrow critical section: look up or create the queue, never held
        // across an await past this block.
        let (sender, pending) = {
            let mut queues = self.queues.lock().await;
            if let Some(handle) = queues.get(&namespace) {
                (handle.sender.clone(), Arc::clone(&handle.pending))
            } else {
                let (tx, rx) = mpsc::unbounded_channel::<Task>();
                let pending = Arc::new(AtomicUsize::new(0));
                queues.insert(
                    namespace.clone(),
                    QueueHandle {
                        sender: tx.clone(),
                        pending: Arc::clone(&pending),
                    },
                );
                self.spawn_worker(namespace.clone(), rx);
                (tx, pending)
            }
        };

        let position = pending.fetch_add(1, Ordering::SeqCst) + 1;

        if sender
            .send(Task {
                episode,
                schemas,
                correlation_id,
            })
            .is_err()
        {
            tracing::error!(
                namespace = %namespace,
                correlation_id = %correlation_id,
                "ingestion worker for namespace has exited, episode dropped"
            );
        }

        EnqueueAck { position }
    }

    fn spawn_worker(self: &Arc<Self>, namespace: String, mut receiver: mpsc::UnboundedReceiver<Task>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(namespace = %namespace, "ingestion worker started");
            while let Some(task) = receiver.recv().await {
                engine.process_task(&namespace, task).await;
            }
            tracing::info!(namespace = %namespace, "ingestion worker exiting, channel closed");
        });
    }

    async fn process_task(&self, namespace: &str, task: Task) {
        let Task {
            episode,
            schemas,
            correlation_id,
        } = task;

        if episode.format == EpisodeFormat::Json {
            if let Err(err) = serde_json::from_str::<serde_json::Value>(&episode.body) {
                tracing::warn!(
                    namespace = %namespace,
                    episode = %episode.name,
                    correlation_id = %correlation_id,
                    error = %err,
                    "episode body declared json but failed to parse, processing as text"
                );
            }
        }

        let result = self.run_pipeline(&episode, &schemas).await;

        if let Some(pos) = self.pending_counter(namespace).await {
            pos.fetch_sub(1, Ordering::SeqCst);
        }

        match result {
            Ok(()) => {
                tracing::info!(
                    namespace = %namespace,
                    episode = %episode.name,
                    correlation_id = %correlation_id,
                    "episode processed"
                );
            }
            Err(err) => {
                tracing::error!(
                    namespace = %namespace,
                    episode = %episode.name,
                    correlation_id = %correlation_id,
                    error = %err,
                    "episode processing failed, episode will not be requeued"
                );
            }
        }

        // Best-effort community/summary rebuild; never fails the task.
        if let Err(err) = self.graph_store.build_indices_and_constraints().await {
            tracing::warn!(
                namespace = %namespace,
                correlation_id = %correlation_id,
                error = %err,
                "post-ingestion index rebuild failed"
            );
        }
    }

    async fn pending_counter(&self, namespace: &str) -> Option<Arc<AtomicUsize>> {
        self.queues
            .lock()
            .await
            .get(namespace)
            .map(|h| Arc::clone(&h.pending))
    }

    async fn run_pipeline(
        &self,
        episode: &CoreEpisode,
        schemas: &SchemaSet,
    ) -> Result<(), IngestionError> {
        self.graph_store
            .add_episode(episode)
            .await
            .map_err(IngestionError::Graph)?;

        let extraction = self
            .extractor
            .extract(episode, schemas)
            .await
            .map_err(IngestionError::Extract)?;

        let mut alias_to_uuid: HashMap<String, Uuid> = HashMap::new();
        for entity in extraction.entities {
            let node = CoreEntityNode {
                uuid: Uuid::new_v4(),
                name: entity.name,
                summary: entity.summary,
                labels: entity.labels,
                namespace: episode.namespace.clone(),
                created_at: chrono::Utc::now(),
                attributes: entity.attributes,
            };
            alias_to_uuid.insert(entity.id_alias, node.uuid);
            self.graph_store
                .upsert_entity_node(node)
                .await
                .map_err(IngestionError::Graph)?;
        }

        for fact in extraction.facts {
            let (Some(&source_uuid), Some(&target_uuid)) = (
                alias_to_uuid.get(&fact.source_id_alias),
                alias_to_uuid.get(&fact.target_id_alias),
            ) else {
                tracing::warn!(
                    source = %fact.source_id_alias,
                    target = %fact.target_id_alias,
                    "fact referenced an unresolved entity alias, skipping"
                );
                continue;
            };

            let edge = CoreEntityEdge {
                uuid: Uuid::new_v4(),
                source_uuid,
                target_uuid,
                relation: fact.relation,
                fact_text: fact.fact_text,
                valid_from: chrono::Utc::now(),
                invalid_at: None,
                namespace: episode.namespace.clone(),
                created_at: chrono::Utc::now(),
                fact_embedding: None,
            };
            self.graph_store
                .upsert_entity_edge(edge)
                .await
                .map_err(IngestionError::Graph)?;
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum IngestionError {
    #[error("graph store error: {0}")]
    Graph(#[from] GraphError),
    #[error("extraction error: {0}")]
    Extract(#[from] weftgraph_core::errors::ExtractError),
}

// Re-exported so downstream crates can name these without importing core
// traits directly.
pub use weftgraph_core::traits::{ExtractedEntity, ExtractedFact, ExtractionResult};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::RwLock;
    use tokio::time::{sleep, Duration};
    use weftgraph_core::errors::ExtractError;
    use weftgraph_core::traits::{ExtractedEntity, ExtractionResult};
    use weftgraph_core::types::{EpisodeFormat, EpisodicNode, Namespace};

    struct RecordingStore {
        episodes: RwLock<Vec<CoreEpisode>>,
        delay: Option<Duration>,
    }

    impl RecordingStore {
        fn new(delay: Option<Duration>) -> Self {
            Self {
                episodes: RwLock::new(Vec::new()),
                delay,
            }
        }
    }

    #[async_trait]
    impl GraphStore for RecordingStore {
        async fn add_episode(&self, episode: &CoreEpisode) -> Result<EpisodicNode, GraphError> {
            if let Some(delay) = self.delay {
                sleep(delay).await;
            }
            self.episodes.write().await.push(episode.clone());
            Ok(EpisodicNode {
                uuid: episode.uuid,
                name: episode.name.clone(),
                body: episode.body.clone(),
                namespace: episode.namespace.clone(),
                created_at: episode.reference_time,
                source_description: episode.source_description.clone(),
            })
        }

        async fn upsert_entity_node(&self, _node: CoreEntityNode) -> Result<Uuid, GraphError> {
            Ok(Uuid::new_v4())
        }

        async fn upsert_entity_edge(&self, _edge: CoreEntityEdge) -> Result<Uuid, GraphError> {
            Ok(Uuid::new_v4())
        }

        async fn search_nodes(
            &self,
            _namespaces: &[String],
            _query: &str,
            _limit: usize,
            _center_uuid: Option<Uuid>,
            _label_filter: Option<&str>,
        ) -> Result<Vec<CoreEntityNode>, GraphError> {
            Ok(Vec::new())
        }

        async fn search_facts(
            &self,
            _namespaces: &[String],
            _query: &str,
            _limit: usize,
            _center_uuid: Option<Uuid>,
        ) -> Result<Vec<CoreEntityEdge>, GraphError> {
            Ok(Vec::new())
        }

        async fn get_entity_edge(&self, _uuid: Uuid) -> Result<Option<CoreEntityEdge>, GraphError> {
            Ok(None)
        }

        async fn get_episodes(
            &self,
            _namespace: &str,
            _last_n: usize,
        ) -> Result<Vec<EpisodicNode>, GraphError> {
            Ok(Vec::new())
        }

        async fn delete_entity_edge(&self, _uuid: Uuid) -> Result<bool, GraphError> {
            Ok(false)
        }

        async fn delete_episode(&self, _uuid: Uuid) -> Result<bool, GraphError> {
            Ok(false)
        }

        async fn clear(&self, _namespace: &str) -> Result<(), GraphError> {
            Ok(())
        }

        async fn build_indices_and_constraints(&self) -> Result<(), GraphError> {
            Ok(())
        }

        async fn verify_connectivity(&self) -> Result<(), GraphError> {
            Ok(())
        }
    }

    struct NoopExtractor;

    #[async_trait]
    impl Extractor for NoopExtractor {
        async fn extract(
            &self,
            _episode: &CoreEpisode,
            _schemas: &HashMap<String, ExtractionSchema>,
        ) -> Result<ExtractionResult, ExtractError> {
            Ok(ExtractionResult::default())
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl Extractor for FailingExtractor {
        async fn extract(
            &self,
            _episode: &CoreEpisode,
            _schemas: &HashMap<String, ExtractionSchema>,
        ) -> Result<ExtractionResult, ExtractError> {
            Err(ExtractError::SchemaValidationError("unexpected field".to_string()))
        }
    }

    fn episode(name: &str, namespace: &str) -> CoreEpisode {
        CoreEpisode::from_request(
            name.to_string(),
            "some body".to_string(),
            EpisodeFormat::Text,
            Namespace::new(namespace),
            String::new(),
            None,
        )
    }

    #[tokio::test]
    async fn fifo_within_namespace() {
        let store = Arc::new(RecordingStore::new(None));
        let engine = IngestionEngine::new(store.clone(), Arc::new(NoopExtractor));
        let schemas: SchemaSet = Arc::new(HashMap::new());

        engine.enqueue(episode("A", "demo"), Arc::clone(&schemas)).await;
        engine.enqueue(episode("B", "demo"), Arc::clone(&schemas)).await;
        engine.enqueue(episode("C", "demo"), schemas).await;

        // Allow the single worker to drain all three tasks.
        sleep(Duration::from_millis(50)).await;

        let seen = store.episodes.read().await;
        let names: Vec<&str> = seen.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn parallel_across_namespaces() {
        let store = Arc::new(RecordingStore::new(Some(Duration::from_millis(80))));
        let engine = IngestionEngine::new(store.clone(), Arc::new(NoopExtractor));
        let schemas: SchemaSet = Arc::new(HashMap::new());

        let start = std::time::Instant::now();
        engine.enqueue(episode("N1", "ns-1"), Arc::clone(&schemas)).await;
        engine.enqueue(episode("N2", "ns-2"), schemas).await;

        sleep(Duration::from_millis(200)).await;
        let elapsed = start.elapsed();

        assert_eq!(store.episodes.read().await.len(), 2);
        // Both episodes should have completed well under 2x the per-task delay.
        assert!(elapsed < Duration::from_millis(160));
    }

    #[tokio::test]
    async fn extraction_failure_does_not_crash_worker_or_requeue() {
        let store = Arc::new(RecordingStore::new(None));
        let engine = IngestionEngine::new(store.clone(), Arc::new(FailingExtractor));
        let schemas: SchemaSet = Arc::new(HashMap::new());

        engine.enqueue(episode("Bad", "demo"), Arc::clone(&schemas)).await;
        engine.enqueue(episode("Good", "demo"), schemas).await;
        sleep(Duration::from_millis(50)).await;

        // The episodic node is still persisted before extraction runs; both
        // episodes are recorded exactly once, neither is retried.
        let seen = store.episodes.read().await;
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn enqueue_returns_increasing_position_within_namespace() {
        let store = Arc::new(RecordingStore::new(Some(Duration::from_millis(100))));
        let engine = IngestionEngine::new(store, Arc::new(NoopExtractor));
        let schemas: SchemaSet = Arc::new(HashMap::new());

        let first = engine.enqueue(episode("A", "demo"), Arc::clone(&schemas)).await;
        let second = engine.enqueue(episode("B", "demo"), schemas).await;

        assert_eq!(first.position, 1);
        assert_eq!(second.position, 2);
    }

    #[allow(dead_code)]
    fn ensure_send_sync<T: Send + Sync>() {}
    #[allow(dead_code)]
    fn static_checks() {
        ensure_send_sync::<IngestionEngine>();
        let _ = AtomicBool::new(false);
    }
}
