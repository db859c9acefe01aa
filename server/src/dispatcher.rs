//! Routes validated JSON-RPC tool calls to the schema registry, graph
//! store, and ingestion engine, returning the typed success/error shapes
//! of each tool.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use weftgraph_core::errors::{GraphError, ToolError};
use weftgraph_core::schema_registry::SchemaRegistry;
use weftgraph_core::traits::{GraphStore, RequestContext};
use weftgraph_core::types::{Episode, FactRecord, Namespace, NodeRecord};
use weftgraph_ingestion::IngestionEngine;

use crate::guard::ClearGuard;
use crate::pipeline::{
    AuditTrailPlugin, ClearGuardPlugin, NamespaceValidationPlugin, PipelineRunner, PipelineStage,
    RequestLoggingPlugin,
};
use crate::protocol::{
    AddEpisodeArgs, AddEpisodeResult, ClearGraphArgs, GetEntityEdgeArgs, GetEpisodesArgs,
    MessageResult, SearchFactsArgs, SearchFactsResult, SearchNodesArgs, SearchNodesResult,
    StatusResult, UuidArgs,
};

/// Everything a [`ToolDispatcher`] needs at construction time.
pub struct DispatcherConfig {
    pub default_namespace: String,
    pub root_namespace: String,
}

/// The tool-dispatch core (C5): owns the schema registry, graph store, and
/// ingestion engine handles, plus the destructive-operation token, and
/// routes each named tool call to them.
pub struct ToolDispatcher {
    graph_store: Arc<dyn GraphStore>,
    ingestion: Arc<IngestionEngine>,
    schema_registry: SchemaRegistry,
    pipeline: PipelineRunner,
    clear_guard: Arc<ClearGuard>,
    default_namespace: String,
    root_namespace: String,
}

impl ToolDispatcher {
    pub fn new(
        graph_store: Arc<dyn GraphStore>,
        ingestion: Arc<IngestionEngine>,
        schema_registry: SchemaRegistry,
        config: DispatcherConfig,
    ) -> Self {
        let clear_guard = Arc::new(ClearGuard::new());

        let mut pipeline = PipelineRunner::new();
        pipeline.register(PipelineStage::PreOperation, Arc::new(RequestLoggingPlugin));
        pipeline.register(PipelineStage::PreOperation, Arc::new(NamespaceValidationPlugin));
        pipeline.register(
            PipelineStage::PreOperation,
            Arc::new(ClearGuardPlugin::new(
                Arc::clone(&clear_guard),
                config.default_namespace.clone(),
                config.root_namespace.clone(),
            )),
        );
        pipeline.register(PipelineStage::PostOperation, Arc::new(AuditTrailPlugin));

        Self {
            graph_store,
            ingestion,
            schema_registry,
            pipeline,
            clear_guard,
            default_namespace: config.default_namespace,
            root_namespace: config.root_namespace,
        }
    }

    /// Dispatch one named tool call with its raw JSON input, returning the
    /// tool's success payload as a `Value` or a typed [`ToolError`].
    pub async fn dispatch(&self, name: &str, input: Value) -> Result<Value, ToolError> {
        let namespace = extract_namespace(&input).unwrap_or_else(|| self.default_namespace.clone());
        let mut ctx = RequestContext::new(name.to_string(), input.clone());
        ctx.namespace = Some(namespace);

        self.pipeline.run_stage(PipelineStage::PreOperation, &mut ctx).await;
        if let Some(message) = ctx.error.clone() {
            let kind = ctx
                .get_attribute("tool_error_kind")
                .and_then(|v| v.as_str())
                .unwrap_or("internal");
            return Err(tool_error_from_kind(kind, message));
        }

        let result = self.run_tool(name, input, &ctx).await;

        ctx.error = result.as_ref().err().map(|e| e.to_string());
        self.pipeline.run_stage(PipelineStage::PostOperation, &mut ctx).await;

        result
    }

    async fn run_tool(
        &self,
        name: &str,
        input: Value,
        ctx: &RequestContext,
    ) -> Result<Value, ToolError> {
        match name {
            "add_episode" => self.add_episode(parse_args(input)?).await,
            "search_nodes" => self.search_nodes(parse_args(input)?).await,
            "search_facts" => self.search_facts(parse_args(input)?).await,
            "get_entity_edge" => self.get_entity_edge(parse_args(input)?).await,
            "get_episodes" => self.get_episodes(parse_args(input)?).await,
            "delete_entity_edge" => self.delete_entity_edge(parse_args(input)?).await,
            "delete_episode" => self.delete_episode(parse_args(input)?).await,
            "clear_graph" => self.clear_graph(parse_args(input)?, ctx).await,
            "status" => self.status().await,
            other => Err(ToolError::InvalidArgument(format!("unknown tool: {other}"))),
        }
    }

    fn resolve_namespace(&self, namespace: Option<String>) -> String {
        namespace.unwrap_or_else(|| self.default_namespace.clone())
    }

    fn resolve_namespaces(&self, namespaces: Option<Vec<String>>) -> Vec<String> {
        namespaces.unwrap_or_else(|| vec![self.default_namespace.clone()])
    }

    async fn add_episode(&self, args: AddEpisodeArgs) -> Result<Value, ToolError> {
        let format = args.parsed_format()?;
        let namespace = self.resolve_namespace(args.namespace);

        let episode = Episode::from_request(
            args.name,
            args.body,
            format,
            Namespace::new(namespace),
            args.source_description.unwrap_or_default(),
            args.uuid,
        );

        let schemas = self.schema_registry.all();
        let ack = self.ingestion.enqueue(episode, schemas).await;

        Ok(serde_json::to_value(AddEpisodeResult {
            queued: true,
            position: ack.position,
        })
        .expect("AddEpisodeResult always serializes"))
    }

    async fn search_nodes(&self, args: SearchNodesArgs) -> Result<Value, ToolError> {
        let namespaces = self.resolve_namespaces(args.namespaces);
        let nodes = self
            .graph_store
            .search_nodes(
                &namespaces,
                &args.query,
                args.limit,
                args.center_uuid,
                args.label_filter.as_deref(),
            )
            .await?;

        let message = format!("found {} node(s)", nodes.len());
        Ok(serde_json::to_value(SearchNodesResult {
            message,
            nodes: nodes.into_iter().map(NodeRecord::from).collect(),
        })
        .expect("SearchNodesResult always serializes"))
    }

    async fn search_facts(&self, args: SearchFactsArgs) -> Result<Value, ToolError> {
        let namespaces = self.resolve_namespaces(args.namespaces);
        let facts = self
            .graph_store
            .search_facts(&namespaces, &args.query, args.limit, args.center_uuid)
            .await?;

        let message = format!("found {} fact(s)", facts.len());
        Ok(serde_json::to_value(SearchFactsResult {
            message,
            facts: facts.into_iter().map(FactRecord::from).collect(),
        })
        .expect("SearchFactsResult always serializes"))
    }

    async fn get_entity_edge(&self, args: GetEntityEdgeArgs) -> Result<Value, ToolError> {
        match self.graph_store.get_entity_edge(args.uuid).await? {
            Some(edge) => Ok(serde_json::to_value(FactRecord::from(edge))
                .expect("FactRecord always serializes")),
            None => Err(ToolError::NotFound(format!("no fact edge with uuid {}", args.uuid))),
        }
    }

    async fn get_episodes(&self, args: GetEpisodesArgs) -> Result<Value, ToolError> {
        let namespace = self.resolve_namespace(args.namespace);
        let episodes = self.graph_store.get_episodes(&namespace, args.last_n).await?;
        Ok(serde_json::to_value(episodes).expect("episode list always serializes"))
    }

    async fn delete_entity_edge(&self, args: UuidArgs) -> Result<Value, ToolError> {
        let deleted = self.graph_store.delete_entity_edge(args.uuid).await?;
        let message = if deleted {
            format!("deleted fact edge {}", args.uuid)
        } else {
            format!("no fact edge with uuid {} (already deleted)", args.uuid)
        };
        Ok(serde_json::to_value(MessageResult { message }).expect("MessageResult always serializes"))
    }

    async fn delete_episode(&self, args: UuidArgs) -> Result<Value, ToolError> {
        let deleted = self.graph_store.delete_episode(args.uuid).await?;
        let message = if deleted {
            format!("deleted episode {}", args.uuid)
        } else {
            format!("no episode with uuid {} (already deleted)", args.uuid)
        };
        Ok(serde_json::to_value(MessageResult { message }).expect("MessageResult always serializes"))
    }

    async fn clear_graph(&self, _args: ClearGraphArgs, ctx: &RequestContext) -> Result<Value, ToolError> {
        // By the time we get here the pre-operation pipeline has already
        // enforced root-namespace scoping and the two-step auth handshake;
        // reaching this point means the call was authorized.
        debug_assert_eq!(ctx.get_attribute("clear_authorized").and_then(|v| v.as_bool()), Some(true));

        self.graph_store.clear(&self.root_namespace).await?;
        self.graph_store.build_indices_and_constraints().await?;
        self.clear_guard.rotate().await;

        Ok(serde_json::to_value(MessageResult {
            message: "graph cleared successfully and indices rebuilt".to_string(),
        })
        .expect("MessageResult always serializes"))
    }

    async fn status(&self) -> Result<Value, ToolError> {
        let (status, message) = match self.graph_store.verify_connectivity().await {
            Ok(()) => ("ok".to_string(), "graph store is reachable".to_string()),
            Err(GraphError::ConnectionFailed(msg) | GraphError::Timeout(msg)) => {
                ("error".to_string(), format!("graph store unreachable: {msg}"))
            }
            Err(err) => ("error".to_string(), format!("graph store check failed: {err}")),
        };

        Ok(serde_json::to_value(StatusResult { status, message }).expect("StatusResult always serializes"))
    }
}

fn parse_args<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidArgument(e.to_string()))
}

fn extract_namespace(input: &Value) -> Option<String> {
    input.get("namespace")?.as_str().map(str::to_string)
}

fn tool_error_from_kind(kind: &str, message: String) -> ToolError {
    match kind {
        "permission_denied" => ToolError::PermissionDenied(message),
        "auth_required" => ToolError::AuthRequired(message),
        "auth_invalid" => ToolError::AuthInvalid(message),
        "invalid_argument" => ToolError::InvalidArgument(message),
        _ => ToolError::Internal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use uuid::Uuid;
    use weftgraph_core::errors::ExtractError;
    use weftgraph_core::traits::{ExtractionResult, Extractor};
    use weftgraph_core::types::ExtractionSchema;

    struct NoopExtractor;

    #[async_trait]
    impl Extractor for NoopExtractor {
        async fn extract(
            &self,
            _episode: &Episode,
            _schemas: &HashMap<String, ExtractionSchema>,
        ) -> Result<ExtractionResult, ExtractError> {
            Ok(ExtractionResult::default())
        }
    }

    fn dispatcher(default_namespace: &str, root_namespace: &str) -> ToolDispatcher {
        let graph_store: Arc<dyn GraphStore> = Arc::new(weftgraph_adapter_memory::InMemoryStore::default());
        let ingestion = IngestionEngine::new(graph_store.clone(), Arc::new(NoopExtractor));
        let schema_registry = SchemaRegistry::empty();
        ToolDispatcher::new(
            graph_store,
            ingestion,
            schema_registry,
            DispatcherConfig {
                default_namespace: default_namespace.to_string(),
                root_namespace: root_namespace.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn add_episode_uses_default_namespace_and_returns_position() {
        let dispatcher = dispatcher("demo", "root");
        let input = serde_json::json!({
            "name": "E1",
            "body": "Alice met Bob.",
            "format": "text",
        });

        let result = dispatcher.dispatch("add_episode", input).await.unwrap();
        assert_eq!(result["queued"], serde_json::json!(true));
        assert_eq!(result["position"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn clear_graph_denied_outside_root_namespace() {
        let dispatcher = dispatcher("demo", "root");
        let err = dispatcher
            .dispatch("clear_graph", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn clear_graph_denied_even_with_explicit_root_namespace_argument() {
        // clear_graph takes no namespace argument; a caller passing one
        // must not be able to spoof the root-namespace gate with it.
        let dispatcher = dispatcher("demo", "root");
        let err = dispatcher
            .dispatch("clear_graph", serde_json::json!({"namespace": "root"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn clear_graph_two_step_handshake() {
        let dispatcher = dispatcher("root", "root");

        let first = dispatcher
            .dispatch("clear_graph", serde_json::json!({}))
            .await
            .unwrap_err();
        let code = match first {
            ToolError::AuthRequired(msg) => extract_code(&msg),
            other => panic!("expected AuthRequired, got {other:?}"),
        };

        let wrong = dispatcher
            .dispatch("clear_graph", serde_json::json!({"auth": "nope"}))
            .await
            .unwrap_err();
        let new_code = match wrong {
            ToolError::AuthInvalid(msg) => extract_code(&msg),
            other => panic!("expected AuthInvalid, got {other:?}"),
        };
        assert_ne!(code, new_code);

        let auth = format!("{new_code}_DELETE_THIS_GRAPH");
        let ok = dispatcher
            .dispatch("clear_graph", serde_json::json!({"auth": auth}))
            .await
            .unwrap();
        assert!(ok["message"].as_str().unwrap().contains("cleared"));
    }

    fn extract_code(message: &str) -> String {
        let marker = "auth = '";
        let start = message.find(marker).unwrap() + marker.len();
        let rest = &message[start..];
        rest.split("_DELETE_THIS_GRAPH").next().unwrap().to_string()
    }

    #[tokio::test]
    async fn get_entity_edge_not_found_returns_typed_error() {
        let dispatcher = dispatcher("demo", "root");
        let err = dispatcher
            .dispatch("get_entity_edge", serde_json::json!({"uuid": Uuid::new_v4()}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_entity_edge_is_idempotent() {
        let dispatcher = dispatcher("demo", "root");
        let result = dispatcher
            .dispatch("delete_entity_edge", serde_json::json!({"uuid": Uuid::new_v4()}))
            .await
            .unwrap();
        assert!(result["message"].as_str().unwrap().contains("already deleted"));
    }

    #[tokio::test]
    async fn status_reports_ok_for_in_memory_store() {
        let dispatcher = dispatcher("demo", "root");
        let result = dispatcher.dispatch("status", serde_json::json!({})).await.unwrap();
        assert_eq!(result["status"], serde_json::json!("ok"));
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_argument() {
        let dispatcher = dispatcher("demo", "root");
        let err = dispatcher.dispatch("not_a_tool", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));
    }

}
