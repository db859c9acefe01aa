//! Tool-dispatch and session layer (C5) for the Weftgraph knowledge-graph
//! ingestion and query server: wires the schema registry, graph store, and
//! ingestion engine behind a [`ToolDispatcher`], then serves it over
//! whichever transport the resolved configuration names.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod guard;
pub mod pipeline;
pub mod protocol;
pub mod transport;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use weftgraph_core::errors::GraphError;
use weftgraph_core::schema_registry::{SchemaRegistry, SchemaSource};
use weftgraph_core::traits::{Extractor, GraphStore};
use weftgraph_ingestion::IngestionEngine;

pub use config::{ServerConfig, Transport};
pub use dispatcher::{DispatcherConfig, ToolDispatcher};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Configuration(#[from] weftgraph_core::errors::CoreError),

    #[error("graph store error: {0}")]
    GraphStore(#[from] GraphError),

    #[error("invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// Build the schema registry from the resolved configuration.
fn load_schema_registry(config: &ServerConfig) -> Result<SchemaRegistry, ServerError> {
    let sources: Vec<SchemaSource> = config
        .schema_sources
        .iter()
        .map(|s| SchemaSource::new(&s.directory, &s.selector))
        .collect();

    let root_dir = Path::new("schemas/root");
    SchemaRegistry::load(&sources, config.include_root_schemas, root_dir).map_err(ServerError::from)
}

/// Construct the graph store named by `config`, verifying connectivity and
/// building indices before returning it — a startup failure here is fatal,
/// matching the propagation policy for misconfiguration and unreachable
/// backends.
#[cfg(feature = "adapter-neo4j")]
async fn build_graph_store(config: &ServerConfig) -> Result<Arc<dyn GraphStore>, ServerError> {
    let neo4j_config = weftgraph_adapter_neo4j::config::Neo4jConfig {
        uri: config.graph_store.uri.clone(),
        user: Some(config.graph_store.user.clone()),
        password: Some(config.graph_store.password.clone()),
        environment: config.graph_store.environment.clone(),
        ..Default::default()
    };
    let store = weftgraph_adapter_neo4j::Neo4jStore::new(neo4j_config).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "adapter-neo4j"))]
async fn build_graph_store(config: &ServerConfig) -> Result<Arc<dyn GraphStore>, ServerError> {
    let _ = config;
    info!("adapter-neo4j feature disabled, falling back to the in-memory graph store");
    let store = weftgraph_adapter_memory::InMemoryStore::default();
    store.verify_connectivity().await?;
    Ok(Arc::new(store))
}

/// Construct the extractor named by `config.extractor.provider`.
fn build_extractor(config: &ServerConfig) -> Result<Arc<dyn Extractor>, ServerError> {
    match config.extractor.provider.as_str() {
        #[cfg(feature = "extractor-openai")]
        "openai" => {
            let mut cfg = weftgraph_extractor_openai::OpenAiConfig::new(&config.extractor.api_key);
            if let Some(model) = &config.extractor.model {
                cfg = cfg.with_model(model.clone());
            }
            if let Some(api_base) = &config.extractor.api_base {
                cfg = cfg.with_api_base(api_base.clone());
            }
            let extractor = weftgraph_extractor_openai::OpenAiExtractor::new(cfg)
                .map_err(|e| ServerError::Configuration(weftgraph_core::errors::CoreError::Configuration(e.to_string())))?;
            Ok(Arc::new(extractor))
        }
        #[cfg(feature = "extractor-anthropic")]
        "anthropic" => {
            let mut cfg = weftgraph_extractor_anthropic::AnthropicConfig::new(&config.extractor.api_key);
            if let Some(model) = &config.extractor.model {
                cfg = cfg.with_model(model.clone());
            }
            if let Some(api_base) = &config.extractor.api_base {
                cfg = cfg.with_api_base(api_base.clone());
            }
            let extractor = weftgraph_extractor_anthropic::AnthropicExtractor::new(cfg)
                .map_err(|e| ServerError::Configuration(weftgraph_core::errors::CoreError::Configuration(e.to_string())))?;
            Ok(Arc::new(extractor))
        }
        #[cfg(feature = "extractor-gemini")]
        "gemini" => {
            let mut cfg = weftgraph_extractor_gemini::GeminiConfig::new(&config.extractor.api_key);
            if let Some(model) = &config.extractor.model {
                cfg = cfg.with_model(model.clone());
            }
            if let Some(api_base) = &config.extractor.api_base {
                cfg = cfg.with_api_base(api_base.clone());
            }
            let extractor = weftgraph_extractor_gemini::GeminiExtractor::new(cfg)
                .map_err(|e| ServerError::Configuration(weftgraph_core::errors::CoreError::Configuration(e.to_string())))?;
            Ok(Arc::new(extractor))
        }
        other => Err(ServerError::Configuration(weftgraph_core::errors::CoreError::Configuration(
            format!("no extractor provider compiled in for \"{other}\" (check Cargo features)"),
        ))),
    }
}

/// Assemble C1-C4 behind a [`ToolDispatcher`] and serve the configured
/// transport until shutdown.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let schema_registry = load_schema_registry(&config)?;
    info!(schemas = schema_registry.len(), "schema registry loaded");

    let graph_store = build_graph_store(&config).await?;
    graph_store.build_indices_and_constraints().await?;

    let extractor = build_extractor(&config)?;
    let ingestion = IngestionEngine::new(Arc::clone(&graph_store), extractor);

    let dispatcher = Arc::new(ToolDispatcher::new(
        graph_store,
        ingestion,
        schema_registry,
        DispatcherConfig {
            default_namespace: config.default_namespace.clone(),
            root_namespace: config.root_namespace.clone(),
        },
    ));

    match config.transport {
        Transport::Sse => {
            let addr = config
                .bind_address
                .parse()
                .map_err(|_| ServerError::InvalidBindAddress(config.bind_address.clone()))?;
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received, draining in-flight requests");
            };
            transport::sse::serve(dispatcher, addr, shutdown).await?;
        }
        Transport::Stdio => {
            transport::stdio::serve(dispatcher).await?;
        }
    }

    Ok(())
}
