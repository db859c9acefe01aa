//! Command-line overrides for [`crate::config::ServerConfig`].

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "weftgraph-server")]
#[command(about = "Knowledge-graph ingestion and query server")]
#[command(version)]
pub struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Transport to serve: "sse" or "stdio".
    #[arg(long)]
    pub transport: Option<String>,

    /// Bind address for the `sse` transport.
    #[arg(long)]
    pub bind: Option<String>,

    /// Default namespace used when a tool call omits one.
    #[arg(long = "default-namespace")]
    pub default_namespace: Option<String>,

    /// Log level: debug, info, warn, error, fatal.
    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    /// Graph store connection URI, overriding the configured value.
    #[arg(long = "graph-uri")]
    pub graph_uri: Option<String>,

    /// LLM extractor API key, overriding the configured value.
    #[arg(long = "llm-api-key")]
    pub llm_api_key: Option<String>,
}
