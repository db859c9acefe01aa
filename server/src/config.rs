//! Process-level configuration: graph-store connection, LLM extractor
//! selection, namespace defaults, schema sources, and transport — loaded
//! from an optional YAML file, overlaid with `WEFTGRAPH_`-prefixed
//! environment variables, then overridden by CLI flags.

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use weftgraph_core::errors::CoreError;

use crate::cli::Cli;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Sse,
    Stdio,
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sse" => Ok(Transport::Sse),
            "stdio" => Ok(Transport::Stdio),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStoreSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    /// "development" permits the fixed default password; anything else
    /// refuses to start with it configured.
    pub environment: String,
}

impl Default for GraphStoreSettings {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            environment: "development".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorSettings {
    /// One of "openai", "anthropic", "gemini".
    pub provider: String,
    pub api_key: String,
    pub api_base: Option<String>,
    pub model: Option<String>,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: String::new(),
            api_base: None,
            model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSourceSettings {
    pub directory: String,
    /// Empty means "load the whole tree"; otherwise a comma-separated list
    /// of immediate subdirectory names.
    #[serde(default)]
    pub selector: String,
}

/// The shape actually (de)serialized from YAML/env — `default_namespace` is
/// optional here; [`ServerConfig::load`] mints one when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawServerConfig {
    #[serde(default)]
    graph_store: GraphStoreSettings,
    #[serde(default)]
    extractor: ExtractorSettings,
    #[serde(default)]
    default_namespace: Option<String>,
    #[serde(default = "default_root_namespace")]
    root_namespace: String,
    #[serde(default)]
    schema_sources: Vec<SchemaSourceSettings>,
    #[serde(default)]
    include_root_schemas: bool,
    #[serde(default = "default_transport")]
    transport: Transport,
    #[serde(default = "default_bind_address")]
    bind_address: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

fn default_root_namespace() -> String {
    "root".to_string()
}

fn default_transport() -> Transport {
    Transport::Sse
}

fn default_bind_address() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RawServerConfig {
    fn default() -> Self {
        Self {
            graph_store: GraphStoreSettings::default(),
            extractor: ExtractorSettings::default(),
            default_namespace: None,
            root_namespace: default_root_namespace(),
            schema_sources: Vec::new(),
            include_root_schemas: true,
            transport: default_transport(),
            bind_address: default_bind_address(),
            log_level: default_log_level(),
        }
    }
}

/// The fully resolved process configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub graph_store: GraphStoreSettings,
    pub extractor: ExtractorSettings,
    pub default_namespace: String,
    pub root_namespace: String,
    pub schema_sources: Vec<SchemaSourceSettings>,
    pub include_root_schemas: bool,
    pub transport: Transport,
    pub bind_address: String,
    pub log_level: String,
}

impl ServerConfig {
    /// Merge an optional YAML config file with `WEFTGRAPH_`-prefixed
    /// environment variables, then apply CLI overrides, then mint a
    /// default namespace if none was configured anywhere.
    pub fn load(config_path: &Option<PathBuf>, cli: &Cli) -> Result<Self, CoreError> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(
            RawServerConfig::default(),
        ));

        let default_paths = ["weftgraph.yaml", "weftgraph.yml", ".weftgraph.yaml"];
        for path in &default_paths {
            if std::path::Path::new(path).exists() {
                figment = figment.merge(Yaml::file(path));
                break;
            }
        }

        if let Some(path) = config_path {
            if path.exists() {
                figment = figment.merge(Yaml::file(path));
            } else {
                return Err(CoreError::Configuration(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
        }

        figment = figment.merge(Env::prefixed("WEFTGRAPH_").split("__"));

        let raw: RawServerConfig = figment
            .extract()
            .map_err(|e| CoreError::Configuration(format!("failed to parse configuration: {e}")))?;

        let mut config = Self {
            graph_store: raw.graph_store,
            extractor: raw.extractor,
            default_namespace: raw.default_namespace.unwrap_or_else(|| {
                format!("ns-{}", uuid::Uuid::new_v4().simple())
            }),
            root_namespace: raw.root_namespace,
            schema_sources: raw.schema_sources,
            include_root_schemas: raw.include_root_schemas,
            transport: raw.transport,
            bind_address: raw.bind_address,
            log_level: raw.log_level,
        };

        config.apply_cli_overrides(cli)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) -> Result<(), CoreError> {
        if let Some(ref transport) = cli.transport {
            self.transport = transport
                .parse()
                .map_err(CoreError::Configuration)?;
        }
        if let Some(ref bind) = cli.bind {
            self.bind_address = bind.clone();
        }
        if let Some(ref namespace) = cli.default_namespace {
            self.default_namespace = namespace.clone();
        }
        if let Some(ref level) = cli.log_level {
            self.log_level = level.clone();
        }
        if let Some(ref uri) = cli.graph_uri {
            self.graph_store.uri = uri.clone();
        }
        if let Some(ref key) = cli.llm_api_key {
            self.extractor.api_key = key.clone();
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), CoreError> {
        let insecure_default_password = self.graph_store.password == "password";
        if insecure_default_password && self.graph_store.environment != "development" {
            return Err(CoreError::Configuration(
                "refusing to start with the default graph-store password outside a development environment"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn bare_cli() -> Cli {
        Cli::parse_from(["weftgraph-server"])
    }

    #[test]
    fn defaults_mint_a_random_namespace_when_absent() {
        let config = ServerConfig::load(&None, &bare_cli()).unwrap();
        assert!(config.default_namespace.starts_with("ns-"));
        assert_eq!(config.root_namespace, "root");
    }

    #[test]
    fn rejects_default_password_outside_development() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "graph_store:\n  environment: production\n").unwrap();

        let err = ServerConfig::load(&Some(temp_file.path().to_path_buf()), &bare_cli()).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn cli_override_wins_over_file_and_default() {
        let cli = Cli::parse_from(["weftgraph-server", "--default-namespace", "from-cli"]);
        let config = ServerConfig::load(&None, &cli).unwrap();
        assert_eq!(config.default_namespace, "from-cli");
    }
}
