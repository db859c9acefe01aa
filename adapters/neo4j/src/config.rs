//! Configuration for the Neo4j-backed graph store.

use serde::{Deserialize, Serialize};
use weftgraph_core::errors::GraphError;

/// Connection settings for the Neo4j graph backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    /// Connection URI, e.g. `bolt://localhost:7687`.
    pub uri: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub max_connections: usize,
    pub connection_timeout_ms: u64,
    /// `"development"` (or `"dev"`) permits the insecure default password;
    /// any other value refuses it at startup.
    pub environment: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: Some("neo4j".to_string()),
            password: Some("password".to_string()),
            max_connections: 10,
            connection_timeout_ms: 5000,
            environment: "production".to_string(),
        }
    }
}

impl Neo4jConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    fn is_dev_environment(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "dev" | "development")
    }

    /// Refuse to start with the well-known default password outside a
    /// development environment.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.password.as_deref() == Some("password") && !self.is_dev_environment() {
            return Err(GraphError::ConnectionFailed(
                "default Neo4j password 'password' is insecure and not allowed outside a development environment; set a strong password or environment=development".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_password_is_refused_outside_dev() {
        let config = Neo4jConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_password_is_allowed_in_dev() {
        let config = Neo4jConfig::default().with_environment("development");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_default_password_is_always_allowed() {
        let config = Neo4jConfig::default().with_auth("neo4j", "a-strong-password");
        assert!(config.validate().is_ok());
    }
}
