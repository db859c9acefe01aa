//! Error types shared across the ingestion/query server.

use thiserror::Error;

/// Errors raised while loading or resolving extraction schemas.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("schema directory not found: {0}")]
    SchemaDirNotFound(String),

    #[error("failed to parse schema file {path}: {source}")]
    SchemaParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised by a [`crate::traits::GraphStore`] implementation.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("query execution failed: {0}")]
    QueryFailed(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("edge not found: {0}")]
    EdgeNotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("namespace isolation violation: {0}")]
    NamespaceIsolationViolation(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

/// Errors raised by a [`crate::traits::Extractor`] implementation.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("API error from extraction provider: {0}")]
    ApiError(String),

    #[error("timeout during extraction call")]
    Timeout,

    #[error("failed to parse extraction response: {0}")]
    ResponseParseError(String),

    #[error("extraction response referenced a field not declared by any requested schema: {0}")]
    SchemaValidationError(String),

    #[error("internal connector error: {0}")]
    InternalError(String),
}

/// The typed error contract every tool call converges to at the dispatcher
/// boundary, regardless of which component raised the underlying failure.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("server not initialized: {0}")]
    NotInitialized(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("invalid authentication: {0}")]
    AuthInvalid(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<GraphError> for ToolError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::NodeNotFound(msg) | GraphError::EdgeNotFound(msg) => {
                ToolError::NotFound(msg)
            }
            GraphError::ConnectionFailed(msg)
            | GraphError::DatabaseError(msg)
            | GraphError::Timeout(msg) => ToolError::BackendUnavailable(msg),
            GraphError::NamespaceIsolationViolation(msg) => ToolError::PermissionDenied(msg),
            GraphError::QueryFailed(msg) | GraphError::ConstraintViolation(msg) => {
                ToolError::Internal(msg)
            }
        }
    }
}

impl From<ExtractError> for ToolError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::NetworkError(msg) | ExtractError::ApiError(msg) => {
                ToolError::ExtractionFailed(msg)
            }
            ExtractError::Timeout => {
                ToolError::ExtractionFailed("extraction call timed out".to_string())
            }
            ExtractError::ResponseParseError(msg) | ExtractError::SchemaValidationError(msg) => {
                ToolError::ExtractionFailed(msg)
            }
            ExtractError::ConfigError(msg) | ExtractError::InternalError(msg) => {
                ToolError::Internal(msg)
            }
        }
    }
}

impl From<CoreError> for ToolError {
    fn from(e: CoreError) -> Self {
        ToolError::Internal(e.to_string())
    }
}

/// Result alias for schema-registry / config operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result alias for graph-store operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result alias for extractor operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Result alias for tool-dispatch operations.
pub type ToolResult<T> = Result<T, ToolError>;
