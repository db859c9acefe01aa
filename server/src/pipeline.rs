//! Pre/post-operation plugin pipeline wrapped around every tool call.
//!
//! Generalizes the request/response middleware pattern down to this
//! crate's single `RequestContext` shape: a tool name, a resolved
//! namespace, and a JSON arguments blob, rather than an HTTP method/path/
//! tenant triple. Plugins never talk to the graph store or extractor
//! directly — they only inspect/annotate the context and may halt before
//! the tool's operation stage runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use weftgraph_core::traits::{PipelinePlugin, PluginOutcome, RequestContext};

use crate::guard::{ClearGuard, GuardOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    PreOperation,
    PostOperation,
}

/// Runs registered plugins for a stage in registration order, short-
/// circuiting on the first `Halt`/`HaltWithError`.
pub struct PipelineRunner {
    plugins: HashMap<PipelineStage, Vec<Arc<dyn PipelinePlugin>>>,
}

impl PipelineRunner {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    pub fn register(&mut self, stage: PipelineStage, plugin: Arc<dyn PipelinePlugin>) {
        self.plugins.entry(stage).or_default().push(plugin);
    }

    /// Runs a stage's plugins against `ctx`, mutating it in place. Returns
    /// once a plugin halts or every plugin has run.
    pub async fn run_stage(&self, stage: PipelineStage, ctx: &mut RequestContext) {
        let Some(plugins) = self.plugins.get(&stage) else {
            return;
        };

        for plugin in plugins {
            match plugin.call(ctx).await {
                PluginOutcome::Continue => continue,
                PluginOutcome::Halt => {
                    debug!(plugin = plugin.name(), tool = %ctx.tool, "pipeline halted");
                    break;
                }
                PluginOutcome::HaltWithError(err) => {
                    warn!(plugin = plugin.name(), tool = %ctx.tool, error = %err, "pipeline halted with error");
                    ctx.error = Some(err.to_string());
                    break;
                }
            }
        }
    }
}

impl Default for PipelineRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs the start of every tool call.
pub struct RequestLoggingPlugin;

#[async_trait]
impl PipelinePlugin for RequestLoggingPlugin {
    fn name(&self) -> &'static str {
        "request-logging"
    }

    async fn call(&self, ctx: &mut RequestContext) -> PluginOutcome {
        debug!(tool = %ctx.tool, namespace = ?ctx.namespace, request_id = %ctx.request_id, "tool call received");
        PluginOutcome::Continue
    }
}

/// Logs completion and elapsed time of every tool call, post-operation.
pub struct AuditTrailPlugin;

#[async_trait]
impl PipelinePlugin for AuditTrailPlugin {
    fn name(&self) -> &'static str {
        "audit-trail"
    }

    async fn call(&self, ctx: &mut RequestContext) -> PluginOutcome {
        info!(
            tool = %ctx.tool,
            namespace = ?ctx.namespace,
            request_id = %ctx.request_id,
            elapsed_ms = ctx.elapsed().as_millis(),
            failed = ctx.error.is_some(),
            "tool call completed"
        );
        PluginOutcome::Continue
    }
}

/// Rejects any tool call whose resolved namespace is an empty string. The
/// dispatcher has already substituted the default namespace by the time
/// this plugin runs, so an empty value here means the caller explicitly
/// passed one.
pub struct NamespaceValidationPlugin;

#[async_trait]
impl PipelinePlugin for NamespaceValidationPlugin {
    fn name(&self) -> &'static str {
        "namespace-validation"
    }

    async fn call(&self, ctx: &mut RequestContext) -> PluginOutcome {
        if let Some(namespace) = &ctx.namespace {
            if namespace.trim().is_empty() {
                warn!(tool = %ctx.tool, "rejecting tool call with empty namespace");
                ctx.error = Some("namespace must not be empty".to_string());
                ctx.set_attribute("tool_error_kind", serde_json::json!("invalid_argument"));
                return PluginOutcome::Halt;
            }
        }
        PluginOutcome::Continue
    }
}

/// Enforces the two-step `clear_graph` authorization handshake as a
/// pre-operation check. A no-op for every other tool.
///
/// Root scoping is gated on the server's *configured* default namespace,
/// never on the per-call `ctx.namespace` — `clear_graph` takes no namespace
/// argument, so a value there only ever reflects a caller-supplied
/// `namespace` field a client could set to anything, including `"root"`.
pub struct ClearGuardPlugin {
    guard: Arc<ClearGuard>,
    default_namespace: String,
    root_namespace: String,
}

impl ClearGuardPlugin {
    pub fn new(guard: Arc<ClearGuard>, default_namespace: String, root_namespace: String) -> Self {
        Self {
            guard,
            default_namespace,
            root_namespace,
        }
    }
}

#[async_trait]
impl PipelinePlugin for ClearGuardPlugin {
    fn name(&self) -> &'static str {
        "clear-guard"
    }

    async fn call(&self, ctx: &mut RequestContext) -> PluginOutcome {
        if ctx.tool != "clear_graph" {
            return PluginOutcome::Continue;
        }

        if self.default_namespace != self.root_namespace {
            warn!(
                default_namespace = %self.default_namespace,
                root = %self.root_namespace,
                "clear_graph refused: server's configured default namespace is not the root namespace"
            );
            ctx.error = Some(format!(
                "clear_graph is restricted to servers whose default namespace is the root namespace '{}'",
                self.root_namespace
            ));
            ctx.set_attribute("tool_error_kind", serde_json::json!("permission_denied"));
            return PluginOutcome::Halt;
        }

        let auth = ctx.arguments.get("auth").and_then(|v| v.as_str());

        match self.guard.check(auth).await {
            GuardOutcome::CodeIssued(code) => {
                ctx.error = Some(format!(
                    "authentication required: re-call with auth = '{code}_DELETE_THIS_GRAPH' after user confirmation"
                ));
                ctx.set_attribute("tool_error_kind", serde_json::json!("auth_required"));
                PluginOutcome::Halt
            }
            GuardOutcome::Rejected(code) => {
                ctx.error = Some(format!(
                    "invalid authentication: a new code has been issued; re-call with auth = '{code}_DELETE_THIS_GRAPH'"
                ));
                ctx.set_attribute("tool_error_kind", serde_json::json!("auth_invalid"));
                PluginOutcome::Halt
            }
            GuardOutcome::Authorized => {
                ctx.set_attribute("clear_authorized", serde_json::json!(true));
                PluginOutcome::Continue
            }
        }
    }
}
