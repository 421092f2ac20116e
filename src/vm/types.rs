/*!
 * VM Types
 * Common types for sandboxing and scope interception
 */

use crate::core::types::{Map, Namespace};
use crate::vm::dom::{DomNode, NodeSnapshot};
use crate::vm::sandbox::Sandbox;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// VM operation result
///
/// # Must Use
/// Isolation-layer failures must change observable behavior, never be dropped
#[must_use = "vm operations can fail and must be handled"]
pub type VmResult<T> = Result<T, VmError>;

/// Unified VM error type
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum VmError {
    /// The host runtime cannot route global access through a supplied scope,
    /// or sandboxing was switched off. Fails the whole sandbox-open decision.
    #[error("sandboxing unavailable: {0}")]
    Unsupported(String),

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),

    #[error("sandbox '{0}' is not active")]
    Inactive(Namespace),

    #[error("script error in '{namespace}' ({}): {message}", .source_url.as_deref().unwrap_or("inline"))]
    Execution {
        namespace: Namespace,
        source_url: Option<String>,
        message: String,
    },
}

/// Dynamically computed identifier list (evaluated lazily at classification time)
pub type VarListProvider = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

/// Lazy accessor to the DOM subtree owned by an application
pub type RootProvider = Arc<dyn Fn() -> Arc<DomNode> + Send + Sync>;

/// Sink for resource URLs discovered through DOM interception
pub type SourceList = Arc<Mutex<Vec<String>>>;

/// Hook invoked before an intercepted append proceeds:
/// (sandbox, root element, inserted element, tag name, element before rewrite)
pub type AppendHook =
    Arc<dyn Fn(&Sandbox, &DomNode, &DomNode, &str, &NodeSnapshot) + Send + Sync>;

/// CommonJS-override seed supplied by the application instance,
/// parameterized on strict isolation
pub type EnvProvider = Arc<dyn Fn(bool) -> Map + Send + Sync>;

/// Per-sandbox construction options
#[derive(Clone)]
pub struct SandboxOptions {
    pub namespace: Namespace,
    /// Master enable switch; forced off by the manager when the runtime
    /// lacks scoped evaluation or legacy snapshot isolation is requested
    pub open: bool,
    pub strict_isolation: bool,
    /// Base used to resolve resource URLs injected by this application
    pub base_url: Option<String>,
    pub protect_variable: Vec<String>,
    pub protect_dynamic: Option<VarListProvider>,
    pub insulation_variable: Vec<String>,
    pub insulation_dynamic: Option<VarListProvider>,
    pub root: Option<RootProvider>,
    /// Optional host document head, wrapped alongside the root for code that
    /// targets document-level insertion
    pub head: Option<Arc<DomNode>>,
    pub source_list: Option<SourceList>,
    /// Override entries merged into every execution's module scope
    pub exec_env: Map,
    pub on_append_node: Option<AppendHook>,
}

impl SandboxOptions {
    pub fn new(namespace: impl Into<Namespace>) -> Self {
        Self {
            namespace: namespace.into(),
            open: true,
            strict_isolation: false,
            base_url: None,
            protect_variable: Vec::new(),
            protect_dynamic: None,
            insulation_variable: Vec::new(),
            insulation_dynamic: None,
            root: None,
            head: None,
            source_list: None,
            exec_env: Map::new(),
            on_append_node: None,
        }
    }

    pub fn with_protect(mut self, vars: Vec<String>) -> Self {
        self.protect_variable = vars;
        self
    }

    pub fn with_insulation(mut self, vars: Vec<String>) -> Self {
        self.insulation_variable = vars;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_root(mut self, provider: RootProvider) -> Self {
        self.root = Some(provider);
        self
    }

    pub fn with_source_list(mut self, list: SourceList) -> Self {
        self.source_list = Some(list);
        self
    }

    pub fn with_exec_env(mut self, env: Map) -> Self {
        self.exec_env = env;
        self
    }

    pub fn with_append_hook(mut self, hook: AppendHook) -> Self {
        self.on_append_node = Some(hook);
        self
    }

    pub fn with_strict_isolation(mut self, strict: bool) -> Self {
        self.strict_isolation = strict;
        self
    }
}

impl std::fmt::Debug for SandboxOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxOptions")
            .field("namespace", &self.namespace)
            .field("open", &self.open)
            .field("strict_isolation", &self.strict_isolation)
            .field("base_url", &self.base_url)
            .field("protect_variable", &self.protect_variable)
            .field("insulation_variable", &self.insulation_variable)
            .finish_non_exhaustive()
    }
}

/// Sandbox registry statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SandboxStats {
    pub total_sandboxes: usize,
    pub active_sandboxes: usize,
    pub recorded_keys: usize,
}
