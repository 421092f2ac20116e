/*!
 * Module Types
 * Requests, managers, and store-wide configuration
 */

use crate::core::types::{Map, Namespace, Value};
use crate::module::loader::ModuleLoader;
use crate::vm::types::VmError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Module operation result
///
/// # Must Use
/// Resolution failures must reach the requester, never be dropped
#[must_use = "module operations can fail and must be handled"]
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Unified module error type
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum ModuleError {
    /// Missing required `url` for a module request
    #[error("missing url for loading remote module")]
    MissingUrl,

    /// Network or parse failure while resolving a module; never cached,
    /// never poisons the store for other URLs
    #[error("failed to fetch module '{url}': {reason}")]
    Fetch { url: String, reason: String },

    #[error("module execution failed: {0}")]
    Execution(#[from] VmError),
}

/// One fetched, parsed module resource. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModuleManager {
    /// Canonical URL, post-redirect
    pub url: String,
    /// Pre-redirect or alias key this resource was requested under
    pub alias_url: Option<String>,
    pub code: String,
    pub version: Option<String>,
}

impl ModuleManager {
    pub fn new(url: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alias_url: None,
            code: code.into(),
            version: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias_url = Some(alias.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Hook observing a module failure; may supply fallback exports
pub type ErrorHook = Arc<dyn Fn(&ModuleError) -> Option<Value> + Send + Sync>;

/// Hook adapting a module's exports before they are handed back
pub type AdapterHook = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Remote module request. A bare URL string is shorthand for a request
/// with every other field left to the store defaults.
#[derive(Clone, Default)]
pub struct ModuleRequest {
    pub url: String,
    pub cache: Option<bool>,
    pub version: Option<String>,
    pub env: Option<Map>,
    pub error: Option<ErrorHook>,
    pub adapter: Option<AdapterHook>,
}

impl ModuleRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_env(mut self, env: Map) -> Self {
        self.env = Some(env);
        self
    }

    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.error = Some(hook);
        self
    }

    pub fn with_adapter(mut self, hook: AdapterHook) -> Self {
        self.adapter = Some(hook);
        self
    }
}

impl From<&str> for ModuleRequest {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for ModuleRequest {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl std::fmt::Debug for ModuleRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRequest")
            .field("url", &self.url)
            .field("cache", &self.cache)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// A request with store defaults already merged in, caller values winning
/// field by field
#[derive(Clone)]
pub struct ResolvedRequest {
    pub url: String,
    pub cache: bool,
    pub version: Option<String>,
    pub env: Map,
    pub error: Option<ErrorHook>,
    pub adapter: Option<AdapterHook>,
}

impl std::fmt::Debug for ResolvedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedRequest")
            .field("url", &self.url)
            .field("cache", &self.cache)
            .field("version", &self.version)
            .field("env", &self.env.len())
            .finish_non_exhaustive()
    }
}

/// Store-wide default configuration, read by every module load
#[derive(Clone, Default)]
pub struct ModuleConfig {
    /// Environment entries injected into every module execution
    pub env: Map,
    /// Short name -> canonical URL
    pub alias: HashMap<String, String>,
    /// Default cache policy (`true` unless configured otherwise)
    pub cache: Option<bool>,
    pub error: Option<ErrorHook>,
    pub adapter: Option<AdapterHook>,
}

impl ModuleConfig {
    /// Normalize a caller request against these defaults.
    ///
    /// A single deterministic field-by-field merge: the caller's value
    /// wins per field, `env` merges key by key. A missing or empty URL
    /// fails fast.
    pub fn purify(&self, request: impl Into<ModuleRequest>) -> ModuleResult<ResolvedRequest> {
        let request = request.into();
        if request.url.is_empty() {
            return Err(ModuleError::MissingUrl);
        }
        let env = match &request.env {
            Some(overrides) => crate::core::types::merge_map(&self.env, overrides),
            None => self.env.clone(),
        };
        Ok(ResolvedRequest {
            url: request.url,
            cache: request.cache.or(self.cache).unwrap_or(true),
            version: request.version,
            env,
            error: request.error.or_else(|| self.error.clone()),
            adapter: request.adapter.or_else(|| self.adapter.clone()),
        })
    }
}

impl std::fmt::Debug for ModuleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleConfig")
            .field("env", &self.env.len())
            .field("alias", &self.alias)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Snapshot of already-fetched module state handed over by the embedding
/// host at process start
#[derive(Clone, Default)]
pub struct HostEnvSnapshot {
    /// Externals inherited into the default module env
    pub externals: Map,
    /// Pre-fetched module code seeding the resource store
    pub remote_modules_code: Vec<ModuleManager>,
    /// Host loader candidate for shared-instance negotiation
    pub loader: Option<Arc<dyn ModuleLoader>>,
    /// Application a host-driven load should be attributed to
    pub current_app: Option<Namespace>,
}
