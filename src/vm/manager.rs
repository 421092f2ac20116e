/*!
 * Sandbox Manager
 * Namespace registry, lifecycle, and the application-attach boundary
 */

use crate::core::types::{Map, Namespace, Value};
use crate::vm::exec::ExecOptions;
use crate::vm::runtime::ScriptRuntime;
use crate::vm::sandbox::Sandbox;
use crate::vm::scope::{GlobalScope, VirtualScope};
use crate::vm::types::{
    EnvProvider, RootProvider, SandboxOptions, SandboxStats, SourceList, VmError, VmResult,
};
use dashmap::DashMap;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host-runtime artifacts insulated in every sandbox, so bundler and
/// error-overlay state never leaks across applications
pub fn default_insulated() -> Vec<String> {
    vec![
        "onerror".to_string(),
        "webpackjsonp".to_string(),
        "__REACT_ERROR_OVERLAY_GLOBAL_HOOK__".to_string(),
    ]
}

/// Recognized sandbox configuration surface
#[derive(Clone)]
pub struct VmConfig {
    /// Master enable switch
    pub open: bool,
    /// Legacy snapshot isolation requested; incompatible with scope
    /// interception, forces the switch off
    pub snapshot: bool,
    /// Identifiers always shared with the real global
    pub protect_variable: Vec<String>,
    /// Identifiers always kept private
    pub insulation_variable: Vec<String>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            open: true,
            snapshot: false,
            protect_variable: Vec::new(),
            insulation_variable: Vec::new(),
        }
    }
}

/// Application descriptor consumed from the lifecycle manager
#[derive(Clone)]
pub struct AppDescriptor {
    pub name: Namespace,
    /// Lazy accessor to the application's DOM subtree
    pub html_node: RootProvider,
    pub strict_isolation: bool,
    pub base_url: Option<String>,
    /// CommonJS-override seed, parameterized on strict isolation
    pub exec_env: Option<EnvProvider>,
    /// Sink for resource URLs discovered by the DOM interceptor
    pub source_list: SourceList,
}

/// Handle exposed back to the lifecycle manager for one attached app
#[derive(Clone)]
pub struct AppBinding {
    sandbox: Arc<Sandbox>,
}

impl AppBinding {
    /// The created sandbox (`vmSandbox`)
    pub fn sandbox(&self) -> &Arc<Sandbox> {
        &self.sandbox
    }

    /// Alias for the sandbox's virtual context (`global`)
    pub fn global(&self) -> Arc<VirtualScope> {
        self.sandbox.context()
    }

    pub fn exec_script(
        &self,
        code: &str,
        env: Option<&Map>,
        source_url: Option<&str>,
        options: &ExecOptions,
    ) -> VmResult<Value> {
        self.sandbox.exec_script(code, env, source_url, options)
    }
}

/// Registry of sandboxes, one per namespace.
///
/// Re-attaching a namespace reuses the existing sandbox so the virtual
/// context's identity survives deactivation cycles.
pub struct SandboxManager {
    sandboxes: Arc<DashMap<Namespace, Arc<Sandbox>>>,
    real: Arc<dyn GlobalScope>,
    runtime: Arc<dyn ScriptRuntime>,
    config: VmConfig,
    /// Resolved once: configuration switch plus runtime capability
    open: bool,
    capability_reported: AtomicBool,
}

impl SandboxManager {
    pub fn new(real: Arc<dyn GlobalScope>, runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self::with_config(real, runtime, VmConfig::default())
    }

    pub fn with_config(
        real: Arc<dyn GlobalScope>,
        runtime: Arc<dyn ScriptRuntime>,
        config: VmConfig,
    ) -> Self {
        // The open switch is forced off when the runtime lacks the
        // interception capability or legacy snapshot isolation was asked for
        let open = config.open && !config.snapshot && runtime.supports_scoped_eval();
        info!(
            "Sandbox manager initialized (open: {}, protected: {}, insulated: {})",
            open,
            config.protect_variable.len(),
            config.insulation_variable.len()
        );
        Self {
            sandboxes: Arc::new(DashMap::new()),
            real,
            runtime,
            config,
            open,
            capability_reported: AtomicBool::new(false),
        }
    }

    /// Whether sandboxing is available at all
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Get the existing sandbox for a namespace or create one.
    ///
    /// At most one sandbox exists per namespace; an existing one is
    /// reactivated and returned with its context identity intact.
    pub fn get_or_create(&self, mut options: SandboxOptions) -> VmResult<Arc<Sandbox>> {
        if !self.open {
            return Err(self.report_closed(&options.namespace));
        }
        if let Some(existing) = self.sandboxes.get(&options.namespace) {
            let sandbox = Arc::clone(&existing);
            drop(existing);
            if !sandbox.is_active() {
                sandbox.activate();
            }
            return Ok(sandbox);
        }

        // Manager-level lists and default insulated artifacts are merged
        // beneath the per-sandbox lists
        options
            .protect_variable
            .extend(self.config.protect_variable.iter().cloned());
        options
            .insulation_variable
            .extend(self.config.insulation_variable.iter().cloned());
        options
            .insulation_variable
            .extend(default_insulated());
        if options.insulation_dynamic.is_none() {
            // Bundler hot-update state is only an artifact of dev builds
            options.insulation_dynamic = Some(Arc::new(|| {
                if cfg!(debug_assertions) {
                    vec!["webpackHotUpdate".to_string()]
                } else {
                    vec![]
                }
            }));
        }

        let sandbox = Sandbox::create(
            options,
            Arc::clone(&self.real),
            Arc::clone(&self.runtime),
        )?;
        self.sandboxes
            .insert(sandbox.namespace().to_string(), Arc::clone(&sandbox));
        Ok(sandbox)
    }

    /// Wire a loaded application to a sandbox (the lifecycle boundary)
    pub fn attach(&self, app: &AppDescriptor) -> VmResult<AppBinding> {
        let exec_env = match &app.exec_env {
            Some(provider) => provider(app.strict_isolation),
            None => Map::new(),
        };
        let options = SandboxOptions::new(app.name.clone())
            .with_strict_isolation(app.strict_isolation)
            .with_root(Arc::clone(&app.html_node))
            .with_source_list(Arc::clone(&app.source_list))
            .with_exec_env(exec_env);
        let options = match &app.base_url {
            Some(base) => options.with_base_url(base.clone()),
            None => options,
        };
        let sandbox = self.get_or_create(options)?;
        Ok(AppBinding { sandbox })
    }

    pub fn get(&self, namespace: &str) -> Option<Arc<Sandbox>> {
        self.sandboxes.get(namespace).map(|s| Arc::clone(&s))
    }

    pub fn has(&self, namespace: &str) -> bool {
        self.sandboxes.contains_key(namespace)
    }

    /// Deactivate a namespace's sandbox, keeping it for identity reuse
    pub fn deactivate(&self, namespace: &str) -> bool {
        match self.sandboxes.get(namespace) {
            Some(sandbox) => {
                sandbox.deactivate();
                true
            }
            None => false,
        }
    }

    /// Destroy a namespace's sandbox entirely, releasing the virtual object
    pub fn remove(&self, namespace: &str) -> bool {
        if let Some((_, sandbox)) = self.sandboxes.remove(namespace) {
            sandbox.deactivate();
            info!("Removed sandbox for '{}'", namespace);
            true
        } else {
            false
        }
    }

    pub fn list_namespaces(&self) -> Vec<Namespace> {
        self.sandboxes.iter().map(|e| e.key().clone()).collect()
    }

    pub fn stats(&self) -> SandboxStats {
        let mut active = 0;
        let mut recorded = 0;
        for entry in self.sandboxes.iter() {
            if entry.value().is_active() {
                active += 1;
            }
            recorded += entry.value().recorded_global_keys().len();
        }
        SandboxStats {
            total_sandboxes: self.sandboxes.len(),
            active_sandboxes: active,
            recorded_keys: recorded,
        }
    }

    fn report_closed(&self, namespace: &str) -> VmError {
        // Reported loudly once; later refusals stay observable via the error
        if !self.capability_reported.swap(true, Ordering::SeqCst) {
            warn!(
                "Sandboxing is unavailable (configuration or runtime capability); \
                 refusing sandbox for '{}'",
                namespace
            );
        }
        VmError::Unsupported(format!("sandboxing unavailable for '{namespace}'"))
    }
}

impl std::fmt::Debug for SandboxManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxManager")
            .field("open", &self.open)
            .field("sandboxes", &self.sandboxes.len())
            .finish_non_exhaustive()
    }
}
