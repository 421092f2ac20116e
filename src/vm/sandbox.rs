/*!
 * Sandbox
 * One isolated execution unit per loaded application
 */

use crate::core::types::{Map, Namespace, Value};
use crate::vm::dom::{AppendInterceptor, DomNode};
use crate::vm::exec::{self, ExecOptions};
use crate::vm::policy::VariablePolicy;
use crate::vm::runtime::ScriptRuntime;
use crate::vm::scope::{GlobalScope, VirtualScope};
use crate::vm::types::{AppendHook, RootProvider, SandboxOptions, SourceList, VmError, VmResult};
use log::{info, warn};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Per-application sandbox.
///
/// Owns the application's virtual global object. The context's identity is
/// stable for the sandbox's lifetime: deactivating and reactivating under
/// the same namespace hands back the same object, so closures captured by
/// the application's code remain valid. Deactivation stops routing writes,
/// clears the keys recorded through this sandbox from private storage, and
/// releases the DOM wrapping.
pub struct Sandbox {
    namespace: Namespace,
    strict_isolation: bool,
    base_url: Option<String>,
    exec_env: Map,
    source_list: Option<SourceList>,
    append_hook: Option<AppendHook>,
    root_provider: Option<RootProvider>,
    head: Option<Arc<DomNode>>,
    context: Arc<VirtualScope>,
    runtime: Arc<dyn ScriptRuntime>,
    root: RwLock<Option<Arc<DomNode>>>,
    self_ref: Weak<Sandbox>,
}

impl Sandbox {
    /// Build a sandbox from resolved options.
    ///
    /// Fails closed: a disabled master switch or a runtime that cannot
    /// route global access through a supplied scope is an error, never a
    /// silently unprotected sandbox.
    pub(crate) fn create(
        options: SandboxOptions,
        real: Arc<dyn GlobalScope>,
        runtime: Arc<dyn ScriptRuntime>,
    ) -> VmResult<Arc<Self>> {
        if !options.open {
            return Err(VmError::Unsupported(format!(
                "sandbox disabled by configuration for '{}'",
                options.namespace
            )));
        }
        if !runtime.supports_scoped_eval() {
            warn!(
                "Host runtime cannot intercept global access; refusing sandbox '{}'",
                options.namespace
            );
            return Err(VmError::Unsupported(
                "host runtime lacks scoped evaluation".to_string(),
            ));
        }

        let policy = VariablePolicy::new(
            options.protect_variable,
            options.protect_dynamic,
            options.insulation_variable,
            options.insulation_dynamic,
        );
        let context = Arc::new(VirtualScope::new(
            options.namespace.clone(),
            real,
            policy,
            options.strict_isolation,
        ));

        let sandbox = Arc::new_cyclic(|self_ref| Self {
            namespace: options.namespace,
            strict_isolation: options.strict_isolation,
            base_url: options.base_url,
            exec_env: options.exec_env,
            source_list: options.source_list,
            append_hook: options.on_append_node,
            root_provider: options.root,
            head: options.head,
            context,
            runtime,
            root: RwLock::new(None),
            self_ref: self_ref.clone(),
        });

        if let Some(head) = &sandbox.head {
            sandbox.wrap_node(head);
        }

        info!("Created sandbox for '{}'", sandbox.namespace);
        Ok(sandbox)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn strict_isolation(&self) -> bool {
        self.strict_isolation
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.context.is_active()
    }

    /// The virtual global object exposed to consumers
    pub fn context(&self) -> Arc<VirtualScope> {
        Arc::clone(&self.context)
    }

    pub(crate) fn runtime(&self) -> &Arc<dyn ScriptRuntime> {
        &self.runtime
    }

    pub(crate) fn exec_env(&self) -> &Map {
        &self.exec_env
    }

    /// Identifiers written through this sandbox's virtual scope
    pub fn recorded_global_keys(&self) -> Vec<String> {
        self.context.recorded_keys()
    }

    /// The DOM subtree owned by this application, resolved lazily.
    ///
    /// Resolving installs the append wrapping while the sandbox is active.
    pub fn root(&self) -> Option<Arc<DomNode>> {
        if let Some(root) = self.root.read().as_ref() {
            return Some(Arc::clone(root));
        }
        let provider = self.root_provider.as_ref()?;
        let root = provider();
        if self.is_active() {
            self.wrap_node(&root);
        }
        *self.root.write() = Some(Arc::clone(&root));
        Some(root)
    }

    fn wrap_node(&self, node: &DomNode) {
        node.install_interceptor(Arc::new(AppendInterceptor::new(
            self.self_ref.clone(),
            self.base_url.clone(),
            self.source_list.clone(),
            self.append_hook.clone(),
        )));
    }

    /// Re-enable a previously deactivated sandbox.
    ///
    /// The virtual context keeps its identity; keys cleared on
    /// deactivation stay cleared.
    pub fn activate(&self) {
        self.context.set_active(true);
        if let Some(root) = self.root.read().as_ref() {
            self.wrap_node(root);
        }
        if let Some(head) = &self.head {
            self.wrap_node(head);
        }
        info!("Activated sandbox '{}'", self.namespace);
    }

    /// Synchronously stop this sandbox.
    ///
    /// Further writes through the virtual scope are dropped (an
    /// outstanding fetch completing later must not repopulate the torn-down
    /// scope), recorded keys are removed from private storage, and the DOM
    /// wrapping is released.
    pub fn deactivate(&self) {
        self.context.set_active(false);
        self.context.clear_recorded();
        if let Some(root) = self.root.read().as_ref() {
            root.clear_interceptor();
        }
        if let Some(head) = &self.head {
            head.clear_interceptor();
        }
        info!("Deactivated sandbox '{}'", self.namespace);
    }

    /// Execute a unit of source code against this sandbox's virtual scope
    pub fn exec_script(
        &self,
        code: &str,
        env: Option<&Map>,
        source_url: Option<&str>,
        options: &ExecOptions,
    ) -> VmResult<Value> {
        exec::exec_script(self, code, env, source_url, options)
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("namespace", &self.namespace)
            .field("active", &self.is_active())
            .field("strict_isolation", &self.strict_isolation)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
