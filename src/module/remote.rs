/*!
 * Remote Module Execution
 * The sandbox-facing module load path
 */

use crate::core::types::Value;
use crate::module::store::ResourceStore;
use crate::module::types::{ModuleError, ModuleRequest, ModuleResult};
use crate::vm::exec::ExecOptions;
use crate::vm::sandbox::Sandbox;
use crate::vm::types::VmError;
use log::debug;

/// Resolve a remote module through the store and execute it inside a
/// sandbox, returning its exports.
///
/// The merged `env` becomes the execution's CommonJS-override seed and
/// the manager's canonical URL its source URL. The `adapter` hook maps
/// the exports; the `error` hook observes any failure and may supply
/// fallback exports instead of the error.
///
/// Unmount racing a fetch: when the sandbox was deactivated while the
/// fetch was outstanding, the fetched module is still cached for future
/// use but is not executed against the torn-down scope.
pub async fn load_module(
    store: &ResourceStore,
    sandbox: &Sandbox,
    request: impl Into<ModuleRequest>,
) -> ModuleResult<Value> {
    let resolved = store.config().purify(request)?;

    let manager = match store.resolve_request(&resolved).await {
        Ok(manager) => manager,
        Err(err) => return fail(&resolved.error, err),
    };

    if !sandbox.is_active() {
        debug!(
            "Sandbox '{}' deactivated while '{}' was in flight; module cached, not executed",
            sandbox.namespace(),
            manager.url
        );
        return fail(
            &resolved.error,
            VmError::Inactive(sandbox.namespace().to_string()).into(),
        );
    }

    let exports = match sandbox.exec_script(
        &manager.code,
        Some(&resolved.env),
        Some(&manager.url),
        &ExecOptions::default(),
    ) {
        Ok(exports) => exports,
        Err(err) => return fail(&resolved.error, err.into()),
    };

    Ok(match &resolved.adapter {
        Some(adapter) => adapter(exports),
        None => exports,
    })
}

fn fail(
    hook: &Option<crate::module::types::ErrorHook>,
    err: ModuleError,
) -> ModuleResult<Value> {
    if let Some(hook) = hook {
        if let Some(fallback) = hook(&err) {
            return Ok(fallback);
        }
    }
    Err(err)
}
