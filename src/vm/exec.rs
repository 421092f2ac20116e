/*!
 * Script Execution Pipeline
 * Binds source code to a sandbox's virtual scope and runs it
 */

use crate::core::types::{merge_map, Map, Value};
use crate::vm::runtime::{CjsScope, ExecContext};
use crate::vm::sandbox::Sandbox;
use crate::vm::types::{VmError, VmResult};
use log::error;

/// Per-execution options
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Merge the sandbox's own override seed beneath the per-call `env`
    pub merge_sandbox_env: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            merge_sandbox_env: true,
        }
    }
}

/// Execute `code` with its top-level execution context set to the
/// sandbox's virtual global object.
///
/// A CommonJS-style module scope is supplied: `exports` starts empty and
/// any host-supplied override entries are merged in before execution
/// (call-site entries win over the sandbox's seed, key by key). Returns
/// the resulting exports. A thrown error is caught, annotated with the
/// source URL and the owning namespace, and returned - it never crosses
/// into another sandbox or takes the host down.
pub fn exec_script(
    sandbox: &Sandbox,
    code: &str,
    env: Option<&Map>,
    source_url: Option<&str>,
    options: &ExecOptions,
) -> VmResult<Value> {
    if !sandbox.is_active() {
        return Err(VmError::Inactive(sandbox.namespace().to_string()));
    }

    let merged_env = match (options.merge_sandbox_env, env) {
        (true, Some(overrides)) => merge_map(sandbox.exec_env(), overrides),
        (true, None) => sandbox.exec_env().clone(),
        (false, Some(overrides)) => overrides.clone(),
        (false, None) => Map::new(),
    };

    let mut module = CjsScope::new(merged_env);
    let context = sandbox.context();
    let result = sandbox.runtime().eval(
        code,
        ExecContext {
            scope: &*context,
            module: &mut module,
            source_url,
        },
    );

    match result {
        Ok(()) => Ok(module.exports),
        Err(err) => {
            let annotated = VmError::Execution {
                namespace: sandbox.namespace().to_string(),
                source_url: source_url.map(str::to_string),
                message: format!("{err:#}"),
            };
            error!("{}", annotated);
            Err(annotated)
        }
    }
}
