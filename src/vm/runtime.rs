/*!
 * Script Runtime Seam
 *
 * The crate does not interpret code. A host runtime implements
 * `ScriptRuntime` and routes every top-level global access of the unit it
 * evaluates through the supplied scope (global-mode evaluation, not
 * function-local evaluation). Runtimes that cannot do that report it via
 * `supports_scoped_eval` and the sandbox-open decision fails closed.
 */

use crate::core::types::{Map, Value};
use crate::vm::scope::GlobalScope;

/// CommonJS-style module scope supplied to each execution.
///
/// `exports` starts as an empty record and is what `module.exports` refers
/// to for the duration of the execution. `env` carries the host-supplied
/// override entries (the `require`-style ambient bindings); they are
/// readable by the evaluated code but not required to be returned.
#[derive(Debug, Clone)]
pub struct CjsScope {
    pub exports: Value,
    pub env: Map,
}

impl CjsScope {
    pub fn new(env: Map) -> Self {
        Self {
            exports: Value::Object(Map::new()),
            env,
        }
    }

    /// Resolve a `require`-style override entry
    pub fn require(&self, name: &str) -> Option<&Value> {
        self.env.get(name)
    }

    pub fn set_export(&mut self, key: impl Into<String>, value: Value) {
        if let Value::Object(map) = &mut self.exports {
            map.insert(key.into(), value);
        }
    }

    pub fn export(&self, key: &str) -> Option<&Value> {
        self.exports.as_object().and_then(|m| m.get(key))
    }
}

/// Everything one evaluation may touch
pub struct ExecContext<'a> {
    /// The sandbox's virtual global object - the top-level binding
    /// environment for this evaluation
    pub scope: &'a dyn GlobalScope,
    pub module: &'a mut CjsScope,
    pub source_url: Option<&'a str>,
}

/// Host execution engine.
pub trait ScriptRuntime: Send + Sync {
    /// Whether the runtime can route top-level global access of evaluated
    /// code through the scope handed to `eval`. Without this capability
    /// sandboxing is disabled rather than silently unprotected.
    fn supports_scoped_eval(&self) -> bool {
        true
    }

    /// Evaluate one unit of source code against the given context.
    ///
    /// Bare assignments and `var` declarations must resolve through
    /// `ctx.scope`; module-shaped output goes to `ctx.module.exports`.
    fn eval(&self, code: &str, ctx: ExecContext<'_>) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cjs_scope_starts_empty() {
        let cjs = CjsScope::new(Map::new());
        assert_eq!(cjs.exports, json!({}));
    }

    #[test]
    fn test_env_entries_readable() {
        let mut env = Map::new();
        env.insert("react".into(), json!("override"));
        let cjs = CjsScope::new(env);
        assert_eq!(cjs.require("react"), Some(&json!("override")));
        assert_eq!(cjs.require("missing"), None);
    }
}
