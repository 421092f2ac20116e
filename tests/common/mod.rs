/*!
 * Shared test support
 * Minimal scripted host runtime driving the sandbox API
 */
#![allow(dead_code)]

use anyhow::{bail, Context};
use scopevm::vm::runtime::{ExecContext, ScriptRuntime};
use scopevm::{GlobalScope, Value};

/// Line-oriented scripted runtime.
///
/// Each line is one operation against the execution context, standing in
/// for a host engine that routes top-level access through the scope:
///   set <key> <json>      write a global
///   del <key>             delete a global
///   export <key> <json>   write a module export
///   copyenv <name>        export an env override entry under its name
///   fail <message>        abort evaluation
pub struct LineRuntime;

impl ScriptRuntime for LineRuntime {
    fn eval(&self, code: &str, ctx: ExecContext<'_>) -> anyhow::Result<()> {
        let ExecContext { scope, module, .. } = ctx;
        for line in code.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(3, ' ');
            let op = parts.next().unwrap_or_default();
            let key = parts.next().unwrap_or_default().to_string();
            match op {
                "set" => {
                    let value: Value = serde_json::from_str(parts.next().context("set value")?)?;
                    scope.write(&key, value);
                }
                "del" => {
                    scope.delete(&key);
                }
                "export" => {
                    let value: Value =
                        serde_json::from_str(parts.next().context("export value")?)?;
                    module.set_export(key, value);
                }
                "copyenv" => {
                    let value = module.require(&key).cloned().unwrap_or(Value::Null);
                    module.set_export(key, value);
                }
                "fail" => bail!("{}", key),
                other => bail!("unknown op '{other}'"),
            }
        }
        Ok(())
    }
}

/// Runtime without the interception capability; sandbox creation must
/// fail closed against it
pub struct UnscopedRuntime;

impl ScriptRuntime for UnscopedRuntime {
    fn supports_scoped_eval(&self) -> bool {
        false
    }

    fn eval(&self, _code: &str, _ctx: ExecContext<'_>) -> anyhow::Result<()> {
        bail!("unscoped runtime cannot evaluate sandboxed code")
    }
}
