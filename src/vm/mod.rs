/*!
 * Virtual Machine Sandbox
 *
 * Gives each loaded application a private, virtualized global binding
 * environment:
 * - Identifier routing between the real global and per-sandbox storage
 * - Global-mode script execution against the virtual scope
 * - Interception of resource-carrying DOM insertions
 */

pub mod dom;
pub mod exec;
pub mod manager;
pub mod policy;
pub mod runtime;
pub mod sandbox;
pub mod scope;
pub mod types;

pub use dom::{DomNode, NodeSnapshot, SOURCE_CARRIER_TAGS};
pub use exec::ExecOptions;
pub use manager::{AppBinding, AppDescriptor, SandboxManager, VmConfig};
pub use policy::{VarClass, VariablePolicy};
pub use runtime::{CjsScope, ExecContext, ScriptRuntime};
pub use sandbox::Sandbox;
pub use scope::{GlobalScope, SharedGlobal, VirtualScope};
pub use types::{SandboxOptions, SandboxStats, VmError, VmResult};
