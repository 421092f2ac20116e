/*!
 * ScopeVM Library
 * Per-application virtual global scopes with a shared remote-module resource store
 */

pub mod core;
pub mod module;
pub mod vm;

// Re-exports
pub use crate::core::types::{Map, Namespace, Value};
pub use module::{
    HostEnvSnapshot, HttpLoader, MemoryLoader, ModuleConfig, ModuleError, ModuleLoader,
    ModuleManager, ModuleRequest, ResourceStore, load_module, LOADER_IDENTITY,
};
pub use vm::{
    AppBinding, AppDescriptor, DomNode, GlobalScope, Sandbox, SandboxManager, SandboxOptions,
    ScriptRuntime, SharedGlobal, VariablePolicy, VarClass, VirtualScope, VmConfig, VmError,
    VmResult,
};
