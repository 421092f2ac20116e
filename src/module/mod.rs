/*!
 * Remote Module Resource Store
 *
 * Process-wide resolution, caching and deduplication of fetched module
 * code, shared by every sandbox:
 * - Immutable module managers keyed by post-redirect URL
 * - Alias indirection and host-snapshot seeding
 * - Single shared loader instance negotiated with the embedding host
 * - In-flight request coalescing
 */

pub mod loader;
pub mod remote;
pub mod store;
pub mod types;

pub use loader::{negotiate_loader, FetchedModule, HttpLoader, MemoryLoader, ModuleLoader, LOADER_IDENTITY};
pub use remote::load_module;
pub use store::{ResourceStore, StoreStats};
pub use types::{
    HostEnvSnapshot, ModuleConfig, ModuleError, ModuleManager, ModuleRequest, ModuleResult,
    ResolvedRequest,
};
