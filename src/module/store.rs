/*!
 * Resource Store
 * Process-wide cache of fetched module managers
 */

use crate::core::types::Namespace;
use crate::module::loader::{negotiate_loader, HttpLoader, ModuleLoader};
use crate::module::types::{
    HostEnvSnapshot, ModuleConfig, ModuleError, ModuleManager, ModuleRequest, ModuleResult,
    ResolvedRequest,
};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type InflightFuture = Shared<BoxFuture<'static, Result<Arc<ModuleManager>, ModuleError>>>;

/// Shared store of fetched module resources.
///
/// Explicitly constructed and dependency-injected - created once per
/// process by the embedder, cleared only by explicit call - so tests can
/// instantiate isolated stores. Module managers are immutable once stored
/// and reusable by any application; the in-flight map guarantees that
/// concurrent requests for one unresolved URL share a single fetch.
pub struct ResourceStore {
    config: ArcSwap<ModuleConfig>,
    /// Host-snapshot resources, matched by exact URL before anything else
    seeded: RwLock<Vec<Arc<ModuleManager>>>,
    /// Fetched managers keyed by canonical (post-redirect) URL
    cache: Arc<DashMap<String, Arc<ModuleManager>>>,
    /// Request URL -> canonical URL, learned from completed fetches
    redirects: Arc<DashMap<String, String>>,
    inflight: DashMap<String, InflightFuture>,
    loader: Arc<dyn ModuleLoader>,
    current_app: Option<Namespace>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::with_loader(Arc::new(HttpLoader::new()))
    }

    pub fn with_loader(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            config: ArcSwap::from_pointee(ModuleConfig::default()),
            seeded: RwLock::new(Vec::new()),
            cache: Arc::new(DashMap::new()),
            redirects: Arc::new(DashMap::new()),
            inflight: DashMap::new(),
            loader,
            current_app: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Build a store from a host-provided environment snapshot.
    ///
    /// Externals seed the default env, pre-fetched module code seeds the
    /// store (alias keys populate the alias table), and the host's loader
    /// is adopted when it carries the recognized identity marker.
    pub fn from_snapshot(snapshot: HostEnvSnapshot) -> Self {
        let mut config = ModuleConfig {
            env: snapshot.externals,
            ..ModuleConfig::default()
        };

        let mut seeded = Vec::with_capacity(snapshot.remote_modules_code.len());
        for manager in snapshot.remote_modules_code {
            if let Some(alias) = &manager.alias_url {
                config.alias.insert(alias.clone(), manager.url.clone());
            }
            seeded.push(Arc::new(manager));
        }
        info!(
            "Resource store seeded with {} module(s), {} alias(es)",
            seeded.len(),
            config.alias.len()
        );

        let store = Self::with_loader(negotiate_loader(snapshot.loader));
        store.config.store(Arc::new(config));
        *store.seeded.write() = seeded;
        Self {
            current_app: snapshot.current_app,
            ..store
        }
    }

    /// Current process-wide defaults
    pub fn config(&self) -> Arc<ModuleConfig> {
        self.config.load_full()
    }

    /// Explicit configuration call; replaces the defaults atomically
    pub fn configure(&self, mutate: impl FnOnce(&mut ModuleConfig)) {
        let mut next = ModuleConfig::clone(&self.config.load_full());
        mutate(&mut next);
        self.config.store(Arc::new(next));
    }

    /// Map a short name to its canonical URL
    pub fn set_alias(&self, name: impl Into<String>, url: impl Into<String>) {
        let (name, url) = (name.into(), url.into());
        self.configure(|config| {
            config.alias.insert(name.clone(), url.clone());
        });
    }

    /// Application a host-driven load is attributed to, if the host said so
    pub fn current_app(&self) -> Option<&str> {
        self.current_app.as_deref()
    }

    /// Resolve a module request to its manager.
    ///
    /// Order: host-snapshot match by exact URL, alias indirection, cache
    /// by canonical URL (honored unless the caller disabled caching),
    /// then a coalesced fetch through the shared loader stored under the
    /// post-redirect URL.
    pub async fn resolve(&self, request: impl Into<ModuleRequest>) -> ModuleResult<Arc<ModuleManager>> {
        let resolved = self.config().purify(request)?;
        self.resolve_request(&resolved).await
    }

    pub(crate) async fn resolve_request(
        &self,
        request: &ResolvedRequest,
    ) -> ModuleResult<Arc<ModuleManager>> {
        if request.cache {
            if let Some(manager) = self.lookup_local(&request.url) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(manager);
            }
        }

        // Alias indirection happens before cache lookup
        let lookup_url = {
            let config = self.config();
            config
                .alias
                .get(&request.url)
                .cloned()
                .unwrap_or_else(|| request.url.clone())
        };
        let canonical = self
            .redirects
            .get(&lookup_url)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| lookup_url.clone());

        if request.cache {
            if let Some(manager) = self.lookup_local(&canonical) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(manager);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let shared = match self.inflight.get(&lookup_url) {
            Some(pending) => {
                debug!("Coalescing request for '{}'", lookup_url);
                pending.clone()
            }
            None => {
                let fut = self.spawn_fetch(&lookup_url, request);
                self.inflight.insert(lookup_url.clone(), fut.clone());
                fut
            }
        };

        let result = shared.await;
        // Resolved exactly once; a second remove of the same key is a no-op
        self.inflight.remove(&lookup_url);
        result
    }

    fn spawn_fetch(&self, lookup_url: &str, request: &ResolvedRequest) -> InflightFuture {
        let loader = Arc::clone(&self.loader);
        let cache = Arc::clone(&self.cache);
        let redirects = Arc::clone(&self.redirects);
        let requested = request.url.clone();
        let version = request.version.clone();
        let lookup = lookup_url.to_string();
        let fetch = loader.fetch(lookup_url);

        async move {
            let fetched = fetch.await?;
            let mut manager = ModuleManager::new(fetched.url.clone(), fetched.code);
            if requested != fetched.url {
                manager = manager.with_alias(requested);
            }
            if let Some(version) = version {
                manager = manager.with_version(version);
            }
            let manager = Arc::new(manager);

            // Keyed by the post-redirect URL; the request URL keeps working
            // through the redirect index
            cache.insert(fetched.url.clone(), Arc::clone(&manager));
            if lookup != fetched.url {
                redirects.insert(lookup, fetched.url);
            }
            Ok(manager)
        }
        .boxed()
        .shared()
    }

    fn lookup_local(&self, url: &str) -> Option<Arc<ModuleManager>> {
        if let Some(seeded) = self.seeded.read().iter().find(|m| m.url == url) {
            return Some(Arc::clone(seeded));
        }
        self.cache.get(url).map(|entry| Arc::clone(&entry))
    }

    /// Look up already-fetched code by canonical URL without fetching
    pub fn get_module_code(&self, url: &str) -> Option<Arc<ModuleManager>> {
        self.lookup_local(url)
    }

    /// Drop every cached and seeded resource
    pub fn clear(&self) {
        self.cache.clear();
        self.redirects.clear();
        self.seeded.write().clear();
        info!("Resource store cleared");
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            cached: self.cache.len(),
            seeded: self.seeded.read().len(),
            inflight: self.inflight.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore")
            .field("cached", &self.cache.len())
            .field("seeded", &self.seeded.read().len())
            .field("inflight", &self.inflight.len())
            .finish_non_exhaustive()
    }
}

/// Store statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreStats {
    pub cached: usize,
    pub seeded: usize,
    pub inflight: usize,
    pub hits: u64,
    pub misses: u64,
}
