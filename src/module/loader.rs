/*!
 * Module Loader
 * Shared fetch coordinator with host-instance negotiation
 */

use crate::module::types::{ModuleError, ModuleResult};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use log::info;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity marker carried by loaders this crate recognizes as its own.
///
/// An embedding host that already created a loader hands it over through
/// the env snapshot; the marker is what lets us adopt it instead of
/// running two independent fetch caches in one process.
pub const LOADER_IDENTITY: &str = "scopevm.loader";

/// One fetched resource, canonical URL included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedModule {
    /// Final URL after redirects
    pub url: String,
    pub code: String,
}

/// Fetch/parse coordinator shared by every module load.
pub trait ModuleLoader: Send + Sync {
    /// Recognition marker; `LOADER_IDENTITY` for loaders of this crate
    fn identity(&self) -> &str;

    /// Fetch one resource. The returned URL must be the post-redirect one.
    fn fetch(&self, url: &str) -> BoxFuture<'static, ModuleResult<FetchedModule>>;
}

/// Adopt a host-provided loader when it carries the recognized identity
/// marker; otherwise create a local HTTP loader.
pub fn negotiate_loader(provided: Option<Arc<dyn ModuleLoader>>) -> Arc<dyn ModuleLoader> {
    match provided {
        Some(loader) if loader.identity() == LOADER_IDENTITY => {
            info!("Adopted host-provided module loader");
            loader
        }
        _ => Arc::new(HttpLoader::new()),
    }
}

/// HTTP-backed loader
pub struct HttpLoader {
    client: reqwest::Client,
}

impl HttpLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLoader for HttpLoader {
    fn identity(&self) -> &str {
        LOADER_IDENTITY
    }

    fn fetch(&self, url: &str) -> BoxFuture<'static, ModuleResult<FetchedModule>> {
        let client = self.client.clone();
        let url = url.to_string();
        async move {
            let response = client.get(&url).send().await.map_err(|e| ModuleError::Fetch {
                url: url.clone(),
                reason: e.to_string(),
            })?;
            if !response.status().is_success() {
                return Err(ModuleError::Fetch {
                    url: url.clone(),
                    reason: format!("http status {}", response.status()),
                });
            }
            // Redirects change the canonical identity; keep the final URL
            let final_url = response.url().to_string();
            let code = response.text().await.map_err(|e| ModuleError::Fetch {
                url: url.clone(),
                reason: e.to_string(),
            })?;
            Ok(FetchedModule {
                url: final_url,
                code,
            })
        }
        .boxed()
    }
}

/// In-memory loader for tests and offline embedding
pub struct MemoryLoader {
    modules: DashMap<String, FetchedModule>,
    fetches: AtomicU64,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self {
            modules: DashMap::new(),
            fetches: AtomicU64::new(0),
        }
    }

    /// Register code under a request URL; `final_url` may differ to model
    /// a redirect
    pub fn put(&self, request_url: impl Into<String>, final_url: impl Into<String>, code: impl Into<String>) {
        self.modules.insert(
            request_url.into(),
            FetchedModule {
                url: final_url.into(),
                code: code.into(),
            },
        );
    }

    /// Number of fetches actually performed
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl Default for MemoryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLoader for MemoryLoader {
    fn identity(&self) -> &str {
        LOADER_IDENTITY
    }

    fn fetch(&self, url: &str) -> BoxFuture<'static, ModuleResult<FetchedModule>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let result = match self.modules.get(url) {
            Some(module) => Ok(module.clone()),
            None => Err(ModuleError::Fetch {
                url: url.to_string(),
                reason: "not found".to_string(),
            }),
        };
        async move { result }.boxed()
    }
}
