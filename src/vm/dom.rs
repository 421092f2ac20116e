/*!
 * DOM Mutation Interceptor
 *
 * Minimal element model plus the wrapping that observes node-append
 * operations on a sandbox's root element. Appends of resource-carrier
 * elements get their URL resolved against the application's base URL,
 * recorded into the application's source list, and rewritten before the
 * real insertion proceeds. The append itself is never blocked, dropped,
 * or reordered.
 */

use crate::vm::sandbox::Sandbox;
use crate::vm::types::{AppendHook, SourceList};
use dashmap::DashMap;
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use url::Url;

/// Unique element identity, used for idempotent recording
pub type NodeId = u64;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Element tags whose insertion triggers a resource fetch
pub const SOURCE_CARRIER_TAGS: [&str; 4] = ["script", "link", "style", "img"];

pub fn is_source_carrier(tag: &str) -> bool {
    SOURCE_CARRIER_TAGS.contains(&tag)
}

/// Immutable copy of an element's state, taken before any rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub tag: String,
    pub attrs: HashMap<String, String>,
}

/// One DOM element.
pub struct DomNode {
    id: NodeId,
    tag: String,
    attrs: RwLock<HashMap<String, String>>,
    children: RwLock<Vec<Arc<DomNode>>>,
    interceptor: RwLock<Option<Arc<AppendInterceptor>>>,
}

impl DomNode {
    pub fn new(tag: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            tag: tag.into(),
            attrs: RwLock::new(HashMap::new()),
            children: RwLock::new(Vec::new()),
            interceptor: RwLock::new(None),
        })
    }

    pub fn with_attrs<I, K, V>(tag: impl Into<String>, attrs: I) -> Arc<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let node = Self::new(tag);
        {
            let mut map = node.attrs.write();
            for (k, v) in attrs {
                map.insert(k.into(), v.into());
            }
        }
        node
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.attrs.read().get(name).cloned()
    }

    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs.write().insert(name.into(), value.into());
    }

    pub fn children(&self) -> Vec<Arc<DomNode>> {
        self.children.read().clone()
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            tag: self.tag.clone(),
            attrs: self.attrs.read().clone(),
        }
    }

    /// Append a child, running the installed interceptor first.
    ///
    /// The interceptor observes and optionally rewrites; the insertion
    /// always proceeds.
    pub fn append_child(&self, child: Arc<DomNode>) {
        let interceptor = self.interceptor.read().clone();
        if let Some(interceptor) = interceptor {
            interceptor.before_append(self, &child);
        }
        self.children.write().push(child);
    }

    pub(crate) fn install_interceptor(&self, interceptor: Arc<AppendInterceptor>) {
        *self.interceptor.write() = Some(interceptor);
    }

    pub(crate) fn clear_interceptor(&self) {
        *self.interceptor.write() = None;
    }
}

impl std::fmt::Debug for DomNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomNode")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("children", &self.children.read().len())
            .finish_non_exhaustive()
    }
}

/// Wrapping installed on a sandbox's root element (and optionally the host
/// document head).
pub(crate) struct AppendInterceptor {
    sandbox: Weak<Sandbox>,
    base_url: Option<String>,
    source_list: Option<SourceList>,
    hook: Option<AppendHook>,
    seen: DashMap<NodeId, ()>,
}

impl AppendInterceptor {
    pub(crate) fn new(
        sandbox: Weak<Sandbox>,
        base_url: Option<String>,
        source_list: Option<SourceList>,
        hook: Option<AppendHook>,
    ) -> Self {
        Self {
            sandbox,
            base_url,
            source_list,
            hook,
            seen: DashMap::new(),
        }
    }

    fn before_append(&self, root: &DomNode, el: &DomNode) {
        let tag = el.tag().to_string();
        if !is_source_carrier(&tag) {
            return;
        }

        let original = el.snapshot();

        // Resolve and record once per element, no matter how many times
        // the same node is appended
        if self.seen.insert(el.id(), ()).is_none() {
            let url_attr = if el.attr("src").is_some() { "src" } else { "href" };
            if let Some(raw) = el.attr(url_attr) {
                let resolved = resolve_url(self.base_url.as_deref(), &raw);
                el.set_attr(url_attr, resolved.clone());
                if let Some(list) = &self.source_list {
                    debug!("Recorded resource '{}' ({})", resolved, tag);
                    list.lock().push(resolved);
                }
            }
        }

        if let Some(hook) = &self.hook {
            if let Some(sandbox) = self.sandbox.upgrade() {
                hook(&sandbox, root, el, &tag, &original);
            }
        }
    }
}

/// Resolve a possibly-relative resource URL against an application base.
///
/// Falls back to the raw value when no base is configured or the value is
/// already absolute and parses on its own.
pub fn resolve_url(base: Option<&str>, raw: &str) -> String {
    if let Some(base) = base {
        if let Ok(base) = Url::parse(base) {
            if let Ok(joined) = base.join(raw) {
                return joined.to_string();
            }
        }
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_relative_against_base() {
        assert_eq!(
            resolve_url(Some("https://app/"), "b.js"),
            "https://app/b.js"
        );
        assert_eq!(
            resolve_url(Some("https://app/sub/index.html"), "/root.css"),
            "https://app/root.css"
        );
    }

    #[test]
    fn test_resolve_absolute_unchanged() {
        assert_eq!(
            resolve_url(Some("https://app/"), "https://cdn/x.js"),
            "https://cdn/x.js"
        );
        assert_eq!(resolve_url(None, "b.js"), "b.js");
    }

    #[test]
    fn test_append_without_interceptor() {
        let root = DomNode::new("div");
        let child = DomNode::with_attrs("script", [("src", "a.js")]);
        root.append_child(Arc::clone(&child));
        assert_eq!(root.children().len(), 1);
        assert_eq!(child.attr("src"), Some("a.js".to_string()));
    }

    #[test]
    fn test_source_carrier_tags() {
        assert!(is_source_carrier("script"));
        assert!(is_source_carrier("img"));
        assert!(!is_source_carrier("div"));
    }
}
