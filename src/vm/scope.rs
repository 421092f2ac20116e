/*!
 * Scope Interceptor
 *
 * `GlobalScope` is the key-space interception abstraction; `SharedGlobal`
 * is the real, process-shared global object and `VirtualScope` is the
 * per-sandbox proxy that routes each access by identifier classification.
 */

use crate::core::types::{Map, Namespace, Value};
use crate::vm::policy::{VarClass, VariablePolicy};
use ahash::RandomState;
use log::debug;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Dynamic interception of property access over a key space.
///
/// One concrete proxying implementation exists (`VirtualScope`); hosts whose
/// runtime cannot route global access through this interface fail the
/// sandbox-open decision instead of running unprotected.
pub trait GlobalScope: Send + Sync {
    fn read(&self, key: &str) -> Option<Value>;
    fn write(&self, key: &str, value: Value);
    fn delete(&self, key: &str) -> bool;
    fn has(&self, key: &str) -> bool;
    /// Own keys, de-duplicated
    fn keys(&self) -> Vec<String>;
}

/// The real global binding environment, shared by every sandbox.
pub struct SharedGlobal {
    vars: RwLock<Map>,
}

impl SharedGlobal {
    pub fn new() -> Self {
        Self {
            vars: RwLock::new(Map::new()),
        }
    }

    /// Seed the environment with host-provided ambient globals
    pub fn with_vars(vars: Map) -> Self {
        Self {
            vars: RwLock::new(vars),
        }
    }

    pub fn snapshot(&self) -> Map {
        self.vars.read().clone()
    }
}

impl Default for SharedGlobal {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalScope for SharedGlobal {
    fn read(&self, key: &str) -> Option<Value> {
        self.vars.read().get(key).cloned()
    }

    fn write(&self, key: &str, value: Value) {
        self.vars.write().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) -> bool {
        self.vars.write().remove(key).is_some()
    }

    fn has(&self, key: &str) -> bool {
        self.vars.read().contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        self.vars.read().keys().cloned().collect()
    }
}

/// Per-sandbox virtual global object.
///
/// Reads, writes, deletes and enumeration are routed per identifier:
/// protected identifiers pass through to the real global, insulated
/// identifiers live only in private storage, and default identifiers are
/// private-once-written with reads falling through to the real global
/// until the first write (no eager snapshot - the real global's current
/// value stays visible until shadowed). Under strict isolation the
/// default-read fall-through is disabled.
pub struct VirtualScope {
    namespace: Namespace,
    real: Arc<dyn GlobalScope>,
    policy: VariablePolicy,
    vars: RwLock<Map>,
    recorded: RwLock<HashSet<String, RandomState>>,
    active: AtomicBool,
    strict: bool,
}

impl VirtualScope {
    pub fn new(
        namespace: Namespace,
        real: Arc<dyn GlobalScope>,
        policy: VariablePolicy,
        strict: bool,
    ) -> Self {
        Self {
            namespace,
            real,
            policy,
            vars: RwLock::new(Map::new()),
            recorded: RwLock::new(HashSet::with_hasher(RandomState::new())),
            active: AtomicBool::new(true),
            strict,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Identifiers actually written through this sandbox, for cleanup
    pub fn recorded_keys(&self) -> Vec<String> {
        self.recorded.read().iter().cloned().collect()
    }

    /// Remove every recorded key from private storage.
    ///
    /// Protected writes landed on the real global on behalf of the shared
    /// host and are left in place.
    pub(crate) fn clear_recorded(&self) {
        let mut recorded = self.recorded.write();
        let mut vars = self.vars.write();
        for key in recorded.drain() {
            vars.remove(&key);
        }
    }

    pub fn classify(&self, key: &str) -> VarClass {
        self.policy.classify(key)
    }
}

impl GlobalScope for VirtualScope {
    fn read(&self, key: &str) -> Option<Value> {
        match self.policy.classify(key) {
            VarClass::Protected => self.real.read(key),
            VarClass::Insulated => self.vars.read().get(key).cloned(),
            VarClass::Default => {
                if let Some(own) = self.vars.read().get(key) {
                    return Some(own.clone());
                }
                if self.strict {
                    None
                } else {
                    self.real.read(key)
                }
            }
        }
    }

    fn write(&self, key: &str, value: Value) {
        if !self.is_active() {
            debug!(
                "Dropped write of '{}' into deactivated scope '{}'",
                key, self.namespace
            );
            return;
        }
        match self.policy.classify(key) {
            VarClass::Protected => self.real.write(key, value),
            VarClass::Insulated | VarClass::Default => {
                self.vars.write().insert(key.to_string(), value);
            }
        }
        self.recorded.write().insert(key.to_string());
    }

    fn delete(&self, key: &str) -> bool {
        match self.policy.classify(key) {
            VarClass::Protected => self.real.delete(key),
            VarClass::Insulated | VarClass::Default => self.vars.write().remove(key).is_some(),
        }
    }

    fn has(&self, key: &str) -> bool {
        match self.policy.classify(key) {
            VarClass::Protected => self.real.has(key),
            VarClass::Insulated => self.vars.read().contains_key(key),
            VarClass::Default => {
                self.vars.read().contains_key(key) || (!self.strict && self.real.has(key))
            }
        }
    }

    fn keys(&self) -> Vec<String> {
        // Union of real-global own keys and private own keys, so
        // iteration-based feature detection does not reveal the indirection
        let mut seen: HashSet<String, RandomState> = HashSet::with_hasher(RandomState::new());
        let mut keys = Vec::new();
        for key in self.real.keys() {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
        for key in self.vars.read().keys() {
            if seen.insert(key.clone()) {
                keys.push(key.clone());
            }
        }
        keys
    }
}

impl std::fmt::Debug for VirtualScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualScope")
            .field("namespace", &self.namespace)
            .field("active", &self.is_active())
            .field("strict", &self.strict)
            .field("own_keys", &self.vars.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scope(real: &Arc<SharedGlobal>, protect: &[&str], insulate: &[&str]) -> VirtualScope {
        let policy = VariablePolicy::new(
            protect.iter().map(|s| s.to_string()).collect(),
            None,
            insulate.iter().map(|s| s.to_string()).collect(),
            None,
        );
        VirtualScope::new(
            "test-app".to_string(),
            Arc::clone(real) as Arc<dyn GlobalScope>,
            policy,
            false,
        )
    }

    #[test]
    fn test_protected_passes_through_both_ways() {
        let real = Arc::new(SharedGlobal::new());
        let v = scope(&real, &["onerror"], &[]);

        v.write("onerror", json!("handler"));
        assert_eq!(real.read("onerror"), Some(json!("handler")));

        real.write("onerror", json!("replaced"));
        assert_eq!(v.read("onerror"), Some(json!("replaced")));
    }

    #[test]
    fn test_insulated_never_touches_real() {
        let real = Arc::new(SharedGlobal::new());
        let v = scope(&real, &[], &["webpackjsonp"]);

        assert_eq!(v.read("webpackjsonp"), None);
        v.write("webpackjsonp", json!([1, 2]));
        assert_eq!(v.read("webpackjsonp"), Some(json!([1, 2])));
        assert!(!real.has("webpackjsonp"));

        // Not even when the real global carries the same identifier
        real.write("webpackjsonp", json!("host"));
        assert_eq!(v.read("webpackjsonp"), Some(json!([1, 2])));
    }

    #[test]
    fn test_default_reads_through_until_first_write() {
        let real = Arc::new(SharedGlobal::new());
        real.write("setTimeout", json!("ambient"));
        let v = scope(&real, &[], &[]);

        // Read-through, no copy into private storage
        assert_eq!(v.read("setTimeout"), Some(json!("ambient")));
        real.write("setTimeout", json!("ambient2"));
        assert_eq!(v.read("setTimeout"), Some(json!("ambient2")));

        // Copy-on-write: the first write shadows the real global
        v.write("setTimeout", json!("mine"));
        assert_eq!(v.read("setTimeout"), Some(json!("mine")));
        assert_eq!(real.read("setTimeout"), Some(json!("ambient2")));
    }

    #[test]
    fn test_strict_isolation_disables_fallback() {
        let real = Arc::new(SharedGlobal::new());
        real.write("ambient", json!(1));
        let policy = VariablePolicy::new(vec![], None, vec![], None);
        let v = VirtualScope::new(
            "strict-app".to_string(),
            Arc::clone(&real) as Arc<dyn GlobalScope>,
            policy,
            true,
        );

        assert_eq!(v.read("ambient"), None);
        assert!(!v.has("ambient"));
        v.write("ambient", json!(2));
        assert_eq!(v.read("ambient"), Some(json!(2)));
    }

    #[test]
    fn test_delete_routing() {
        let real = Arc::new(SharedGlobal::new());
        real.write("shared", json!(1));
        let v = scope(&real, &["shared"], &[]);

        assert!(v.delete("shared"));
        assert!(!real.has("shared"));

        v.write("private", json!(2));
        assert!(v.delete("private"));
        assert!(!v.has("private"));
    }

    #[test]
    fn test_keys_union_without_duplicates() {
        let real = Arc::new(SharedGlobal::new());
        real.write("a", json!(1));
        real.write("b", json!(2));
        let v = scope(&real, &[], &[]);
        v.write("b", json!(20));
        v.write("c", json!(3));

        let mut keys = v.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_deactivated_scope_drops_writes() {
        let real = Arc::new(SharedGlobal::new());
        let v = scope(&real, &[], &[]);
        v.write("kept", json!(1));
        v.set_active(false);
        v.write("late", json!(2));

        assert_eq!(v.read("kept"), Some(json!(1)));
        assert_eq!(v.read("late"), None);
    }

    proptest::proptest! {
        #[test]
        fn prop_keys_union_is_duplicate_free(
            real_idx in proptest::collection::vec(0usize..12, 0..10),
            own_idx in proptest::collection::vec(0usize..12, 0..10),
        ) {
            let real = Arc::new(SharedGlobal::new());
            for i in &real_idx {
                real.write(&format!("key{i}"), json!(1));
            }
            let v = scope(&real, &[], &[]);
            for i in &own_idx {
                v.write(&format!("key{i}"), json!(2));
            }

            let keys = v.keys();
            let unique: std::collections::HashSet<&String> = keys.iter().collect();
            proptest::prop_assert_eq!(keys.len(), unique.len());
            for i in real_idx.iter().chain(own_idx.iter()) {
                let expected_key = format!("key{}", i);
                proptest::prop_assert!(keys.contains(&expected_key));
            }
        }
    }

    #[test]
    fn test_clear_recorded_removes_private_only() {
        let real = Arc::new(SharedGlobal::new());
        let v = scope(&real, &["onerror"], &[]);
        v.write("onerror", json!("fn"));
        v.write("mine", json!(42));
        assert_eq!(v.recorded_keys().len(), 2);

        v.clear_recorded();
        assert!(v.recorded_keys().is_empty());
        assert_eq!(v.read("mine"), None);
        // Protected write survives on the real global
        assert_eq!(real.read("onerror"), Some(json!("fn")));
    }
}
