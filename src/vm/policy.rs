/*!
 * Variable Policy Engine
 * Classifies identifiers as protected, insulated, or default
 */

use crate::vm::types::VarListProvider;
use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Classification of one identifier requested through a virtual scope.
///
/// Exactly one class applies per identifier: protected is checked first,
/// then insulated, then default. Protected and insulated are therefore
/// disjoint by construction (protected wins on conflict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarClass {
    /// Always routed to the real global object (shared, not sandboxed)
    Protected,
    /// Always kept private to one sandbox, never shared
    Insulated,
    /// Private once written; reads fall through to the real global until then
    Default,
}

/// Per-sandbox identifier classifier.
///
/// Each list is a static portion plus an optional dynamically computed
/// portion. Dynamic portions are evaluated lazily, on the first
/// classification of each key, and the resulting class is cached for the
/// sandbox's lifetime - changing the lists afterwards never reclassifies
/// an already-cached key.
pub struct VariablePolicy {
    protect: Vec<String>,
    protect_dynamic: Option<VarListProvider>,
    insulate: Vec<String>,
    insulate_dynamic: Option<VarListProvider>,
    cache: DashMap<String, VarClass, RandomState>,
}

impl VariablePolicy {
    pub fn new(
        protect: Vec<String>,
        protect_dynamic: Option<VarListProvider>,
        insulate: Vec<String>,
        insulate_dynamic: Option<VarListProvider>,
    ) -> Self {
        Self {
            protect,
            protect_dynamic,
            insulate,
            insulate_dynamic,
            cache: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Classify an identifier, caching the result
    pub fn classify(&self, key: &str) -> VarClass {
        if let Some(class) = self.cache.get(key) {
            return *class;
        }
        let class = self.compute(key);
        self.cache.insert(key.to_string(), class);
        class
    }

    fn compute(&self, key: &str) -> VarClass {
        // Static and dynamic portions are a union; protected wins over
        // insulated when a key appears on both lists
        if self.matches(key, &self.protect, &self.protect_dynamic) {
            VarClass::Protected
        } else if self.matches(key, &self.insulate, &self.insulate_dynamic) {
            VarClass::Insulated
        } else {
            VarClass::Default
        }
    }

    fn matches(&self, key: &str, fixed: &[String], dynamic: &Option<VarListProvider>) -> bool {
        if fixed.iter().any(|v| v == key) {
            return true;
        }
        match dynamic {
            Some(provider) => provider().iter().any(|v| v == key),
            None => false,
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

impl std::fmt::Debug for VariablePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariablePolicy")
            .field("protect", &self.protect)
            .field("insulate", &self.insulate)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn policy(protect: &[&str], insulate: &[&str]) -> VariablePolicy {
        VariablePolicy::new(
            protect.iter().map(|s| s.to_string()).collect(),
            None,
            insulate.iter().map(|s| s.to_string()).collect(),
            None,
        )
    }

    #[test]
    fn test_classify_ordering() {
        let p = policy(&["onerror"], &["webpackjsonp"]);
        assert_eq!(p.classify("onerror"), VarClass::Protected);
        assert_eq!(p.classify("webpackjsonp"), VarClass::Insulated);
        assert_eq!(p.classify("anything"), VarClass::Default);
    }

    #[test]
    fn test_protected_wins_on_conflict() {
        let p = policy(&["shared"], &["shared"]);
        assert_eq!(p.classify("shared"), VarClass::Protected);
    }

    #[test]
    fn test_unclassified_defaults_to_default() {
        // Over-isolation is the safe failure mode, never leakage
        let p = policy(&[], &[]);
        assert_eq!(p.classify("unknown"), VarClass::Default);
    }

    #[test]
    fn test_dynamic_list_evaluated_lazily_and_cached() {
        let dev = Arc::new(AtomicBool::new(false));
        let dev_probe = Arc::clone(&dev);
        let p = VariablePolicy::new(
            vec![],
            None,
            vec![],
            Some(Arc::new(move || {
                if dev_probe.load(Ordering::SeqCst) {
                    vec!["hotUpdate".to_string()]
                } else {
                    vec![]
                }
            })),
        );

        // First classification happens while the dynamic list is empty
        assert_eq!(p.classify("hotUpdate"), VarClass::Default);

        // Flipping the condition does not reclassify the cached key
        dev.store(true, Ordering::SeqCst);
        assert_eq!(p.classify("hotUpdate"), VarClass::Default);

        // But a key classified for the first time sees the new list
        assert_eq!(p.classify("other"), VarClass::Default);
        let p2 = VariablePolicy::new(
            vec![],
            None,
            vec![],
            Some(Arc::new(|| vec!["hotUpdate".to_string()])),
        );
        assert_eq!(p2.classify("hotUpdate"), VarClass::Insulated);
    }
}
