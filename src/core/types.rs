/*!
 * Core Types
 * Common types used across the crate
 */

/// Application namespace (unique application id)
pub type Namespace = String;

/// Dynamic value stored in global scopes and module exports
pub type Value = serde_json::Value;

/// Object-shaped value payload
pub type Map = serde_json::Map<String, Value>;

/// Merge `overrides` into `base` key by key, overrides winning
pub fn merge_map(base: &Map, overrides: &Map) -> Map {
    let mut merged = base.clone();
    for (k, v) in overrides {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_map_overrides_win() {
        let mut base = Map::new();
        base.insert("a".into(), json!(1));
        base.insert("b".into(), json!(2));

        let mut over = Map::new();
        over.insert("b".into(), json!(20));
        over.insert("c".into(), json!(3));

        let merged = merge_map(&base, &over);
        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!(20)));
        assert_eq!(merged.get("c"), Some(&json!(3)));
    }
}
