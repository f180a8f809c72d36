//! [`CapabilityTree`] and the path-navigation helpers that build and
//! read it.

use serde_json::{Map, Value as Json};

/// A node's publicly visible, nested mapping of named values and
/// sub-objects. Structural subtrees live under `objects/<name>/…`;
/// reserved root keys begin with `_`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CapabilityTree(
    /// The tree's root mapping.
    pub Map<String, Json>,
);

impl CapabilityTree {
    /// Builds an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows the underlying root mapping.
    pub fn as_map(&self) -> &Map<String, Json> {
        &self.0
    }

    /// Mutably borrows the underlying root mapping.
    pub fn as_map_mut(&mut self) -> &mut Map<String, Json> {
        &mut self.0
    }

    /// Deep union: `other` wins on leaf conflicts. A non-object value on
    /// either side means `other`'s value replaces `self`'s wholesale.
    pub fn merge(&mut self, other: &Map<String, Json>) {
        dict_merge(&mut self.0, other);
    }

    /// Navigates `path`, returning `None` if an intermediate key is
    /// missing rather than failing the caller outright.
    pub fn get(&self, path: &[String]) -> Option<&Json> {
        let first = self.0.get(path.first()?)?;
        let mut current = first;
        for key in &path[1..] {
            current = current.as_object()?.get(key)?;
        }
        Some(current)
    }

    /// Writes `value` at `path`, creating intermediate objects as needed.
    pub fn set(&mut self, path: &[String], value: Json) -> Result<(), PathError> {
        dict_set(&mut self.0, path, value)
    }
}

/// Returned when [`CapabilityTree::get`]-style navigation hits a missing
/// intermediate key while *writing*. Read paths instead fall back to an
/// empty subtree and never construct this.
#[derive(Debug, thiserror::Error)]
#[error("capability tree path not found: {0:?}")]
pub struct PathError(
    /// The path that was being navigated, for diagnostics.
    pub Vec<String>,
);

/// Deep union of `b` into `a`; `b` wins on leaf conflicts.
pub fn dict_merge(a: &mut Map<String, Json>, b: &Map<String, Json>) {
    for (key, bv) in b {
        match a.get_mut(key) {
            Some(av) => match (av.as_object_mut(), bv.as_object()) {
                (Some(am), Some(bm)) => dict_merge(am, bm),
                _ => {
                    *av = bv.clone();
                }
            },
            None => {
                a.insert(key.clone(), bv.clone());
            }
        }
    }
}

/// Navigates `root` by `path`, returning the value or an error naming the
/// first missing key.
pub fn dict_get<'a>(root: &'a Json, path: &[String]) -> Result<&'a Json, PathError> {
    let mut current = root;
    for key in path {
        current = current
            .as_object()
            .and_then(|m| m.get(key))
            .ok_or_else(|| PathError(path.to_vec()))?;
    }
    Ok(current)
}

/// Sets `value` at `path` inside `root`, creating intermediate objects
/// along the way rather than erroring on a missing intermediate, since
/// every caller in this crate is on a path it just built with
/// [`wrap_path`] or the live capability tree it owns.
pub fn dict_set(root: &mut Map<String, Json>, path: &[String], value: Json) -> Result<(), PathError> {
    match path.split_first() {
        None => Ok(()),
        Some((key, [])) => {
            root.insert(key.clone(), value);
            Ok(())
        }
        Some((key, rest)) => {
            let entry = root
                .entry(key.clone())
                .or_insert_with(|| Json::Object(Map::new()));
            let map = entry
                .as_object_mut()
                .ok_or_else(|| PathError(path.to_vec()))?;
            dict_set(map, rest, value)
        }
    }
}

/// Wraps `data` in nested singletons along `path`, from leaf to root, so a
/// local leaf change becomes a `MOD` payload rooted at the parameter's real
/// path. The last key of `path` equals `data`'s own top key, so the
/// innermost wrap is skipped.
pub fn wrap_path(mut data: Json, path: &[String]) -> Json {
    let container = path.len().saturating_sub(1);
    for key in path[..container].iter().rev() {
        let mut wrapper = Map::new();
        wrapper.insert(key.clone(), data);
        data = Json::Object(wrapper);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_prefers_b_on_leaf_conflict() {
        let mut a: Map<String, Json> = json!({"x": 1, "y": {"a": 1}}).as_object().unwrap().clone();
        let b: Map<String, Json> = json!({"x": 2, "y": {"b": 2}}).as_object().unwrap().clone();
        dict_merge(&mut a, &b);
        assert_eq!(a.get("x").unwrap(), &json!(2));
        assert_eq!(a.get("y").unwrap(), &json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_non_object_replaces_wholesale() {
        let mut a: Map<String, Json> = json!({"x": {"a": 1}}).as_object().unwrap().clone();
        let b: Map<String, Json> = json!({"x": 5}).as_object().unwrap().clone();
        dict_merge(&mut a, &b);
        assert_eq!(a.get("x").unwrap(), &json!(5));
    }

    #[test]
    fn get_missing_intermediate_errors() {
        let root = json!({"objects": {}});
        let path = vec!["objects".to_string(), "missing".to_string(), "x".to_string()];
        assert!(dict_get(&root, &path).is_err());
    }

    #[test]
    fn wrap_path_skips_innermost_level() {
        let data = json!({"todos": 1});
        let wrapped = wrap_path(data, &["objects".to_string(), "todos".to_string()]);
        assert_eq!(wrapped, json!({"objects": {"todos": 1}}));
    }

    #[test]
    fn wrap_path_empty_is_identity() {
        let data = json!({"x": 1});
        assert_eq!(wrap_path(data.clone(), &[]), data);
    }
}
