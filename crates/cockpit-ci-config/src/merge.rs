//! RFC 7396 JSON Merge Patch over a `serde_json::Value` tree, plus the
//! `[{file = "filename"}]` external-file substitution this job runner
//! layers on top (ported from `json_merge_patch`/`load_external_files`
//! in the original's `jsonutil.py`).

use std::path::Path;

use serde_json::Value;

use crate::error::ConfigError;

/// Merge `patch` onto `current`: scalars and arrays from `patch` win;
/// objects recurse key-by-key; a `null` leaf in `patch` deletes the
/// corresponding key from `current`.
pub fn json_merge_patch(current: Value, patch: Value) -> Value {
    match (current, patch) {
        (Value::Object(mut current_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    current_map.remove(&key);
                    continue;
                }
                let merged = match current_map.remove(&key) {
                    Some(current_value) => json_merge_patch(current_value, patch_value),
                    None => patch_value,
                };
                current_map.insert(key, merged);
            }
            Value::Object(current_map)
        }
        // Patch is not an object (or current wasn't): patch replaces wholesale.
        (_, patch) => patch,
    }
}

/// Recursively replace any leaf of the shape `[{"file": "name"}]` with
/// the UTF-8 contents of `name`, resolved relative to `base_dir`.
pub fn load_external_files(value: Value, base_dir: &Path) -> Result<Value, ConfigError> {
    match value {
        Value::Array(items) => {
            if let [Value::Object(map)] = items.as_slice() {
                if map.len() == 1 {
                    if let Some(Value::String(filename)) = map.get("file") {
                        let path = base_dir.join(filename);
                        let contents = std::fs::read(&path).map_err(|source| ConfigError::Io {
                            path: path.clone(),
                            source,
                        })?;
                        let text = String::from_utf8(contents)
                            .map_err(|_| ConfigError::ExternalFileNotUtf8(path))?;
                        return Ok(Value::String(text));
                    }
                }
            }
            let resolved = items
                .into_iter()
                .map(|item| load_external_files(item, base_dir))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(resolved))
        }
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                resolved.insert(key, load_external_files(value, base_dir)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other),
    }
}

/// Convert a parsed TOML document into the `serde_json::Value` tree
/// that `json_merge_patch` operates on. Both are tagged trees with the
/// same shape modulo TOML's lack of `null`, so this is a structural
/// walk, not a lossy conversion.
pub fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, toml_to_json(v))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_patch_wins() {
        let current = json!({"a": 1, "b": 2});
        let patch = json!({"a": 3});
        assert_eq!(json_merge_patch(current, patch), json!({"a": 3, "b": 2}));
    }

    #[test]
    fn null_removes_key() {
        let current = json!({"a": 1, "b": 2});
        let patch = json!({"a": null});
        assert_eq!(json_merge_patch(current, patch), json!({"b": 2}));
    }

    #[test]
    fn nested_objects_recurse() {
        let current = json!({"container": {"command": ["x"], "default-image": "old"}});
        let patch = json!({"container": {"default-image": "new"}});
        assert_eq!(
            json_merge_patch(current, patch),
            json!({"container": {"command": ["x"], "default-image": "new"}})
        );
    }

    #[test]
    fn array_from_patch_replaces_wholesale() {
        let current = json!({"a": [1, 2, 3]});
        let patch = json!({"a": [4]});
        assert_eq!(json_merge_patch(current, patch), json!({"a": [4]}));
    }

    #[test]
    fn external_file_leaf_is_substituted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("token.txt"), "secret-value\n").unwrap();
        let value = json!({"forge": {"github": {"token": [{"file": "token.txt"}]}}});
        let resolved = load_external_files(value, dir.path()).unwrap();
        assert_eq!(resolved["forge"]["github"]["token"], json!("secret-value\n"));
    }

    #[test]
    fn ordinary_arrays_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let value = json!({"container": {"command": ["make", "check"]}});
        let resolved = load_external_files(value.clone(), dir.path()).unwrap();
        assert_eq!(resolved, value);
    }

    #[test]
    fn toml_table_converts_to_json_object() {
        let toml_value: toml::Value = toml::from_str("a = 1\nb = \"x\"\n").unwrap();
        assert_eq!(toml_to_json(toml_value), json!({"a": 1, "b": "x"}));
    }
}
