//! Configuration loading: single-file or directory-of-files merging.

use std::{
    fs,
    path::{Path, PathBuf},
};

use conduit_core::GatewayError;
use toml::Value;

/// Loads configuration from `path`.
///
/// If `path` is a directory, every `*.toml` file in it is parsed and merged
/// in alphabetical filename order: top-level tables are merged key by key
/// (a later file's table keys override an earlier file's scalar values;
/// nested tables are merged recursively; arrays are concatenated in file
/// order).
///
/// If `path` is a single file, it is parsed directly.
pub fn load_toml_value(path: &Path) -> Result<Value, GatewayError> {
    if path.is_dir() {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)
            .map_err(|e| GatewayError::Configuration(format!("cannot read {path:?}: {e}")))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        entries.sort();

        let mut merged = Value::Table(toml::value::Table::new());
        for entry in entries {
            let text = fs::read_to_string(&entry)
                .map_err(|e| GatewayError::Configuration(format!("cannot read {entry:?}: {e}")))?;
            let value: Value = toml::from_str(&text)
                .map_err(|e| GatewayError::Configuration(format!("cannot parse {entry:?}: {e}")))?;
            merge_into(&mut merged, value);
        }
        Ok(merged)
    } else {
        let text = fs::read_to_string(path)
            .map_err(|e| GatewayError::Configuration(format!("cannot read {path:?}: {e}")))?;
        toml::from_str(&text)
            .map_err(|e| GatewayError::Configuration(format!("cannot parse {path:?}: {e}")))
    }
}

fn merge_into(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Table(base_table), Value::Table(incoming_table)) => {
            for (key, value) in incoming_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base_array), Value::Array(mut incoming_array)) => {
            base_array.append(&mut incoming_array);
        }
        (base, incoming) => *base = incoming,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_merge_into_concatenates_arrays() {
        let mut base: Value = toml::from_str("x = [1]").unwrap();
        let incoming: Value = toml::from_str("x = [2, 3]").unwrap();
        merge_into(&mut base, incoming);
        assert_eq!(
            base.get("x").unwrap().as_array().unwrap().len(),
            3
        );
    }

    #[rstest]
    fn test_merge_into_overrides_scalars_with_later_file() {
        let mut base: Value = toml::from_str("host = \"a\"").unwrap();
        let incoming: Value = toml::from_str("host = \"b\"").unwrap();
        merge_into(&mut base, incoming);
        assert_eq!(base.get("host").unwrap().as_str(), Some("b"));
    }
}
