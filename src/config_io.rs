//! Directory-walking config layering: CWD, then each ancestor of the opened
//! file, last-wins (spec.md §6). Grounded on `fresh`'s `config_io` helper of
//! the same shape (`DirectoryContext`), generalized to this crate's single
//! `.zicro.json` filename.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use crate::config::Config;

const CONFIG_FILE_NAME: &str = ".zicro.json";

/// Recursively merge `patch` into `base`, object keys overriding one at a
/// time (last-wins per *option*, not per file) — arrays and scalars are
/// replaced wholesale. Every field in [`Config`] carries a `serde(default)`,
/// so naively re-deserializing each layer and keeping the last one whole
/// would silently reset untouched fields to their built-in default; merging
/// at the JSON level before a single final deserialize avoids that.
fn merge_json_values(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => merge_json_values(base_value, patch_value),
                    None => {
                        base_map.insert(key, patch_value);
                    }
                }
            }
        }
        (base_slot, patch_value) => *base_slot = patch_value,
    }
}

/// Candidate directories to search, nearest-ancestor-of-file last so it wins
/// the final merge: CWD first, then each directory from the filesystem root
/// down to (and including) the file's own directory.
fn search_order(cwd: &Path, file_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = vec![cwd.to_path_buf()];
    if let Some(file_dir) = file_dir {
        let mut ancestors: Vec<PathBuf> = file_dir.ancestors().map(Path::to_path_buf).collect();
        ancestors.reverse();
        for dir in ancestors {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
    dirs
}

/// Load and merge `.zicro.json` from `cwd` and every ancestor of
/// `file_path`'s directory, applied in that order so the file closest to the
/// edited file wins, field by field. Missing files are skipped; malformed
/// ones are logged at `warn!` and skipped — defaults (and any previously
/// applied layer) prevail per spec.md §7.
pub fn load_layered_config(cwd: &Path, file_path: Option<&Path>) -> Config {
    let file_dir = file_path.and_then(Path::parent);
    let mut merged = Value::Object(serde_json::Map::new());
    for dir in search_order(cwd, file_dir) {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if !candidate.is_file() {
            continue;
        }
        let text = match fs::read_to_string(&candidate) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %candidate.display(), error = %e, "ignoring unreadable config");
                continue;
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(layer) => merge_json_values(&mut merged, layer),
            Err(e) => warn!(path = %candidate.display(), error = %e, "ignoring malformed config"),
        }
    }
    let config: Config = match serde_json::from_value(merged) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "layered config failed to deserialize, using defaults");
            return Config::default();
        }
    };
    match config.validate() {
        Ok(()) => config,
        Err(e) => {
            warn!(error = %e, "layered config failed validation, using defaults");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn later_ancestor_wins() {
        let root = tempdir().unwrap();
        let sub = root.path().join("project");
        fs::create_dir_all(&sub).unwrap();
        fs::write(root.path().join(".zicro.json"), r#"{"tab_width": 2}"#).unwrap();
        fs::write(sub.join(".zicro.json"), r#"{"tab_width": 8}"#).unwrap();
        let file_path = sub.join("main.rs");
        fs::write(&file_path, "").unwrap();

        let cfg = load_layered_config(root.path(), Some(&file_path));
        assert_eq!(cfg.tab_width, 8);
    }

    #[test]
    fn unrelated_fields_survive_a_later_partial_layer() {
        // Regression: a later layer touching only `tab_width` must not reset
        // `autosave` (set by an earlier layer) back to its built-in default —
        // layering is per-option, not per-file.
        let root = tempdir().unwrap();
        let sub = root.path().join("project");
        fs::create_dir_all(&sub).unwrap();
        fs::write(root.path().join(".zicro.json"), r#"{"autosave": true}"#).unwrap();
        fs::write(sub.join(".zicro.json"), r#"{"tab_width": 8}"#).unwrap();
        let file_path = sub.join("main.rs");
        fs::write(&file_path, "").unwrap();

        let cfg = load_layered_config(root.path(), Some(&file_path));
        assert_eq!(cfg.tab_width, 8);
        assert!(cfg.autosave);
    }

    #[test]
    fn nested_fields_merge_independently() {
        let root = tempdir().unwrap();
        let sub = root.path().join("project");
        fs::create_dir_all(&sub).unwrap();
        fs::write(root.path().join(".zicro.json"), r#"{"lsp": {"completion": {"min_prefix_len": 3}}}"#).unwrap();
        fs::write(sub.join(".zicro.json"), r#"{"lsp": {"hover": {"auto": false}}}"#).unwrap();
        let file_path = sub.join("main.rs");
        fs::write(&file_path, "").unwrap();

        let cfg = load_layered_config(root.path(), Some(&file_path));
        assert_eq!(cfg.lsp.completion.min_prefix_len, 3);
        assert!(!cfg.lsp.hover.auto);
        // Untouched sibling fields in the same nested struct keep defaults.
        assert!(cfg.lsp.completion.trigger_on_dot);
    }

    #[test]
    fn malformed_layer_is_skipped_not_fatal() {
        let root = tempdir().unwrap();
        fs::write(root.path().join(".zicro.json"), "{not json").unwrap();
        let cfg = load_layered_config(root.path(), None);
        assert_eq!(cfg.tab_width, 4);
    }

    #[test]
    fn missing_config_uses_defaults() {
        let root = tempdir().unwrap();
        let cfg = load_layered_config(root.path(), None);
        assert_eq!(cfg.tab_width, 4);
        assert!(!cfg.autosave);
    }
}
