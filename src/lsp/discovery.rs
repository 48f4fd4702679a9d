//! Server candidate selection, root-directory discovery and binary
//! resolution (spec.md §4.4.1).

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::lsp::types::{builtin_candidates, order_candidates, tsgo_via_node_candidate, ServerCandidate};

/// Detect a language tag from a file extension. `None` means "no LSP for
/// this file type"; the app still opens the buffer without LSP support.
pub fn detect_language(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let lang = match ext.as_str() {
        "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => "typescript",
        "zig" => "zig",
        "sh" | "bash" => "shell",
        _ => return None,
    };
    Some(lang.to_string())
}

/// Build the ordered candidate list for `path`: built-ins matching the
/// detected language, the conditional `tsgo_via_node` candidate, and
/// config-supplied adapter overrides, sorted by priority descending then
/// name ascending (spec.md §4.4.1 step 2). Empty if the file's language
/// isn't recognized and no adapter override matches its extension.
pub fn candidates_for(path: &Path, config: &Config) -> Vec<ServerCandidate> {
    let language = detect_language(path);
    let mut candidates: Vec<ServerCandidate> = builtin_candidates()
        .into_iter()
        .filter(|c| Some(c.language.as_str()) == language.as_deref())
        .collect();

    if looks_like_typescript(path) {
        if let Some(root) = path.parent() {
            let script = find_root_marker_dir(root, &["package.json".into()])
                .unwrap_or_else(|| root.to_path_buf())
                .join("node_modules/@typescript/native-preview/bin/tsgo.js");
            if script.is_file() {
                candidates.push(tsgo_via_node_candidate());
            }
        }
    }

    for adapter in &config.lsp.adapters {
        if !adapter.enabled {
            continue;
        }
        if !adapter.file_extensions.is_empty() {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !adapter.file_extensions.iter().any(|e| e.trim_start_matches('.') == ext) {
                continue;
            }
        }
        candidates.push(ServerCandidate {
            name: adapter.name.clone(),
            language: adapter.language.clone(),
            command: adapter.command.clone(),
            args: adapter.args.clone(),
            root_markers: adapter.root_markers.clone(),
            priority: adapter.priority,
            via_node: false,
        });
    }

    order_candidates(candidates)
}

fn looks_like_typescript(path: &Path) -> bool {
    detect_language(path).as_deref() == Some("typescript")
}

/// Walk upward from `start` (inclusive) looking for any of `markers`;
/// default to `start` itself if nothing is found.
pub fn find_root_dir(start: &Path, markers: &[String]) -> PathBuf {
    find_root_marker_dir(start, markers).unwrap_or_else(|| start.to_path_buf())
}

fn find_root_marker_dir(start: &Path, markers: &[String]) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        if markers.iter().any(|m| d.join(m).exists()) {
            return Some(d.to_path_buf());
        }
        dir = d.parent();
    }
    None
}

/// Resolve the binary to exec for `candidate` rooted at `root`: a path
/// containing a separator is used as-is; otherwise try
/// `<root>/node_modules/.bin/<name>`, then the bare name (PATH-resolved by
/// the OS) (spec.md §4.4.1 step 4).
pub fn resolve_binary(candidate: &ServerCandidate, root: &Path) -> String {
    if candidate.command.contains('/') || candidate.command.contains(std::path::MAIN_SEPARATOR) {
        return candidate.command.clone();
    }
    let local_bin = root.join("node_modules/.bin").join(&candidate.command);
    if local_bin.is_file() {
        return local_bin.to_string_lossy().into_owned();
    }
    candidate.command.clone()
}

/// `file://` URI with space bytes percent-encoded (spec.md §6 "File URIs").
pub fn file_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let encoded = s.replace(' ', "%20");
    if encoded.starts_with('/') {
        format!("file://{encoded}")
    } else {
        format!("file:///{encoded}")
    }
}

/// Loose (case-insensitive) URI compare used when matching
/// `publishDiagnostics`/jump targets against `document_uri` (spec.md §4.4.5,
/// §4.4.6).
pub fn uri_matches(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn detects_typescript_and_zig() {
        assert_eq!(detect_language(Path::new("a.ts")).as_deref(), Some("typescript"));
        assert_eq!(detect_language(Path::new("a.tsx")).as_deref(), Some("typescript"));
        assert_eq!(detect_language(Path::new("a.zig")).as_deref(), Some("zig"));
        assert_eq!(detect_language(Path::new("a.rs")), None);
    }

    #[test]
    fn candidates_are_filtered_to_detected_language() {
        let dir = tempdir().unwrap();
        let config = Config::default();
        let zig_candidates = candidates_for(&dir.path().join("a.zig"), &config);
        assert!(zig_candidates.iter().all(|c| c.language == "zig"));
        assert!(!zig_candidates.is_empty());

        let unknown = candidates_for(&dir.path().join("a.rs"), &config);
        assert!(unknown.is_empty());
    }

    #[test]
    fn root_dir_walks_upward_to_marker() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project");
        let nested = project.join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();
        fs::write(project.join("package.json"), "{}").unwrap();

        let found = find_root_dir(&nested, &["package.json".to_string()]);
        assert_eq!(found, project);
    }

    #[test]
    fn root_dir_defaults_to_start_when_no_marker() {
        let dir = tempdir().unwrap();
        let found = find_root_dir(dir.path(), &["nonexistent.marker".to_string()]);
        assert_eq!(found, dir.path());
    }

    #[test]
    fn resolve_binary_prefers_local_node_modules_bin() {
        let dir = tempdir().unwrap();
        let bin_dir = dir.path().join("node_modules/.bin");
        fs::create_dir_all(&bin_dir).unwrap();
        fs::write(bin_dir.join("zls"), "").unwrap();

        let candidate = ServerCandidate {
            name: "zig-zls".into(),
            language: "zig".into(),
            command: "zls".into(),
            args: vec![],
            root_markers: vec![],
            priority: 0,
            via_node: false,
        };
        let resolved = resolve_binary(&candidate, dir.path());
        assert_eq!(resolved, bin_dir.join("zls").to_string_lossy());
    }

    #[test]
    fn resolve_binary_falls_back_to_bare_name() {
        let dir = tempdir().unwrap();
        let candidate = ServerCandidate {
            name: "zig-zls".into(),
            language: "zig".into(),
            command: "zls".into(),
            args: vec![],
            root_markers: vec![],
            priority: 0,
            via_node: false,
        };
        assert_eq!(resolve_binary(&candidate, dir.path()), "zls");
    }

    #[test]
    fn file_uri_percent_encodes_spaces() {
        assert_eq!(file_uri(Path::new("/a b/c.rs")), "file:///a%20b/c.rs");
    }

    #[test]
    fn uri_compare_is_case_insensitive() {
        assert!(uri_matches("file:///A.rs", "file:///a.rs"));
        assert!(!uri_matches("file:///a.rs", "file:///b.rs"));
    }
}
